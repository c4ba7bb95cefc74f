//! 认证：密码哈希与JWT令牌
//!
//! 患者与管理员是两个独立的凭证域，共用同一套哈希与令牌机制；
//! 令牌校验失败的具体原因只进日志，对外一律折叠为同一个401。

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use teledent_core::{Result, TeledentError};

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户名
    pub iat: usize,  // 签发时间
    pub exp: usize,  // 过期时间
}

/// 令牌校验失败的内部原因
///
/// 仅用于日志观测，外部响应不区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    Expired,
    InvalidSignature,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => f.write_str("malformed token"),
            TokenError::Expired => f.write_str("expired token"),
            TokenError::InvalidSignature => f.write_str("invalid signature"),
        }
    }
}

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    token_expiry_minutes: i64,
}

impl AuthService {
    pub fn new(jwt_secret: String, token_expiry_minutes: i64) -> Self {
        Self {
            jwt_secret,
            token_expiry_minutes,
        }
    }

    /// 生成不可逆的加盐密码哈希
    pub fn hash_password(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| TeledentError::Internal(format!("password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    /// 校验明文密码与存储哈希是否匹配
    pub fn verify_password(&self, plain: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// 签发以用户名为主体的访问令牌
    pub fn issue_token(&self, username: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.token_expiry_minutes);

        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| TeledentError::Internal(format!("token signing failed: {}", e)))
    }

    /// 校验令牌并返回Claims
    ///
    /// 失败时返回带原因的TokenError，调用方负责折叠为统一的401。
    pub fn verify_token(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        })
    }
}

/// 从Authorization头提取bearer令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service() -> AuthService {
        AuthService::new("test-secret".to_string(), 60)
    }

    #[test]
    fn test_password_hash_differs_from_plaintext_and_verifies() {
        let auth = service();
        let hash = auth.hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(auth.verify_password("hunter2", &hash));
        assert!(!auth.verify_password("hunter3", &hash));
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        let auth = service();
        assert!(!auth.verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn test_token_round_trip_identifies_subject() {
        let auth = service();
        let token = auth.issue_token("alice").unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn test_token_with_wrong_secret_fails_as_signature_error() {
        let auth = service();
        let token = auth.issue_token("alice").unwrap();

        let other = AuthService::new("different-secret".to_string(), 60);
        assert_eq!(
            other.verify_token(&token).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn test_expired_token_fails_as_expired() {
        // 负数有效期直接签发过期令牌
        let auth = AuthService::new("test-secret".to_string(), -5);
        let token = auth.issue_token("alice").unwrap();
        assert_eq!(auth.verify_token(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_garbage_token_fails_as_malformed() {
        let auth = service();
        assert_eq!(
            auth.verify_token("definitely.not.a-jwt").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut basic = HeaderMap::new();
        basic.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_token(&basic), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
