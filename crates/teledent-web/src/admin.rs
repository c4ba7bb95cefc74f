//! 管理员路由处理器
//!
//! 管理员凭证域独立于患者：患者令牌在这些路由上无效。

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use teledent_core::{Admin, Result, TeledentError};
use teledent_database::DatabaseQueries;
use tracing::{debug, info};

use crate::auth::bearer_token;
use crate::patients::{ImageInfo, LoginRequest, PatientView, Token};
use crate::server::{ApiResult, AppState};

/// 分页参数
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PatientImagesResponse {
    pub patient_id: i64,
    pub images: Vec<ImageInfo>,
}

/// 解析bearer令牌并加载对应管理员
///
/// 失败原因与患者域一样只进日志，对外折叠为统一的401。
async fn current_admin(state: &AppState, headers: &HeaderMap) -> Result<Admin> {
    let token =
        bearer_token(headers).ok_or_else(|| TeledentError::Auth("Invalid token".to_string()))?;

    let claims = state.auth.verify_token(token).map_err(|reason| {
        debug!("Admin token rejected: {}", reason);
        TeledentError::Auth("Invalid token".to_string())
    })?;

    let queries = DatabaseQueries::new(&state.db);
    queries
        .find_admin_by_username(&claims.sub)
        .await?
        .ok_or_else(|| TeledentError::Auth("Invalid token".to_string()))
}

/// 管理员登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<Token>> {
    let queries = DatabaseQueries::new(&state.db);

    let admin = queries
        .find_admin_by_username(&payload.username)
        .await?
        .ok_or_else(|| TeledentError::Auth("Incorrect username or password".to_string()))?;

    if !state
        .auth
        .verify_password(&payload.password, &admin.password_hash)
    {
        return Err(TeledentError::Auth("Incorrect username or password".to_string()).into());
    }

    let access_token = state.auth.issue_token(&admin.username)?;
    info!("Admin logged in: {}", admin.username);

    Ok(Json(Token {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// 分页列出全部患者
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PatientView>>> {
    current_admin(&state, &headers).await?;

    let skip = params.skip.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let queries = DatabaseQueries::new(&state.db);
    let patients = queries
        .list_patients(skip, limit)
        .await?
        .into_iter()
        .map(PatientView::from)
        .collect();

    Ok(Json(patients))
}

/// 查看某个患者的影像列表
pub async fn patient_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<PatientImagesResponse>> {
    current_admin(&state, &headers).await?;

    let queries = DatabaseQueries::new(&state.db);
    queries
        .find_patient_by_id(patient_id)
        .await?
        .ok_or_else(|| TeledentError::NotFound("Patient not found".to_string()))?;

    let images = queries
        .list_images_for_patient(patient_id)
        .await?
        .into_iter()
        .map(|image| ImageInfo {
            id: image.uuid,
            original_name: image.original_name,
            uploaded_at: image.uploaded_at,
            size: image.file_size,
            url: format!("/patients/images/{}", image.uuid),
        })
        .collect();

    Ok(Json(PatientImagesResponse { patient_id, images }))
}

/// 删除患者账户
///
/// 影像/分析/报告由数据库级联删除，磁盘文件不回收。
pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(patient_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let admin = current_admin(&state, &headers).await?;

    let queries = DatabaseQueries::new(&state.db);
    let deleted = queries.delete_patient(patient_id).await?;
    if !deleted {
        return Err(TeledentError::NotFound("Patient not found".to_string()).into());
    }

    info!("Admin {} deleted patient {}", admin.username, patient_id);
    Ok(StatusCode::NO_CONTENT)
}
