//! 影像分类服务客户端

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use teledent_core::{ClassificationOutcome, Result, TeledentError};
use tracing::info;

/// 分类服务接口
///
/// 请求处理层只依赖该trait，测试中以桩实现替换真实服务。
#[async_trait]
pub trait VisionService: Send + Sync {
    /// 对原始图片字节做一次分类推理
    async fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationOutcome>;
}

/// 分类服务的HTTP响应
#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default = "default_success")]
    success: bool,
    label: String,
    confidence: f64,
    probabilities: HashMap<String, f64>,
    processing_time_ms: f64,
}

fn default_success() -> bool {
    true
}

/// 托管分类服务的HTTP客户端
pub struct HttpVisionService {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpVisionService {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TeledentError::Inference(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl VisionService for HttpVisionService {
    async fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image_bytes.to_vec())
            .send()
            .await
            .map_err(|e| TeledentError::Inference(format!("classifier request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TeledentError::Inference(format!("classifier returned error: {}", e)))?;

        let result: VisionResponse = response
            .json()
            .await
            .map_err(|e| TeledentError::Inference(format!("invalid classifier response: {}", e)))?;

        if !result.success {
            return Err(TeledentError::Inference(
                "classifier reported failure".to_string(),
            ));
        }

        info!(
            "Classification finished: {} ({:.1}%) in {:.1}ms",
            result.label,
            result.confidence * 100.0,
            result.processing_time_ms
        );

        Ok(ClassificationOutcome {
            label: result.label,
            confidence: result.confidence,
            probabilities: result.probabilities,
            processing_time_ms: result.processing_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_response_parses_service_payload() {
        let payload = r#"{
            "success": true,
            "label": "Caries",
            "confidence": 0.83,
            "probabilities": {"Caries": 0.83, "Calculus": 0.1},
            "processing_time_ms": 241.7
        }"#;

        let parsed: VisionResponse = serde_json::from_str(payload).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.label, "Caries");
        assert_eq!(parsed.probabilities.len(), 2);
    }

    #[test]
    fn test_vision_response_success_defaults_true() {
        let payload = r#"{
            "label": "Gingivitis",
            "confidence": 0.6,
            "probabilities": {"Gingivitis": 0.6},
            "processing_time_ms": 100.0
        }"#;

        let parsed: VisionResponse = serde_json::from_str(payload).unwrap();
        assert!(parsed.success);
    }
}
