//! Web服务器与路由装配

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use teledent_core::{Result, TeledentError};
use teledent_database::DatabasePool;
use teledent_integration::{ExplanationService, VisionService};
use teledent_report::PdfReportService;
use teledent_storage::StorageManager;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::auth::AuthService;
use crate::{admin, patients};

/// 请求处理层共享的依赖集合
///
/// 所有服务在进程启动时显式构造并注入，测试中可整体替换。
pub struct AppState {
    pub db: DatabasePool,
    pub storage: StorageManager,
    pub auth: AuthService,
    pub vision: Arc<dyn VisionService>,
    pub explanation: Arc<dyn ExplanationService>,
    pub pdf: PdfReportService,
}

/// HTTP层错误包装
///
/// TeledentError到状态码的映射在此完成。
pub struct ApiError(pub TeledentError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<TeledentError> for ApiError {
    fn from(err: TeledentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            TeledentError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TeledentError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            TeledentError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            TeledentError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            other => {
                error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    other.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Web服务器
pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>, max_upload_bytes: usize) -> Self {
        let app = Self::create_app(state, max_upload_bytes);
        Self { addr, app }
    }

    fn create_app(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
        Router::new()
            // 根路径与健康检查
            .route("/", get(api_root))
            .route("/health", get(health))
            // 患者路由
            .nest("/patients", patient_routes())
            // 管理员路由
            .nest("/admin", admin_routes())
            .layer(DefaultBodyLimit::max(max_upload_bytes))
            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
            .with_state(state)
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| TeledentError::Internal(format!("web server failed: {}", e)))?;

        Ok(())
    }
}

/// 患者路由
fn patient_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(patients::register))
        .route("/login", post(patients::login))
        .route("/me", get(patients::me))
        .route("/upload-image", post(patients::upload_image))
        .route("/images", get(patients::list_images))
        .route("/images/:image_id", get(patients::get_image))
        .route("/images/:image_id/analysis", get(patients::get_image_analysis))
        .route("/reports", get(patients::list_reports))
        .route("/reports/:report_id", get(patients::get_report))
        .route("/reports/:report_id/pdf", get(patients::get_report_pdf))
}

/// 管理员路由
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(admin::login))
        .route("/patients", get(admin::list_patients))
        .route("/patients/:patient_id/images", get(admin::patient_images))
        .route("/patients/:patient_id", delete(admin::delete_patient))
}

/// API根路径处理器
async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Teledent Web API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "patients": "/patients",
            "admin": "/admin"
        }
    }))
}

/// 健康检查处理器
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_mapping() {
        let cases = [
            (
                TeledentError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                TeledentError::Auth("no".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                TeledentError::Forbidden("nope".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                TeledentError::NotFound("gone".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                TeledentError::Inference("down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                TeledentError::Database("oops".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
