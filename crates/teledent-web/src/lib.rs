//! # Teledent Web模块
//!
//! HTTP API层：患者与管理员两套认证域、
//! 上传-分类-解释-报告流水线以及资源检索路由。

pub mod admin;
pub mod auth;
pub mod patients;
pub mod server;

pub use auth::AuthService;
pub use server::{ApiError, ApiResult, AppState, WebServer};
