//! # Teledent集成模块
//!
//! 提供与外部AI服务的集成功能，包括：
//! - 影像分类服务客户端，接收原始图片字节并返回疾病概率分布
//! - 解释生成服务客户端，调用托管语言模型并内置确定性模板回退

pub mod explanation;
pub mod vision;

pub use explanation::{ExplanationService, HttpExplanationService};
pub use vision::{HttpVisionService, VisionService};
