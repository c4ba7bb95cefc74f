//! # Teledent报告模块
//!
//! 负责将一次分析结果渲染为患者可下载的PDF报告。

pub mod pdf;

pub use pdf::{PdfReportService, ReportContent};
