//! # Teledent存储模块
//!
//! 负责上传影像与PDF报告文件的本地存储管理。

pub mod storage;

pub use storage::*;
