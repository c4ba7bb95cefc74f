//! # Teledent数据库模块
//!
//! 负责患者账户、影像、分析与报告元数据的存储，提供PostgreSQL连接池和完整的CRUD操作。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
