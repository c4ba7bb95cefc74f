//! Teledent服务器主程序

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use teledent_admin::{init_logging, TeledentConfig};
use teledent_core::Result;
use teledent_database::{DatabasePool, DatabaseQueries, NewAdmin};
use teledent_integration::{
    ExplanationService, HttpExplanationService, HttpVisionService, VisionService,
};
use teledent_report::PdfReportService;
use teledent_storage::StorageManager;
use teledent_web::{AppState, AuthService, WebServer};
use tracing::{info, warn};

/// Teledent服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "teledent-server")]
#[command(about = "Teledent 牙科健康分析服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听主机（覆盖配置文件）
    #[arg(long)]
    host: Option<String>,

    /// 监听端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别（覆盖配置文件）
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置并应用命令行覆盖
    let mut config = TeledentConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    // 初始化日志
    init_logging(&config.logging);

    config.validate()?;

    info!("启动Teledent服务器...");
    info!("Teledent服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  上传目录: {}", config.storage.upload_dir);
    info!("  报告目录: {}", config.storage.report_dir);
    info!("  分类服务: {}", config.inference.vision_url);

    // 数据库连接与建表
    let db = DatabasePool::new(
        &config.database.url,
        config.database.max_connections,
        config.database.acquire_timeout_secs,
    )
    .await?;
    DatabaseQueries::new(&db).create_tables().await?;

    // 显式构造各服务并注入请求处理层
    let storage = StorageManager::new(&config.storage.upload_dir, &config.storage.report_dir);
    let auth = AuthService::new(
        config.auth.jwt_secret.clone(),
        config.auth.token_expiry_minutes,
    );
    let vision: Arc<dyn VisionService> = Arc::new(HttpVisionService::new(
        &config.inference.vision_url,
        config.inference.request_timeout_secs,
    )?);
    let explanation: Arc<dyn ExplanationService> = Arc::new(HttpExplanationService::new(
        config.inference.explanation_url.clone(),
        config.inference.explanation_api_key.clone(),
        config.inference.request_timeout_secs,
    ));
    let pdf = PdfReportService::new();

    // 引导管理员账户
    bootstrap_admin(&db, &auth, &config).await?;

    let state = Arc::new(AppState {
        db,
        storage,
        auth,
        vision,
        explanation,
        pdf,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            teledent_core::TeledentError::Config(format!("invalid listen address: {}", e))
        })?;

    WebServer::new(addr, state, config.server.max_upload_bytes)
        .run()
        .await
}

/// 配置了引导管理员且账户不存在时创建
async fn bootstrap_admin(db: &DatabasePool, auth: &AuthService, config: &TeledentConfig) -> Result<()> {
    let Some(bootstrap) = &config.auth.bootstrap_admin else {
        warn!("No bootstrap admin configured, admin routes need a pre-existing account");
        return Ok(());
    };

    let queries = DatabaseQueries::new(db);
    if queries
        .find_admin_by_username(&bootstrap.username)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let password_hash = auth.hash_password(&bootstrap.password)?;
    queries
        .create_admin(&NewAdmin {
            email: bootstrap.email.clone(),
            username: bootstrap.username.clone(),
            password_hash,
        })
        .await?;

    info!("Bootstrap admin account created: {}", bootstrap.username);
    Ok(())
}
