//! 工会网站管理后台主入口

use clap::{Parser, Subcommand};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use union_portal::{
    auth::password::PasswordHasher,
    config::{AppConfig, StorageBackend},
    db,
    handlers::health,
    middleware::AppState,
    models::principal::{normalize_email, Principal, PrincipalStatus, Role},
    repository::Repositories,
    routes,
    services::{audit_service::spawn_retention_task, LogMailer},
    telemetry,
};

#[derive(Parser)]
#[command(name = "union-portal", version, about = "Union website admin backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 启动 HTTP 服务（默认）
    Serve,
    /// 创建超级管理员账户
    SeedAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "PORTAL_SEED_ADMIN_PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 按优先级加载：.env.local > .env.development > .env
    // 生产环境应该直接设置环境变量
    dotenv::from_filename(".env.local").ok();
    dotenv::from_filename(".env.development").ok();
    dotenv::dotenv().ok();

    health::set_start_time();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    telemetry::init_telemetry(&config.logging);

    let repos = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = db::connect(&config.database).await?;
            Repositories::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Repositories::in_memory()
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, repos).await,
        Command::SeedAdmin { email, name, password } => {
            let result = seed_admin(&config, &repos, &email, &name, &password).await;
            if let Some(pool) = &repos.pool {
                pool.close().await;
            }
            result
        }
    }
}

async fn serve(config: AppConfig, repos: Repositories) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Union portal starting...");

    let pool = repos.pool.clone();
    let state = Arc::new(AppState::new(
        config.clone(),
        repos,
        Arc::new(LogMailer),
        PasswordHasher::new(),
    )?);

    let retention = spawn_retention_task(
        state.audit_service.clone(),
        state.repos.refresh_tokens.clone(),
        config.audit.retention_days,
        Duration::from_secs(config.audit.purge_interval_secs),
    );

    let app = routes::create_router(state);

    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    retention.abort();
    if let Some(pool) = pool {
        let timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
        match tokio::time::timeout(timeout, pool.close()).await {
            Ok(()) => tracing::info!("Database pool closed"),
            Err(_) => tracing::warn!("Graceful shutdown timeout reached while closing database pool"),
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 创建超级管理员；邮箱已存在时只报告
async fn seed_admin(
    config: &AppConfig,
    repos: &Repositories,
    email: &str,
    name: &str,
    password: &str,
) -> anyhow::Result<()> {
    let email = normalize_email(email);
    if let Some(existing) = repos.principals.find_by_email(&email).await? {
        tracing::info!(principal_id = %existing.id, role = %existing.role, "Principal already exists");
        println!("{} already exists ({})", email, existing.role);
        return Ok(());
    }

    PasswordHasher::validate_password_policy(password, &config.security, "password")?;
    let hasher = PasswordHasher::new();
    let mut admin = Principal::new(
        &email,
        hasher.hash(password)?,
        name,
        Role::SuperAdmin,
        PrincipalStatus::Active,
    );
    admin.email_verified = true;

    repos.principals.insert(&admin).await?;
    tracing::info!(principal_id = %admin.id, "Super admin created");
    println!("Created super admin {} ({})", admin.email, admin.id);
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}
