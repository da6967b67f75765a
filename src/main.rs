//! 仪表盘访问控制服务主入口

use dashboard_access::{
    auth::PasswordHasher,
    bootstrap,
    clock::{Clock, SystemClock},
    config::AppConfig,
    db,
    middleware::{AppState, Stores},
    repository::{InMemoryAuditStore, InMemoryUserStore, PgAuditStore, PgUserStore},
    routes,
    services::sweeper,
    telemetry,
};
use secrecy::{ExposeSecret, Secret};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    let mut hash_password = false;
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("dashboard-access {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            "--hash-password" => hash_password = true,
            _ => {
                eprintln!("Unknown argument: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    if let Ok(name) = std::env::var("DASH_ENV") {
        dotenv::from_filename(format!(".env.{}", name)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    if hash_password {
        return print_password_hash(&config);
    }

    // 2. 初始化日志与指标
    telemetry::init_telemetry(&config.logging);
    telemetry::describe_metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Dashboard access gate starting");

    // 3. 存储：Postgres 或内存
    let (stores, pool) = match &config.database {
        Some(db_config) => {
            let pool = db::connect(db_config).await?;
            let stores = Stores {
                users: Arc::new(PgUserStore::new(pool.clone())),
                audit: Arc::new(PgAuditStore::new(pool.clone())),
            };
            tracing::info!("Using Postgres stores");
            (stores, Some(pool))
        }
        None => {
            tracing::warn!(
                "DASH_DATABASE__URL not set; users and audit events live in memory and are lost on restart"
            );
            let stores = Stores {
                users: Arc::new(InMemoryUserStore::new()),
                audit: Arc::new(InMemoryAuditStore::new()),
            };
            (stores, None)
        }
    };

    // 4. 构建应用状态
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::new(config.clone(), stores, pool, clock.clone())?);

    if let Some(path) = &config.bootstrap.users_file {
        let users = bootstrap::load_users_file(path, clock.now())?;
        let created = bootstrap::seed_users(state.users.as_ref(), users).await?;
        tracing::info!(path = %path, created = created, "Users file applied");
    }

    // 5. 过期清理
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = match config.security.sweep_interval_secs {
        0 => None,
        secs => Some(sweeper::spawn_sweeper(
            Duration::from_secs(secs),
            state.sessions.clone(),
            state.tracker.clone(),
            clock.clone(),
            shutdown_rx,
        )),
    };

    // 6. 启动服务器
    let app = routes::create_router(state.clone());
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            config.server.graceful_shutdown_timeout_secs,
            shutdown_tx,
        ))
        .await?;

    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Read one password line from stdin and print its Argon2id PHC string
fn print_password_hash(config: &AppConfig) -> anyhow::Result<()> {
    let hasher = PasswordHasher::from_config(&config.security)?;

    eprintln!("Password (read from stdin):");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = Secret::new(line.trim_end_matches(['\r', '\n']).to_string());

    hasher.validate_password_policy(password.expose_secret())?;
    println!("{}", hasher.hash(password.expose_secret())?);
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal(timeout_secs: u64, shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    let _ = shutdown_tx.send(true);

    // 超时后强制退出
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("dashboard-access {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: dashboard-access [OPTION]");
    println!();
    println!("Options:");
    println!("  --version         Print version and exit");
    println!("  --help            Print this help and exit");
    println!("  --hash-password   Read a password from stdin and print its Argon2id hash");
    println!();
    println!("Environment:");
    println!("  All settings come from DASH_* variables, e.g.");
    println!("  DASH_SECURITY__SESSION_TIMEOUT_MINUTES=30");
    println!("  DASH_DATABASE__URL=postgres://...   (omit for in-memory stores)");
    println!("  DASH_BOOTSTRAP__USERS_FILE=users.toml");
}
