//! lms-es (Enrollment Service) - learner enrollment and progress tracking
//!
//! Records per-item learner progress, derives completion percentage,
//! manages enrollment status transitions, and serves the read-side
//! projections used by the web UI.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use lms_common::config;
use lms_es::{build_router, AppState};

#[derive(Parser)]
#[command(name = "lms-es", about = "LMS Enrollment Service")]
struct Args {
    /// Data directory holding the LMS database (defaults via
    /// LMS_ROOT_FOLDER, config file, or the platform data dir)
    #[arg(long)]
    root_folder: Option<String>,

    /// Port to listen on
    #[arg(long, default_value_t = 5730)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting LMS Enrollment Service (lms-es) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), "LMS_ROOT_FOLDER");
    let db_path = config::ensure_root_folder(&root_folder)?;
    info!("Database path: {}", db_path.display());

    let pool = match lms_common::db::init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    // Create application state and router
    let state = AppState::new(pool);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", args.port)).await?;
    info!("lms-es listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
