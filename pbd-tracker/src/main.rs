//! pbd-tracker - Classroom assessment tracking service
//!
//! Startup sequence:
//! 1. Parse command line, load TOML config (missing/broken file → defaults)
//! 2. Initialize logging
//! 3. Resolve and create the root folder (`tracker.db` + `uploads/`)
//! 4. Open the database, sweep orphaned uploads
//! 5. Configure the document parser if an API key is available
//! 6. Serve HTTP until Ctrl+C / SIGTERM

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pbd_common::config::{
    load_toml_config, CompiledDefaults, RootFolderInitializer, RootFolderResolver,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pbd_tracker::docparse::{DocumentParser, ParserSettings};
use pbd_tracker::{AppState, EvidenceStore};

/// Uploads younger than this are never treated as orphans
const ORPHAN_GRACE: Duration = Duration::from_secs(60);

/// Command-line arguments for pbd-tracker
#[derive(Parser, Debug)]
#[command(name = "pbd-tracker")]
#[command(about = "Classroom assessment (PBD) tracking service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PBD_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "PBD_BIND")]
    bind: Option<String>,

    /// Root folder holding the database and uploads
    #[arg(short, long, env = "PBD_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/pbd/config.toml or /etc/pbd/config.toml)
    #[arg(short, long, env = "PBD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let defaults = CompiledDefaults::for_current_platform();

    // The log level lives in the config file, so config loading reports
    // through a temporary subscriber
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .finish(),
        || load_toml_config(args.config.as_deref()),
    );

    let log_level = config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| defaults.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "pbd_tracker={level},pbd_common={level},tower_http={level}",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pbd-tracker v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    let db = pbd_common::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let blobs = EvidenceStore::new(initializer.uploads_path());
    if config.sweep_orphans_on_start.unwrap_or(true) {
        match blobs.sweep_orphans(&db, ORPHAN_GRACE).await {
            Ok(0) => info!("No orphaned uploads"),
            Ok(removed) => info!(removed, "Removed orphaned uploads"),
            Err(e) => warn!("Orphan sweep failed: {}", e),
        }
    }

    let static_assets = config.static_assets.clone().filter(|dir| {
        let usable = dir.is_dir();
        if !usable {
            warn!(
                "Static assets directory {} not found, UI disabled",
                dir.display()
            );
        }
        usable
    });

    let mut state = AppState::new(db, blobs)
        .with_report_offset(pbd_common::time::report_offset(
            config.report_utc_offset_minutes.unwrap_or(0),
        ))
        .with_max_upload_bytes(
            config
                .max_upload_bytes
                .unwrap_or(defaults.max_upload_bytes),
        )
        .with_max_bulk_upload_bytes(
            config
                .max_bulk_upload_bytes
                .unwrap_or(defaults.max_bulk_upload_bytes),
        )
        .with_static_assets(static_assets);

    let parser_config = &config.document_parser;
    match parser_config.resolve_api_key() {
        Some(api_key) => {
            let settings = ParserSettings {
                api_key,
                model: parser_config
                    .model
                    .clone()
                    .unwrap_or_else(|| defaults.parser_model.clone()),
                endpoint: parser_config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| defaults.parser_endpoint.clone()),
                timeout: Duration::from_secs(
                    parser_config
                        .timeout_secs
                        .unwrap_or(defaults.parser_timeout_secs),
                ),
                max_retries: parser_config
                    .max_retries
                    .unwrap_or(defaults.parser_max_retries),
            };
            let parser = DocumentParser::new(settings).context("Failed to create document parser")?;
            info!(model = parser.model(), "Document import enabled");
            state = state.with_parser(parser);
        }
        None => warn!(
            "No document parser API key ({} unset), import endpoints disabled",
            pbd_common::config::PARSER_API_KEY_ENV
        ),
    }

    let app = pbd_tracker::build_router(state);

    let bind = args.bind.or(config.bind).unwrap_or(defaults.bind);
    let port = args.port.or(config.port).unwrap_or(defaults.port);
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
