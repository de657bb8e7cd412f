//! PDF overlay server
//!
//! Accepts a PDF template plus identity-document images (photo, signature,
//! ID-card scans) as a multipart upload, draws each image into its
//! configured rectangle, and returns the composited PDF.
//!
//! ## Endpoints
//!
//! - `GET /`: liveness string
//! - `GET /health`: service health
//! - `GET /placement-table`: the active placement table
//! - `POST /process-pdf`: composite uploads onto the template

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use pdfoverlay_core::PlacementTable;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod scratch;
mod state;
#[cfg(test)]
mod tests;

use api::{handle_health, handle_home, handle_placement_table, handle_process_pdf};
use state::AppState;

/// Command-line arguments for the overlay server
#[derive(Parser, Debug)]
#[command(name = "pdfoverlay-server")]
#[command(about = "Overlay identity-document images onto PDF templates")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "10000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding per-request scratch directories
    #[arg(long, env = "SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Placement table JSON file (built-in standard layout if omitted)
    #[arg(long, env = "PLACEMENT_TABLE")]
    table: Option<PathBuf>,

    /// Maximum request body size in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "25")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the application router
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_home))
        .route("/health", get(handle_health))
        .route("/placement-table", get(handle_placement_table))
        .route("/process-pdf", post(handle_process_pdf))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let table = match &args.table {
        Some(path) => {
            info!("Loading placement table from {}", path.display());
            PlacementTable::load(path)?
        }
        None => PlacementTable::standard(),
    };

    let scratch_root = args
        .scratch_dir
        .clone()
        .unwrap_or_else(state::default_scratch_root);
    let state = AppState::new(table, &scratch_root)?;
    info!("Scratch directory: {}", scratch_root.display());

    let app = build_router(state, args.max_upload_mb * 1024 * 1024);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Upload limit: {} MB", args.max_upload_mb);

    axum::serve(listener, app).await?;

    Ok(())
}
