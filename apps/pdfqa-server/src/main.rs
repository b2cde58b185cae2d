//! pdfqa server
//!
//! Answers questions about uploaded PDF documents. Each request extracts
//! the document text, asks a language model for an answer and a supporting
//! quote, highlights that quote in the PDF and, on request, redacts the
//! sensitive data the model identifies. The annotated PDF is returned
//! base64-encoded alongside the answer.
//!
//! ## Architecture
//!
//! - `pdfqa-core` does all PDF work (sync, run on blocking threads)
//! - the language model sits behind the `Collaborator` trait
//! - rate limiting via tower-governor, CORS open to any origin

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod llm;
mod pipeline;
mod state;

use api::{handle_health, handle_process_pdf};
use llm::{GeminiClient, DEFAULT_API_BASE};
use state::{AppState, CollaboratorFailurePolicy};

/// Command-line arguments for the pdfqa server
#[derive(Parser, Debug)]
#[command(name = "pdfqa-server")]
#[command(about = "Answer questions about PDFs and return them highlighted and redacted")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "PDFQA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-flash-002")]
    model: String,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Timeout for each model call in seconds
    #[arg(long, default_value = "60")]
    llm_timeout_secs: u64,

    /// Maximum upload size in megabytes
    #[arg(long, default_value = "25")]
    max_upload_mb: usize,

    /// Behaviour when the sensitive-data call fails
    #[arg(long, value_enum, default_value_t = CollaboratorFailurePolicy::FailFast)]
    on_llm_failure: CollaboratorFailurePolicy,

    /// Directory for staged uploads (defaults to the system temp dir)
    #[arg(long, env = "PDFQA_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Rate limit: requests per second per IP
    #[arg(long, default_value = "5")]
    rate_limit: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Routes and middleware shared by the binary and the endpoint tests
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/process-pdf/", post(handle_process_pdf))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // lopdf logs every text decode at info
    let filter = EnvFilter::from_default_env()
        .add_directive(log_level.into())
        .add_directive("lopdf=warn".parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdfqa server on {}:{}", args.host, args.port);

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .ok_or_else(|| anyhow!("invalid rate limit: {}", args.rate_limit))?,
    );

    let collaborator = GeminiClient::new(
        &args.api_base,
        args.api_key,
        args.model.clone(),
        Duration::from_secs(args.llm_timeout_secs),
    )
    .context("failed to build Gemini client")?;

    let mut state = AppState::new(Arc::new(collaborator), args.on_llm_failure);
    if let Some(dir) = &args.staging_dir {
        state = state.with_staging_dir(dir);
    }
    let app = build_router(state, args.max_upload_mb * 1024 * 1024).layer(GovernorLayer {
        config: governor_conf,
    });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Model: {} (timeout {}s)", args.model, args.llm_timeout_secs);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!("Sensitive-data failure policy: {:?}", args.on_llm_failure);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
