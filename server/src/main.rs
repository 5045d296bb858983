//! Image Classifier Inference Server
//!
//! HTTP API serving predictions from weights produced by
//! `imagefolder_classifier train`. The model and class names are loaded once
//! at startup; a load failure stops the server before it binds.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use imagefolder_classifier::backend::backend_name;
use imagefolder_classifier::model::Arch;

use crate::state::{AppState, ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};

/// Image Classifier Inference Server
#[derive(Parser, Debug)]
#[command(name = "imagefolder_classifier_server")]
#[command(version)]
#[command(about = "HTTP inference server for image folder classifiers")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "CLASSIFIER_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "CLASSIFIER_HOST")]
    host: String,

    /// Weights snapshot written by training
    #[arg(long, default_value = "model/classifier.mpk", env = "CLASSIFIER_WEIGHTS")]
    weights: PathBuf,

    /// Class names file written by training
    #[arg(long, default_value = "model/class_names.txt", env = "CLASSIFIER_CLASS_NAMES")]
    class_names: PathBuf,

    /// Architecture (defaults to the one recorded with the weights)
    #[arg(long, value_enum, env = "CLASSIFIER_ARCH")]
    arch: Option<Arch>,

    /// Square input resolution
    #[arg(long, default_value_t = imagefolder_classifier::IMAGE_SIZE, env = "CLASSIFIER_IMAGE_SIZE")]
    image_size: usize,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "CLASSIFIER_MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = ServerConfig {
        weights: cli.weights,
        class_names: cli.class_names,
        arch: cli.arch,
        image_size: cli.image_size,
        max_upload_bytes: cli.max_upload_bytes,
    };

    info!("Image Classifier Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Weights:     {:?}", config.weights);
    info!("  Class names: {:?}", config.class_names);
    info!("  Image size:  {}", config.image_size);
    info!("  Upload limit: {} bytes", config.max_upload_bytes);
    info!("  Backend:     {}", backend_name());

    // Load the model once; startup fails if it cannot be loaded
    let state = tokio::task::spawn_blocking(move || AppState::load(config))
        .await
        .context("Model loading task failed")?
        .context("Failed to load classifier")?;
    info!(
        "Loaded {} with {} classes",
        state.predictor.arch(),
        state.predictor.num_classes()
    );

    let app = routes::router(Arc::new(state));

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
