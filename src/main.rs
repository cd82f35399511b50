use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use tts::{loader, ModelHandle};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let addr = match config.addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("F5-Spanish TTS Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("Model directory: {}", config.model_dir.display());

    if let Err(e) = std::fs::create_dir_all(&config.scratch_dir) {
        tracing::error!(
            "Cannot create scratch directory {}: {}",
            config.scratch_dir.display(),
            e
        );
        std::process::exit(1);
    }

    // Requests are answered with 503 until the model is in.
    let model = Arc::new(ModelHandle::loading());
    let loader_config = config.clone();
    tokio::spawn(loader::load_into(Arc::clone(&model), move |device| {
        loader::load_model(&loader_config, device)
    }));

    let state = Arc::new(AppState {
        model,
        scratch_dir: config.scratch_dir.clone(),
    });

    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
