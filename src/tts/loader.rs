use std::sync::Arc;
use std::time::Instant;

use super::vocab::ModelAssets;
use super::{Device, F5Engine, ModelHandle, SpeechModel};
use crate::config::Config;
use crate::error::AppError;

/// Build the F5 engine from the configured model directory. Blocking.
pub fn load_model(config: &Config, device: Device) -> Result<Arc<dyn SpeechModel>, AppError> {
    let assets = ModelAssets::locate(&config.model_dir)?;
    let engine = F5Engine::new(&assets, device, config.intra_threads)?;
    Ok(Arc::new(engine))
}

/// Run `load` once on the blocking pool and publish the outcome on `handle`.
///
/// A failed load is logged and leaves the handle `Unavailable`; there is no
/// retry.
pub async fn load_into<F>(handle: Arc<ModelHandle>, load: F)
where
    F: FnOnce(Device) -> Result<Arc<dyn SpeechModel>, AppError> + Send + 'static,
{
    tracing::info!("Loading F5-Spanish model...");
    let start = Instant::now();

    let device = Device::Cpu;
    handle.select_device(device);
    tracing::info!("Using device: {}", device);

    match tokio::task::spawn_blocking(move || load(device)).await {
        Ok(Ok(model)) => {
            handle.set_ready(model);
            tracing::info!(
                "Model loaded in {:.2} seconds",
                start.elapsed().as_secs_f64()
            );
            tracing::info!("API ready");
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to load model: {}", e);
            handle.set_unavailable();
        }
        Err(e) => {
            tracing::error!("Model loader task failed: {}", e);
            handle.set_unavailable();
        }
    }
}
