use std::sync::Arc;

use image_authenticity::{
    classifier::ClassifierLoader,
    config::Config,
    decision::{Decider, JudgeManager},
    error::Result,
    judge::GeminiLoader,
    resource::ResourceManager,
    server::{self, AppState},
};
use log::info;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: bind={}, model_dir={}, threshold={:.2}, judge={}",
        config.bind_address(),
        config.model_dir.display(),
        config.confidence_threshold,
        config.judge_model
    );

    // Nothing heavy is built here; both resources load on first use.
    let classifier = Arc::new(ResourceManager::new(
        "classifier",
        ClassifierLoader::new(&config.model_dir),
    ));
    let judge: Arc<JudgeManager> = Arc::new(ResourceManager::new(
        "judge client",
        GeminiLoader {
            endpoint: config.judge_endpoint.clone(),
            model: config.judge_model.clone(),
            api_key_var: config.judge_api_key_var.clone(),
            timeout: config.judge_timeout,
        },
    ));

    let decider = Decider::from_config(&config, classifier, judge)?;
    let state = Arc::new(AppState::new(decider, config.max_upload_bytes));

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    info!("  POST /api/detect        : classifier verdict (multipart \"file\")");
    info!("  POST /api/analyze       : ELA + judge verdict (JSON data URL)");
    info!("  POST /api/audit         : compression audit verdict (JSON data URL)");
    info!("  POST /api/proxy-image   : fetch a remote image as a data URL");

    axum::serve(listener, server::app(state)).await?;

    Ok(())
}
