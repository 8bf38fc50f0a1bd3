use argh::FromArgs;
use std::sync::Arc;
use veo_relay::{AppState, VeoConfig, router};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Relay for image-to-video generation jobs.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let config = VeoConfig::from_env();
    if config.api_key.is_none() {
        log::warn!("GEMINI_API_KEY is not set, every request will fail");
    }
    log::info!("Model: {} via {}", config.model, config.api_base);

    let app = router(Arc::new(AppState::from_config(config)));

    log::info!("Listening on: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
