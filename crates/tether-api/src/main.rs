use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tether_api::{build_router, config::Config, state::AppState};
use tether_llm::OpenRouterClient;
use tether_stream::StreamPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_logging(&config);

    tracing::info!("Starting Tether API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    // Initialize upstream client
    let upstream = &config.upstream;
    tracing::info!(base_url = %upstream.base_url, "Initializing upstream client");
    let mut client = OpenRouterClient::builder()
        .api_key(config.openrouter_api_key.clone())
        .base_url(upstream.base_url.clone())
        .connect_timeout(Duration::from_secs(upstream.connect_timeout_secs));
    if let Some(prompt) = &upstream.default_system_prompt {
        client = client.default_system_prompt(prompt.clone());
    }
    if let Some(app_name) = &upstream.app_name {
        client = client.app_name(app_name.clone());
    }
    if let Some(referer) = &upstream.referer {
        client = client.referer(referer.clone());
    }
    let client = client.build()?;

    let stream_config = config.stream_config();
    tracing::info!(
        heartbeat_secs = stream_config.heartbeat_interval.as_secs(),
        timeout_secs = stream_config.stream_timeout.as_secs(),
        buffer_capacity = stream_config.buffer_capacity,
        "Streaming limits"
    );
    let pipeline = StreamPipeline::new(Arc::new(client), stream_config)?;

    // Create application state
    let state = Arc::new(AppState::new(config.clone(), pipeline));

    // Build router
    let app = build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
