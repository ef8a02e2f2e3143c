use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kaogong_api::{build_router, config::Config, services::sms::LogCodeSender, state::AppState};
use kaogong_llm::ClientFactory;
use kaogong_persist::{MongoPersistenceClient, PersistenceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_logging(&config);

    tracing::info!("Starting kaogong API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    // Initialize LLM client
    tracing::info!(provider = ?config.llm.provider, model = %config.llm.model, "Initializing LLM client");
    let llm_client = ClientFactory::create_chat_client(config.provider_config())?;

    // Initialize persistence client
    tracing::info!("Connecting to MongoDB");
    let persist: Arc<dyn PersistenceClient> =
        Arc::new(MongoPersistenceClient::connect(&config.mongodb_uri, &config.mongodb.database).await?);
    tracing::info!("MongoDB connected");

    // Create application state
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, persist, llm_client, Arc::new(LogCodeSender)));

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API docs: http://{}/api-docs/openapi.json", addr);

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
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
        _ => {
            registry.with(tracing_subscriber::fmt::layer().pretty()).init();
        }
    }
}
