use aisuite_nexus::config::Config;
use aisuite_nexus::db::UserStore;
use aisuite_nexus::router::{NexusState, nexus_router};
use aisuite_nexus::service::auth::AuthService;
use aisuite_nexus::service::gateway::AiGateway;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        model = %cfg.gemini_model,
        prompts_dir = %cfg.prompts_dir.display(),
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel
    );

    // Without an API key the service cannot do anything useful.
    let gateway = AiGateway::from_config(&cfg)?;
    let auth = AuthService::from_config(&cfg)?;

    let store = UserStore::connect(&cfg.database_url).await?;
    store.init_schema().await?;

    let state = NexusState::new(store, auth, gateway, cfg.max_upload_bytes);
    let app = nexus_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
