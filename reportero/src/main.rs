use std::sync::Arc;
use tracing::{info, warn};

use reportero::agents::NewsWorkflow;
use reportero::api::{self, AppState};
use reportero::config::Config;
use reportero::metrics::Metrics;
use reportero::protocol::{AgentDirectory, ProtocolEngine};
use reportero::transport::{ws_client, PeerRouter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        "Starting A2A agent {} ({}) with capabilities {:?}",
        config.agent_name, config.agent_id, config.capabilities
    );

    // Protocol engine, routed over WebSockets and HTTP
    let directory = AgentDirectory::new();
    let router = PeerRouter::new(directory.clone(), config.request_timeout)?;
    let engine = Arc::new(ProtocolEngine::with_directory(
        config.identity(),
        directory,
        Arc::new(router.clone()),
    ));

    let workflow = Arc::new(NewsWorkflow::from_config(&config)?);
    workflow.register(&engine);
    info!(
        "News workflow ready (llm: {}, email: {})",
        config.openai_api_key.is_some(),
        config.smtp.is_some()
    );

    for peer in &config.peers {
        if let Err(e) = ws_client::dial(&peer.url, &peer.agent_id, engine.clone(), router.clone()).await {
            warn!("Could not link peer {}: {:#}", peer.agent_id, e);
        }
    }

    let metrics = Metrics::register(prometheus::default_registry())?;

    let routes = api::service(AppState {
        engine,
        router,
        metrics,
        request_timeout: config.request_timeout,
    });

    // Start server
    let addr = (config.host, config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes).run(addr).await;

    Ok(())
}
