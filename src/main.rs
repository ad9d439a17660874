use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use tracing::{info, warn};

use augurd::chain::gateway::{ChainOps, SolanaGateway};
use augurd::config::{Config, IngestMode};
use augurd::ingest::{PullIngester, PushIngester, TradeSink};
use augurd::lifecycle::Orchestrator;
use augurd::oracle::GroqOracle;
use augurd::store::{MarketStore, MemoryStore, ValkeyStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = if Path::new("augurd.toml").exists() {
        Config::load(Path::new("augurd.toml"))?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("augurd v{} starting", env!("CARGO_PKG_VERSION"));

    let program_id = config.solana.program_id()?;
    let revision = config.solana.revision.revision();
    let keypair = Arc::new(config.solana.keypair()?);
    let commitment = CommitmentConfig::confirmed();

    info!(
        rpc_url = %config.solana.rpc_url,
        program_id = %program_id,
        revision = ?config.solana.revision,
        "connecting to cluster"
    );
    let rpc = Arc::new(RpcClient::new_with_commitment(
        config.solana.rpc_url.clone(),
        commitment,
    ));

    // --- Store ---
    // Dedup and doesn't-double-submit guarantees live here, so a broken
    // store is fatal rather than degraded.
    let store: Arc<dyn MarketStore> = if config.store.url == "memory" {
        warn!("using in-memory store - state will not survive restarts");
        Arc::new(MemoryStore::new())
    } else {
        let valkey = ValkeyStore::connect(&config.store.url, "augurd").await?;
        valkey.ping().await?;
        info!(url = %config.store.url, "valkey store connected");
        Arc::new(valkey)
    };

    // --- Oracle ---
    if config.oracle.api_key.is_empty() {
        warn!("GROQ_API_KEY not set - market creation and resolution will fail");
    }
    let oracle = Arc::new(GroqOracle::new(
        config.oracle.url.clone(),
        config.oracle.model.clone(),
        config.oracle.api_key.clone(),
    ));

    // --- Chain gateway ---
    let gateway: Arc<dyn ChainOps> = Arc::new(SolanaGateway::new(
        Arc::clone(&rpc),
        keypair,
        program_id,
        revision,
    ));

    // --- Orchestrator ---
    let orchestrator = Arc::new(Orchestrator::new(
        gateway,
        Arc::clone(&store),
        oracle,
        config.agent.clone(),
    ));
    orchestrator.startup().await;

    // --- Trade ingestion ---
    let sink = Arc::new(TradeSink::new(Arc::clone(&store), revision));
    match config.agent.ingest {
        IngestMode::Push => {
            let ws_url = config.solana.ws_url();
            info!(ws_url = %ws_url, "starting push ingestion");
            let ingester = PushIngester::new(ws_url, program_id, commitment, sink);
            tokio::spawn(ingester.run());
        }
        IngestMode::Pull => {
            info!(
                poll_interval_secs = config.agent.poll_interval_secs,
                helius = config.helius.enabled(),
                "starting pull ingestion"
            );
            let ingester = PullIngester::new(
                Arc::clone(&rpc),
                program_id,
                commitment,
                sink,
                config.helius.clone(),
                config.agent.signature_batch,
                Duration::from_secs(config.agent.poll_interval_secs),
            );
            tokio::spawn(ingester.run());
        }
    }

    // --- Lifecycle loops ---
    tokio::spawn(Arc::clone(&orchestrator).run_creation_loop());
    tokio::spawn(Arc::clone(&orchestrator).run_resolution_loop());

    info!(
        creation_interval_secs = config.agent.creation_interval_secs,
        resolution_interval_secs = config.agent.resolution_interval_secs,
        "agent running - press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    Ok(())
}
