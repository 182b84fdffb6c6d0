use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider, Ws};
use ethers::signers::{LocalWallet, Signer};
use relayer::{
    api::Server,
    chain::{ChainClient, EthersChainClient},
    config::{ChainConfig, Config},
    l1::{AssertionTracker, L1Listener},
    proof::ProofGenerator,
    store::open_store,
    transfer::TransferContext,
    TransferOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Connect to one chain with a signing client; `ws(s)://` URLs get a
/// websocket transport, anything else http.
async fn connect(
    name: &str,
    chain: &ChainConfig,
    wallet: &LocalWallet,
    poll_interval: Duration,
) -> anyhow::Result<Arc<dyn ChainClient>> {
    let wallet = wallet.clone().with_chain_id(chain.chain_id);
    let client: Arc<dyn ChainClient> = if chain.rpc_url.starts_with("ws") {
        let provider = Provider::<Ws>::connect(chain.rpc_url.as_str()).await?;
        Arc::new(EthersChainClient::new(name, SignerMiddleware::new(provider, wallet), poll_interval))
    } else {
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())?;
        Arc::new(EthersChainClient::new(name, SignerMiddleware::new(provider, wallet), poll_interval))
    };
    let head = client.block_number().await?;
    info!("Connected to {} ({}) at block {}", name, chain.rpc_url, head);
    Ok(client)
}

/// The main entry point for the relayer.
///
/// Loads configuration, connects to both chains, starts the L1 listener,
/// resumes unfinished transfers and serves the JSON-RPC API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load(&path)?;
    info!("Relayer starting with config: {:?}", config);

    let key = std::env::var(&config.private_key_env)
        .map_err(|_| anyhow::anyhow!("{} is not set", config.private_key_env))?;
    let wallet: LocalWallet = key.trim_start_matches("0x").parse()?;
    info!("Relaying as {:?}", wallet.address());

    let poll_interval = Duration::from_millis(config.transfer.poll_interval_ms);
    let l1 = connect("l1", &config.l1, &wallet, poll_interval).await?;
    let l2 = connect("l2", &config.l2, &wallet, poll_interval).await?;
    let store = open_store(&config.database.url).await?;

    // The listener is the tracker's only writer.
    let tracker = Arc::new(AssertionTracker::new());
    let listener = Arc::new(
        L1Listener::new(l1.clone(), &config.tracker, tracker.clone())
            .with_retry(config.transfer.rpc_retry.clone()),
    );
    let running = listener.clone();
    tokio::spawn(async move { running.start().await });
    info!("L1 event listener started");

    let ctx = Arc::new(TransferContext {
        l1,
        l2,
        contracts: config.contracts.clone(),
        tracker,
        store,
        proofs: ProofGenerator::new(config.transfer.proof_retry.clone()),
        rpc_retry: config.transfer.rpc_retry.clone(),
        poll_interval,
    });
    let orchestrator = Arc::new(TransferOrchestrator::new(
        ctx,
        listener,
        config.transfer.min_gas_limit,
    ));
    let resumed = orchestrator.resume_all().await?;
    info!("{} unfinished transfers resumed", resumed);

    let server = Server::new(config.api.clone(), orchestrator);
    server.start().await?;

    Ok(())
}
