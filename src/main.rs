use anyhow::{Context, Result};
use jito_pool_sniper::chain::{
    BundleAssembler, ExecutionEngine, MempoolWatcher, RelayMempoolSource, RpcChainClient,
    SendConfig,
};
use jito_pool_sniper::config::Config;
use jito_pool_sniper::relay::{AuthError, RelayAuthClient, SearcherRelay};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Delay before retrying a failed session renewal
const AUTH_RETRY_DELAY: Duration = Duration::from_secs(5);

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(false).with_current_span(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ========================================================================
    // Step 1: Logging and configuration
    // ========================================================================
    dotenvy::dotenv().ok();
    init_tracing();
    info!("Starting Jito pool sniper...");

    let config = Config::load().context("Failed to load configuration")?;
    info!("Configuration loaded");
    debug!(
        "Trade config: amount={} lamports, tip={} lamports, cu_price={}, cu_limit={}",
        config.trade.amount_lamports,
        config.trade.tip_lamports,
        config.trade.compute_unit_price,
        config.trade.compute_unit_limit
    );

    // ========================================================================
    // Step 2: Keys and RPC
    // ========================================================================
    let payer = Arc::new(config.trader_keypair()?);
    let auth_keypair = Arc::new(config.auth_keypair()?);
    info!("Wallet loaded: {}", payer.pubkey());
    info!("Block engine identity: {}", auth_keypair.pubkey());

    let commitment = config.rpc.commitment()?;
    let rpc_client = Arc::new(RpcClient::new_with_timeout_and_commitment(
        config.rpc.url.clone(),
        config.rpc.timeout(),
        commitment,
    ));
    info!("RPC client initialized: {} ({})", config.rpc.url, config.rpc.commitment_level);

    match rpc_client.get_balance(&payer.pubkey()).await {
        Ok(balance) => info!(
            "Wallet balance: {:.4} SOL ({} lamports)",
            balance as f64 / 1e9,
            balance
        ),
        Err(e) => warn!("Failed to check wallet balance, continuing: {}", e),
    }

    // ========================================================================
    // Step 3: Block engine session
    // ========================================================================
    let cancel = CancellationToken::new();

    let connect_policy = config.connect_policy();
    let auth = connect_policy
        .retry_async(|| {
            let keypair = Arc::clone(&auth_keypair);
            let url = config.relay.block_engine_url.clone();
            let timeout = config.rpc.timeout();
            async move {
                let client = RelayAuthClient::connect(&url, timeout, keypair).await?;
                client.authenticate().await?;
                Ok::<_, AuthError>(client)
            }
        })
        .await
        .context("Block engine authentication failed")?;
    let auth = Arc::new(auth);
    let refresh_task = Arc::clone(&auth).spawn_refresh_task(
        Duration::from_secs(config.relay.token_refresh_margin_seconds),
        AUTH_RETRY_DELAY,
        cancel.clone(),
    );

    let relay = connect_policy
        .retry_async(|| {
            SearcherRelay::connect(
                &config.relay.block_engine_url,
                config.rpc.timeout(),
                auth.interceptor(),
            )
        })
        .await
        .context("Failed to connect to block engine searcher service")?;
    let results_task = relay.spawn_bundle_result_logger(cancel.clone());

    // ========================================================================
    // Step 4: Engine and watcher
    // ========================================================================
    let chain = Arc::new(RpcChainClient::new(
        Arc::clone(&rpc_client),
        commitment,
        SendConfig::default(),
    ));
    let engine = Arc::new(ExecutionEngine::new(
        chain,
        Arc::new(relay.clone()),
        Arc::clone(&payer),
        BundleAssembler::new(config.transaction_config()),
        config.execution_config(),
        cancel.clone(),
    ));

    let watcher = MempoolWatcher::with_reconnect(Arc::clone(&engine), config.reconnect_policy());
    let source = RelayMempoolSource::new(
        relay,
        config.mempool_filter(),
        config.relay.regions.clone(),
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    cancel.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }

    // ========================================================================
    // Step 5: Run until shutdown or a fatal stream error
    // ========================================================================
    let result = watcher.run(&source, cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = refresh_task.await {
        warn!("Token refresh task ended abnormally: {}", e);
    }
    if let Err(e) = results_task.await {
        warn!("Bundle result task ended abnormally: {}", e);
    }
    info!(stats = ?watcher.stats(), "Sniper stopped");

    result.context("Mempool watcher failed")
}
