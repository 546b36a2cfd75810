use anyhow::{bail, Context, Result};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::bundle::TransactionConfig;
use crate::chain::constants::{MIN_TIP_LAMPORTS, RAYDIUM_AMM_PROGRAM_ID};
use crate::chain::executor::ExecutionConfig;
use crate::relay::MempoolFilter;
use crate::utils::RetryPolicy;

/// Main configuration struct containing all sniper settings
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc: RpcConfig,
    pub relay: RelayConfig,
    pub wallet: WalletConfig,
    pub trade: TradeConfig,
    pub engine: EngineConfig,
    pub stream: StreamConfig,
}

/// RPC endpoint configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub commitment_level: String,
    pub timeout_seconds: u64,
}

/// Block engine configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub block_engine_url: String,
    pub auth_private_key: Secret,
    /// Empty means all regions
    pub regions: Vec<String>,
    pub token_refresh_margin_seconds: u64,
    /// Retries of the start-up auth and searcher connections
    pub connect_retries: u32,
    pub connect_retry_delay_ms: u64,
    /// Subscribe by write-locked accounts instead of by program when non-empty
    pub write_locked_accounts: Vec<Pubkey>,
}

/// Wallet configuration
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub keypair_path: Option<String>,
    pub private_key: Option<Secret>,
}

/// Trade sizing and fees
#[derive(Debug, Clone)]
pub struct TradeConfig {
    pub amount_lamports: u64,
    pub tip_lamports: u64,
    pub compute_unit_price: u64,
    pub compute_unit_limit: u32,
    pub min_amount_out: u64,
}

/// Execution timing
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub settle_delay_ms: u64,
    pub balance_poll_interval_ms: u64,
    pub balance_poll_attempts: u32,
    pub sell_interval_ms: u64,
    pub max_concurrent_opportunities: usize,
}

/// Mempool stream recovery
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// 0 = any stream error ends the process
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

/// String that never shows up in logs.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Config {
    /// Load configuration from `.env` and environment variables
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build and validate configuration from the process environment
    pub fn from_env() -> Result<Self> {
        // RPC configuration
        let rpc = RpcConfig {
            url: std::env::var("RPC_URL").context("RPC_URL not set")?,
            commitment_level: get_env_or_default("COMMITMENT_LEVEL", "confirmed"),
            timeout_seconds: get_u64_env("RPC_TIMEOUT_SECONDS", 30)?,
        };
        rpc.commitment()?;

        // Block engine configuration
        let relay = RelayConfig {
            block_engine_url: std::env::var("JITO_BLOCK_ENGINE_URL")
                .context("JITO_BLOCK_ENGINE_URL not set")?,
            auth_private_key: Secret::new(
                std::env::var("JITO_AUTH_PRIVATE_KEY").context("JITO_AUTH_PRIVATE_KEY not set")?,
            ),
            regions: parse_string_list(&get_env_or_default("JITO_REGIONS", "")),
            token_refresh_margin_seconds: get_u64_env("JITO_TOKEN_REFRESH_MARGIN_SECONDS", 60)?,
            connect_retries: get_u32_env("JITO_CONNECT_RETRIES", 3)?,
            connect_retry_delay_ms: get_u64_env("JITO_CONNECT_RETRY_DELAY_MS", 1_000)?,
            write_locked_accounts: parse_pubkey_list(&get_env_or_default(
                "MEMPOOL_WRITE_LOCKED_ACCOUNTS",
                "",
            ))?,
        };

        // Wallet configuration
        let wallet = WalletConfig {
            keypair_path: std::env::var("WALLET_KEYPAIR_PATH").ok(),
            private_key: std::env::var("TRADER_PRIVATE_KEY").ok().map(Secret::new),
        };
        if wallet.keypair_path.is_none() && wallet.private_key.is_none() {
            bail!("Either TRADER_PRIVATE_KEY or WALLET_KEYPAIR_PATH must be set");
        }

        // Trade configuration
        let trade = TradeConfig {
            amount_lamports: parse_required_u64("TRADE_AMOUNT_LAMPORTS")?,
            tip_lamports: parse_required_u64("JITO_TIP_LAMPORTS")?,
            compute_unit_price: get_u64_env("COMPUTE_UNIT_PRICE", 131_072)?,
            compute_unit_limit: get_u32_env("COMPUTE_UNIT_LIMIT", 65_536)?,
            min_amount_out: get_u64_env("MIN_AMOUNT_OUT", 0)?,
        };
        if trade.tip_lamports < MIN_TIP_LAMPORTS {
            bail!(
                "JITO_TIP_LAMPORTS must be at least {} (got {})",
                MIN_TIP_LAMPORTS,
                trade.tip_lamports
            );
        }
        if trade.amount_lamports == 0 {
            bail!("TRADE_AMOUNT_LAMPORTS must be greater than 0");
        }

        // Execution configuration
        let engine = EngineConfig {
            settle_delay_ms: get_u64_env("SETTLE_DELAY_MS", 2_000)?,
            balance_poll_interval_ms: get_u64_env("BALANCE_POLL_INTERVAL_MS", 200)?,
            balance_poll_attempts: get_u32_env("BALANCE_POLL_ATTEMPTS", 40)?,
            sell_interval_ms: get_u64_env("SELL_INTERVAL_MS", 200)?,
            max_concurrent_opportunities: get_u64_env("MAX_CONCURRENT_OPPORTUNITIES", 0)?
                as usize,
        };

        // Stream configuration
        let stream = StreamConfig {
            reconnect_attempts: get_u32_env("STREAM_RECONNECT_ATTEMPTS", 0)?,
            reconnect_delay_ms: get_u64_env("STREAM_RECONNECT_DELAY_MS", 500)?,
        };

        Ok(Config {
            rpc,
            relay,
            wallet,
            trade,
            engine,
            stream,
        })
    }

    /// Keypair that signs and pays for trades
    pub fn trader_keypair(&self) -> Result<Keypair> {
        if let Some(key) = &self.wallet.private_key {
            return keypair_from_base58(key.expose()).context("Invalid TRADER_PRIVATE_KEY");
        }
        match &self.wallet.keypair_path {
            Some(path) => read_keypair_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to read keypair file {}: {}", path, e)),
            None => bail!("Either TRADER_PRIVATE_KEY or WALLET_KEYPAIR_PATH must be set"),
        }
    }

    /// Keypair registered with the block engine
    pub fn auth_keypair(&self) -> Result<Keypair> {
        keypair_from_base58(self.relay.auth_private_key.expose())
            .context("Invalid JITO_AUTH_PRIVATE_KEY")
    }

    pub fn transaction_config(&self) -> TransactionConfig {
        TransactionConfig {
            compute_unit_price: self.trade.compute_unit_price,
            compute_unit_limit: self.trade.compute_unit_limit,
            tip_lamports: self.trade.tip_lamports,
            min_amount_out: self.trade.min_amount_out,
        }
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            trade_amount_lamports: self.trade.amount_lamports,
            settle_delay: Duration::from_millis(self.engine.settle_delay_ms),
            balance_poll_interval: Duration::from_millis(self.engine.balance_poll_interval_ms),
            balance_poll_attempts: self.engine.balance_poll_attempts,
            sell_interval: Duration::from_millis(self.engine.sell_interval_ms),
            max_concurrent: self.engine.max_concurrent_opportunities,
        }
    }

    pub fn mempool_filter(&self) -> MempoolFilter {
        if self.relay.write_locked_accounts.is_empty() {
            MempoolFilter::Programs(vec![RAYDIUM_AMM_PROGRAM_ID])
        } else {
            MempoolFilter::WriteLockedAccounts(self.relay.write_locked_accounts.clone())
        }
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.stream.reconnect_attempts)
            .with_initial_interval(Duration::from_millis(self.stream.reconnect_delay_ms))
    }

    /// Backoff for establishing the block engine session at start-up
    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.relay.connect_retries)
            .with_initial_interval(Duration::from_millis(self.relay.connect_retry_delay_ms))
    }
}

impl RpcConfig {
    pub fn commitment(&self) -> Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment_level)
            .map_err(|_| anyhow::anyhow!("Invalid COMMITMENT_LEVEL '{}'", self.commitment_level))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ============================================================================
// Helper Functions for Environment Variable Parsing
// ============================================================================

/// Decode a base58 64-byte secret key
pub fn keypair_from_base58(encoded: &str) -> Result<Keypair> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .context("Private key is not valid base58")?;
    Keypair::from_bytes(&bytes).map_err(|e| anyhow::anyhow!("Invalid keypair bytes: {}", e))
}

/// Get environment variable or return default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get u32 environment variable with default
fn get_u32_env(key: &str, default: u32) -> Result<u32> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .context(format!("Failed to parse {} as u32", key))
}

/// Get u64 environment variable with default
fn get_u64_env(key: &str, default: u64) -> Result<u64> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .context(format!("Failed to parse {} as u64", key))
}

fn parse_required_u64(key: &str) -> Result<u64> {
    std::env::var(key)
        .context(format!("{} not set", key))?
        .parse()
        .context(format!("Failed to parse {} as u64", key))
}

/// Parse comma-separated string list
fn parse_string_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse comma-separated list of pubkeys
fn parse_pubkey_list(input: &str) -> Result<Vec<Pubkey>> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| Pubkey::from_str(s).context(format!("Failed to parse '{}' as Pubkey", s)))
        .collect()
}
