// Block Engine Mempool Watching
//
// Consumes the authenticated pending-transaction stream and looks for Raydium
// pool creations (`initialize2`). Each accepted creation becomes a `Trigger`
// handed to a `TriggerSink` without waiting on it, so slow executions never
// hold up the stream.
//
// Transactions inside one notification are handled in receipt order, and the
// instructions of one transaction in their own order.
//
// Stream errors end the watcher unless a reconnect budget is configured, in
// which case it resubscribes with exponential backoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use solana_sdk::{
    hash::Hash, instruction::CompiledInstruction, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::constants::{RAYDIUM_AMM_PROGRAM_ID, WSOL_MINT};
use crate::codec::raydium::{initialize2_accounts, traded_mint, CreatePoolInstruction};
use crate::codec::DecodeError;
use crate::relay::proto::searcher::PendingTxNotification;
use crate::relay::{MempoolFilter, RelayError, SearcherRelay};
use crate::utils::RetryPolicy;

pub type NotificationStream = BoxStream<'static, Result<PendingTxNotification, tonic::Status>>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("mempool subscription failed: {0}")]
    Subscribe(#[from] RelayError),
    #[error("mempool stream error: {0}")]
    Stream(String),
    #[error("mempool stream closed by server")]
    StreamClosed,
}

/// Why a single pending transaction produced no trigger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("undecodable transaction: {0}")]
    Transaction(String),
    #[error(transparent)]
    Instruction(#[from] DecodeError),
    #[error("pool creation has {found} accounts, expected at least {needed}")]
    TooFewAccounts { needed: usize, found: usize },
    #[error("account at position {position} is loaded from a lookup table")]
    LookupTableAccount { position: usize },
}

/// A pool creation seen in the mempool.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub signature: Signature,
    /// The creating transaction exactly as received
    pub raw_tx: Vec<u8>,
    pub pool: Pubkey,
    pub market: Pubkey,
    pub coin_mint: Pubkey,
    pub pc_mint: Pubkey,
    pub coin_vault: Pubkey,
    pub pc_vault: Pubkey,
    /// The non-WSOL side of the pool
    pub mint: Pubkey,
    pub open_time: u64,
    /// Blockhash the creating transaction was signed over
    pub recent_blockhash: Hash,
    pub detected_at: Instant,
}

/// Receives accepted triggers. Must return without waiting on the execution.
pub trait TriggerSink: Send + Sync {
    fn dispatch(&self, trigger: Trigger);
}

impl TriggerSink for mpsc::UnboundedSender<Trigger> {
    fn dispatch(&self, trigger: Trigger) {
        if let Err(e) = self.send(trigger) {
            warn!(pool = %e.0.pool, "Trigger receiver dropped");
        }
    }
}

/// Where notifications come from.
#[async_trait]
pub trait MempoolSource: Send + Sync {
    async fn subscribe(&self) -> Result<NotificationStream, RelayError>;
}

/// `MempoolSource` backed by the searcher service.
pub struct RelayMempoolSource {
    relay: SearcherRelay,
    filter: MempoolFilter,
    regions: Vec<String>,
}

impl RelayMempoolSource {
    pub fn new(relay: SearcherRelay, filter: MempoolFilter, regions: Vec<String>) -> Self {
        Self {
            relay,
            filter,
            regions,
        }
    }
}

#[async_trait]
impl MempoolSource for RelayMempoolSource {
    async fn subscribe(&self) -> Result<NotificationStream, RelayError> {
        let stream = self
            .relay
            .subscribe_mempool(&self.filter, &self.regions)
            .await?;
        Ok(stream.boxed())
    }
}

/// Decode one pending transaction and return its open pool creations.
///
/// Creations whose open time is after `now_unix` are skipped. The check uses
/// local wall-clock time, so it is only as accurate as the host clock.
/// A malformed Raydium instruction is logged and skipped without dropping the
/// creations already found in the same transaction.
pub fn extract_triggers(data: &[u8], now_unix: u64) -> Result<Vec<Trigger>, TriggerError> {
    let tx: VersionedTransaction =
        bincode::deserialize(data).map_err(|e| TriggerError::Transaction(e.to_string()))?;
    let keys = tx.message.static_account_keys();
    let signature = tx.signatures.first().copied().unwrap_or_default();
    let recent_blockhash = *tx.message.recent_blockhash();

    let mut triggers = Vec::new();
    for (index, ix) in tx.message.instructions().iter().enumerate() {
        match keys.get(ix.program_id_index as usize) {
            Some(program) if *program == RAYDIUM_AMM_PROGRAM_ID => {}
            _ => continue,
        }
        match creation_accounts(keys, ix, now_unix) {
            Ok(Some((create, accounts))) => triggers.push(Trigger {
                signature,
                raw_tx: data.to_vec(),
                pool: accounts.pool,
                market: accounts.market,
                coin_mint: accounts.coin_mint,
                pc_mint: accounts.pc_mint,
                coin_vault: accounts.coin_vault,
                pc_vault: accounts.pc_vault,
                mint: traded_mint(accounts.coin_mint, accounts.pc_mint, &WSOL_MINT),
                open_time: create.open_time,
                recent_blockhash,
                detected_at: Instant::now(),
            }),
            Ok(None) => {}
            Err(e) => debug!(%signature, instruction = index, "Skipping instruction: {}", e),
        }
    }
    Ok(triggers)
}

struct CreationAccounts {
    pool: Pubkey,
    market: Pubkey,
    coin_mint: Pubkey,
    pc_mint: Pubkey,
    coin_vault: Pubkey,
    pc_vault: Pubkey,
}

/// `None` for other Raydium instructions and for pools not open yet.
fn creation_accounts(
    keys: &[Pubkey],
    ix: &CompiledInstruction,
    now_unix: u64,
) -> Result<Option<(CreatePoolInstruction, CreationAccounts)>, TriggerError> {
    let Some(create) = CreatePoolInstruction::decode(&ix.data)? else {
        return Ok(None);
    };
    if ix.accounts.len() < initialize2_accounts::MIN_ACCOUNTS {
        return Err(TriggerError::TooFewAccounts {
            needed: initialize2_accounts::MIN_ACCOUNTS,
            found: ix.accounts.len(),
        });
    }
    let account = |position: usize| -> Result<Pubkey, TriggerError> {
        keys.get(ix.accounts[position] as usize)
            .copied()
            .ok_or(TriggerError::LookupTableAccount { position })
    };

    let pool = account(initialize2_accounts::AMM)?;
    if !create.is_open_at(now_unix) {
        debug!(
            %pool,
            open_time = create.open_time,
            now = now_unix,
            "Ignoring pool that opens in the future"
        );
        return Ok(None);
    }

    let accounts = CreationAccounts {
        pool,
        market: account(initialize2_accounts::MARKET)?,
        coin_mint: account(initialize2_accounts::COIN_MINT)?,
        pc_mint: account(initialize2_accounts::PC_MINT)?,
        coin_vault: account(initialize2_accounts::COIN_VAULT)?,
        pc_vault: account(initialize2_accounts::PC_VAULT)?,
    };
    Ok(Some((create, accounts)))
}

pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Counters since start-up
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub notifications: u64,
    pub transactions: u64,
    pub triggers: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    notifications: AtomicU64,
    transactions: AtomicU64,
    triggers: AtomicU64,
    skipped: AtomicU64,
}

pub struct MempoolWatcher<S> {
    sink: S,
    reconnect: RetryPolicy,
    counters: Counters,
}

impl<S: TriggerSink> MempoolWatcher<S> {
    /// Fail-fast watcher: the first stream error ends `run`.
    pub fn new(sink: S) -> Self {
        Self::with_reconnect(sink, RetryPolicy::new(0))
    }

    pub fn with_reconnect(sink: S, reconnect: RetryPolicy) -> Self {
        info!(
            "Initializing MempoolWatcher (reconnect attempts: {})",
            reconnect.max_retries
        );
        Self {
            sink,
            reconnect,
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            notifications: self.counters.notifications.load(Ordering::Relaxed),
            transactions: self.counters.transactions.load(Ordering::Relaxed),
            triggers: self.counters.triggers.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Process one notification; returns how many triggers were dispatched.
    pub fn handle_notification(&self, notification: &PendingTxNotification, now_unix: u64) -> usize {
        self.counters.notifications.fetch_add(1, Ordering::Relaxed);
        let mut dispatched = 0;

        for packet in &notification.transactions {
            self.counters.transactions.fetch_add(1, Ordering::Relaxed);
            match extract_triggers(&packet.data, now_unix) {
                Ok(triggers) => {
                    for trigger in triggers {
                        info!(
                            pool = %trigger.pool,
                            mint = %trigger.mint,
                            market = %trigger.market,
                            open_time = trigger.open_time,
                            signature = %trigger.signature,
                            "New pool detected"
                        );
                        self.sink.dispatch(trigger);
                        dispatched += 1;
                    }
                }
                Err(e) => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("Skipping pending transaction: {}", e);
                }
            }
        }

        self.counters
            .triggers
            .fetch_add(dispatched as u64, Ordering::Relaxed);
        dispatched
    }

    /// Read the stream until `cancel` fires or it fails for good.
    pub async fn run<M: MempoolSource>(
        &self,
        source: &M,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let mut stream = source.subscribe().await?;
        info!("Mempool watcher started");
        let mut delays = self.reconnect.delays();

        loop {
            let failure = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(stats = ?self.stats(), "Mempool watcher stopped");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(Ok(notification)) => {
                        self.handle_notification(&notification, unix_now());
                        delays = self.reconnect.delays();
                        continue;
                    }
                    Some(Err(status)) => {
                        WatchError::Stream(format!("{:?}: {}", status.code(), status.message()))
                    }
                    None => WatchError::StreamClosed,
                }
            };

            match self.resubscribe(source, &mut delays, failure, &cancel).await? {
                Some(next) => stream = next,
                None => return Ok(()),
            }
        }
    }

    async fn resubscribe<M: MempoolSource>(
        &self,
        source: &M,
        delays: &mut impl Iterator<Item = Duration>,
        failure: WatchError,
        cancel: &CancellationToken,
    ) -> Result<Option<NotificationStream>, WatchError> {
        if self.reconnect.is_fail_fast() {
            error!("Mempool stream failed: {}", failure);
            return Err(failure);
        }
        warn!("Mempool stream interrupted: {}", failure);

        for (attempt, delay) in delays.by_ref().enumerate() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
            match source.subscribe().await {
                Ok(stream) => {
                    info!(attempt = attempt + 1, "Resubscribed to mempool");
                    return Ok(Some(stream));
                }
                Err(e) => warn!(attempt = attempt + 1, "Mempool resubscribe failed: {}", e),
            }
        }

        error!(
            "Giving up on mempool stream after {} reconnect attempts",
            self.reconnect.max_retries
        );
        Err(failure)
    }
}
