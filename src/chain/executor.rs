use solana_sdk::{pubkey::Pubkey, signature::Keypair, signature::Signature, signer::Signer};
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::address::{AddressDeriver, DerivationError};
use super::bundle::{BundleAssembler, BundleError, PoolKeys, SwapSide};
use super::constants::{OPENBOOK_PROGRAM_ID, SERUM_PROGRAM_ID};
use super::mempool::{Trigger, TriggerSink};
use super::rpc::{ChainClient, ChainError};
use crate::codec::serum::MarketRecord;
use crate::codec::DecodeError;
use crate::relay::{BundleRelay, RelayError};

/// Pool key resolution failure; voids the opportunity.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot fetch market {market}: {source}")]
    Market { market: Pubkey, source: ChainError },
    #[error("market {market} is owned by {owner}, not an order-book program")]
    UnknownMarketProgram { market: Pubkey, owner: Pubkey },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("key resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("bundle submission failed: {0}")]
    Submit(#[from] RelayError),
}

/// Per-opportunity lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Detected,
    KeysResolved,
    BundleSubmitted,
    SellPolling,
    Sold,
    GivenUp,
    /// stopped by shutdown before a terminal state
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Sold {
        signature: Signature,
        amount: u64,
        attempts: u32,
    },
    GivenUp {
        polls: u32,
    },
    Abandoned {
        during: ExecutionState,
    },
}

impl ExecutionOutcome {
    pub fn state(&self) -> ExecutionState {
        match self {
            ExecutionOutcome::Sold { .. } => ExecutionState::Sold,
            ExecutionOutcome::GivenUp { .. } => ExecutionState::GivenUp,
            ExecutionOutcome::Abandoned { .. } => ExecutionState::Abandoned,
        }
    }
}

/// Timing and sizing of one execution
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    /// WSOL spent on the buy leg
    pub trade_amount_lamports: u64,
    /// Wait between bundle submission and the first balance poll
    pub settle_delay: Duration,
    pub balance_poll_interval: Duration,
    pub balance_poll_attempts: u32,
    pub sell_interval: Duration,
    /// Cap on in-flight opportunities; 0 = unbounded
    pub max_concurrent: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            trade_amount_lamports: 10_000_000, // 0.01 SOL
            settle_delay: Duration::from_millis(2_000),
            balance_poll_interval: Duration::from_millis(200),
            balance_poll_attempts: 40,
            sell_interval: Duration::from_millis(200),
            max_concurrent: 0,
        }
    }
}

enum PollResult {
    Balance(u64),
    Exhausted,
    Cancelled,
}

/// Drives every detected pool from trigger to exit.
///
/// Opportunities share only the signing key, the chain client and the relay;
/// everything else lives inside a single `execute` call.
pub struct ExecutionEngine<C, R> {
    chain: Arc<C>,
    relay: Arc<R>,
    payer: Arc<Keypair>,
    assembler: BundleAssembler,
    config: ExecutionConfig,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

impl<C, R> ExecutionEngine<C, R>
where
    C: ChainClient + 'static,
    R: BundleRelay + 'static,
{
    pub fn new(
        chain: Arc<C>,
        relay: Arc<R>,
        payer: Arc<Keypair>,
        assembler: BundleAssembler,
        config: ExecutionConfig,
        cancel: CancellationToken,
    ) -> Self {
        info!(
            "Initializing ExecutionEngine wallet={} amount={} max_concurrent={}",
            payer.pubkey(),
            config.trade_amount_lamports,
            config.max_concurrent
        );
        let limiter = (config.max_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent)));
        Self {
            chain,
            relay,
            payer,
            assembler,
            config,
            limiter,
            cancel,
        }
    }

    /// Every account the buy and sell swaps need.
    ///
    /// `deriver` belongs to the opportunity being resolved and is dropped with it.
    pub async fn resolve_keys(
        &self,
        trigger: &Trigger,
        deriver: &AddressDeriver,
    ) -> Result<PoolKeys, ResolveError> {
        let account = self
            .chain
            .get_account(&trigger.market)
            .await
            .map_err(|source| ResolveError::Market {
                market: trigger.market,
                source,
            })?;
        if account.owner != SERUM_PROGRAM_ID && account.owner != OPENBOOK_PROGRAM_ID {
            return Err(ResolveError::UnknownMarketProgram {
                market: trigger.market,
                owner: account.owner,
            });
        }

        let market = MarketRecord::decode_for(&trigger.market, &account.data)?;
        let vault_signer = deriver.vault_signer(&trigger.market, &account.owner)?;
        if vault_signer.nonce != market.vault_signer_nonce {
            debug!(
                market = %trigger.market,
                derived = vault_signer.nonce,
                stored = market.vault_signer_nonce,
                "Vault signer nonce differs from market record"
            );
        }

        Ok(PoolKeys {
            id: trigger.pool,
            authority: deriver.amm_authority(),
            open_orders: deriver.amm_open_orders(&trigger.market),
            target_orders: deriver.amm_target_orders(&trigger.market),
            base_vault: trigger.coin_vault,
            quote_vault: trigger.pc_vault,
            market_program: account.owner,
            market_id: trigger.market,
            market_bids: market.bids,
            market_asks: market.asks,
            market_event_queue: market.event_queue,
            market_base_vault: market.base_vault,
            market_quote_vault: market.quote_vault,
            market_authority: vault_signer.address,
        })
    }

    /// Build the buy bundle behind the trigger transaction and send it once.
    ///
    /// The buy is signed over the trigger's own blockhash so both packets of
    /// the bundle share it.
    pub async fn submit_buy(
        &self,
        trigger: &Trigger,
        keys: &PoolKeys,
    ) -> Result<String, ExecutionError> {
        let bundle = self.assembler.build_bundle(
            &self.payer,
            SwapSide::Buy,
            trigger.mint,
            self.config.trade_amount_lamports,
            keys,
            trigger.recent_blockhash,
            std::slice::from_ref(&trigger.raw_tx),
        )?;
        Ok(self.relay.send_bundle(bundle).await?)
    }

    /// Run one opportunity to a terminal state.
    ///
    /// Errors before submission abort the opportunity; nothing is retried on
    /// the buy leg.
    pub async fn execute(&self, trigger: Trigger) -> Result<ExecutionOutcome, ExecutionError> {
        let started = trigger.detected_at;
        let pool = trigger.pool;
        let mint = trigger.mint;
        info!(state = ?ExecutionState::Detected, %pool, %mint, "Opportunity received");

        let keys = self.resolve_keys(&trigger, &AddressDeriver::new()).await?;
        info!(
            state = ?ExecutionState::KeysResolved,
            %pool,
            market = %keys.market_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pool keys resolved"
        );

        let bundle_id = self.submit_buy(&trigger, &keys).await?;
        info!(
            state = ?ExecutionState::BundleSubmitted,
            %pool,
            %mint,
            %bundle_id,
            amount = self.config.trade_amount_lamports,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Buy bundle submitted"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Ok(self.abandon(pool, ExecutionState::BundleSubmitted));
            }
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }

        info!(state = ?ExecutionState::SellPolling, %pool, %mint, "Polling token balance");
        let amount = match self.wait_for_balance(&mint).await {
            PollResult::Balance(amount) => amount,
            PollResult::Exhausted => {
                info!(
                    state = ?ExecutionState::GivenUp,
                    %pool,
                    %mint,
                    polls = self.config.balance_poll_attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "No tokens received, giving up"
                );
                return Ok(ExecutionOutcome::GivenUp {
                    polls: self.config.balance_poll_attempts,
                });
            }
            PollResult::Cancelled => {
                return Ok(self.abandon(pool, ExecutionState::SellPolling));
            }
        };

        let outcome = self.sell_until_accepted(mint, amount, &keys).await;
        if let ExecutionOutcome::Sold {
            signature,
            amount,
            attempts,
        } = &outcome
        {
            info!(
                state = ?ExecutionState::Sold,
                %pool,
                %mint,
                %signature,
                amount,
                attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Position sold"
            );
        }
        Ok(outcome)
    }

    async fn wait_for_balance(&self, mint: &Pubkey) -> PollResult {
        let token_account = get_associated_token_address(&self.payer.pubkey(), mint);

        for poll in 1..=self.config.balance_poll_attempts {
            match self.chain.get_token_balance(&token_account).await {
                Ok(balance) if balance > 0 => {
                    debug!(%mint, balance, poll, "Token balance available");
                    return PollResult::Balance(balance);
                }
                Ok(_) => debug!(%mint, poll, "Token balance still zero"),
                Err(e) => debug!(%mint, poll, "Balance poll failed: {}", e),
            }

            if poll < self.config.balance_poll_attempts {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return PollResult::Cancelled,
                    _ = tokio::time::sleep(self.config.balance_poll_interval) => {}
                }
            }
        }
        PollResult::Exhausted
    }

    /// Resend a freshly signed sell every tick until one is accepted or
    /// shutdown is requested.
    async fn sell_until_accepted(&self, mint: Pubkey, amount: u64, keys: &PoolKeys) -> ExecutionOutcome {
        let mut ticker = tokio::time::interval(self.config.sell_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.abandon(keys.id, ExecutionState::SellPolling);
                }
                _ = ticker.tick() => {}
            }
            attempts += 1;

            let blockhash = match self.chain.get_latest_blockhash().await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(%mint, attempts, "Sell skipped, no blockhash: {}", e);
                    continue;
                }
            };
            let tx = match self.assembler.build_swap_tx(
                &self.payer,
                SwapSide::Sell,
                mint,
                amount,
                keys,
                blockhash,
            ) {
                Ok(tx) => tx,
                Err(e) => {
                    error!(%mint, attempts, "Failed to build sell transaction: {}", e);
                    continue;
                }
            };

            match self.chain.send_transaction(&tx).await {
                Ok(signature) => {
                    return ExecutionOutcome::Sold {
                        signature,
                        amount,
                        attempts,
                    }
                }
                Err(e) => warn!(%mint, attempts, "Sell attempt rejected: {}", e),
            }
        }
    }

    fn abandon(&self, pool: Pubkey, during: ExecutionState) -> ExecutionOutcome {
        warn!(state = ?ExecutionState::Abandoned, %pool, ?during, "Shutdown requested, abandoning opportunity");
        ExecutionOutcome::Abandoned { during }
    }

    /// Run `trigger` on its own task, waiting for a slot when capped.
    pub fn spawn(self: &Arc<Self>, trigger: Trigger) -> tokio::task::JoinHandle<Option<ExecutionOutcome>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = match &engine.limiter {
                Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        error!("Opportunity limiter closed: {}", e);
                        return None;
                    }
                },
                None => None,
            };

            let pool = trigger.pool;
            let started = Instant::now();
            match engine.execute(trigger).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(
                        %pool,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Opportunity aborted: {}",
                        e
                    );
                    None
                }
            }
        })
    }
}

impl<C, R> TriggerSink for Arc<ExecutionEngine<C, R>>
where
    C: ChainClient + 'static,
    R: BundleRelay + 'static,
{
    fn dispatch(&self, trigger: Trigger) {
        drop(self.spawn(trigger));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::bundle::TransactionConfig;
    use crate::chain::rpc::MockChainClient;
    use crate::codec::serum::tests::sample_market;
    use crate::codec::RawAccount;
    use crate::relay::proto::bundle::Bundle;
    use crate::relay::searcher::MockBundleRelay;
    use solana_sdk::hash::Hash;
    use solana_sdk::transaction::VersionedTransaction;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> ExecutionConfig {
        ExecutionConfig {
            trade_amount_lamports: 1_000_000,
            settle_delay: Duration::from_millis(1),
            balance_poll_interval: Duration::from_millis(1),
            balance_poll_attempts: 3,
            sell_interval: Duration::from_millis(1),
            max_concurrent: 0,
        }
    }

    fn trigger_for(market: Pubkey) -> Trigger {
        Trigger {
            signature: Signature::default(),
            raw_tx: vec![7; 64],
            pool: Pubkey::new_unique(),
            market,
            coin_mint: Pubkey::new_unique(),
            pc_mint: crate::chain::constants::WSOL_MINT,
            coin_vault: Pubkey::new_unique(),
            pc_vault: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            open_time: 0,
            recent_blockhash: Hash::new_unique(),
            detected_at: Instant::now(),
        }
    }

    fn chain_with_market(market: &MarketRecord, owner: Pubkey) -> MockChainClient {
        let raw = RawAccount::new(market.id, owner, market.encode());
        let mut chain = MockChainClient::new();
        chain
            .expect_get_account()
            .returning(move |_| Ok(raw.clone()));
        chain
            .expect_get_latest_blockhash()
            .returning(|| Ok(Hash::new_unique()));
        chain
    }

    fn engine(
        chain: MockChainClient,
        relay: MockBundleRelay,
        cancel: CancellationToken,
    ) -> Arc<ExecutionEngine<MockChainClient, MockBundleRelay>> {
        Arc::new(ExecutionEngine::new(
            Arc::new(chain),
            Arc::new(relay),
            Arc::new(Keypair::new()),
            BundleAssembler::new(TransactionConfig::default()),
            fast_config(),
            cancel,
        ))
    }

    #[tokio::test]
    async fn test_resolve_keys_from_market() {
        let market = sample_market();
        let chain = chain_with_market(&market, SERUM_PROGRAM_ID);
        let engine = engine(chain, MockBundleRelay::new(), CancellationToken::new());
        let trigger = trigger_for(market.id);

        let keys = engine.resolve_keys(&trigger, &AddressDeriver::new()).await.unwrap();
        assert_eq!(keys.id, trigger.pool);
        assert_eq!(keys.base_vault, trigger.coin_vault);
        assert_eq!(keys.market_bids, market.bids);
        assert_eq!(keys.market_asks, market.asks);
        assert_eq!(keys.market_event_queue, market.event_queue);
        assert_eq!(keys.market_program, SERUM_PROGRAM_ID);
        assert!(keys.all().iter().all(|k| *k != Pubkey::default()));
    }

    #[tokio::test]
    async fn test_resolve_rejects_foreign_market_owner() {
        let market = sample_market();
        let chain = chain_with_market(&market, Pubkey::new_unique());
        let engine = engine(chain, MockBundleRelay::new(), CancellationToken::new());
        let err = engine
            .resolve_keys(&trigger_for(market.id), &AddressDeriver::new())
            .await.unwrap_err();
        assert!(matches!(err, ResolveError::UnknownMarketProgram { .. }));
    }

    #[tokio::test]
    async fn test_resolve_rejects_mismatched_market() {
        let market = sample_market();
        let chain = chain_with_market(&market, OPENBOOK_PROGRAM_ID);
        let engine = engine(chain, MockBundleRelay::new(), CancellationToken::new());
        let err = engine
            .resolve_keys(&trigger_for(Pubkey::new_unique()), &AddressDeriver::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Decode(DecodeError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_deriver_scoped_to_one_resolution() {
        let market = sample_market();
        let chain = chain_with_market(&market, SERUM_PROGRAM_ID);
        let engine = engine(chain, MockBundleRelay::new(), CancellationToken::new());

        let deriver = AddressDeriver::new();
        engine
            .resolve_keys(&trigger_for(market.id), &deriver)
            .await
            .unwrap();
        // vault signer, authority, open orders, target orders
        assert_eq!(deriver.cached_len(), 4);
    }

    #[tokio::test]
    async fn test_buy_signed_over_trigger_blockhash() {
        let market = sample_market();
        let raw = RawAccount::new(market.id, SERUM_PROGRAM_ID, market.encode());
        let mut chain = MockChainClient::new();
        chain
            .expect_get_account()
            .returning(move |_| Ok(raw.clone()));
        chain.expect_get_latest_blockhash().never();

        let trigger = trigger_for(market.id);
        let expected = trigger.recent_blockhash;
        let mut relay = MockBundleRelay::new();
        relay
            .expect_send_bundle()
            .times(1)
            .withf(move |bundle: &Bundle| {
                bincode::deserialize::<VersionedTransaction>(&bundle.packets[1].data)
                    .map(|tx| *tx.message.recent_blockhash() == expected)
                    .unwrap_or(false)
            })
            .returning(|_| {
                Err(RelayError::Call {
                    call: "SendBundle",
                    message: "stop".to_string(),
                })
            });

        let engine = engine(chain, relay, CancellationToken::new());
        let result = engine.execute(trigger).await;
        assert!(matches!(result, Err(ExecutionError::Submit(_))));
    }

    #[tokio::test]
    async fn test_buy_failure_is_not_retried() {
        let market = sample_market();
        let chain = chain_with_market(&market, SERUM_PROGRAM_ID);
        let mut relay = MockBundleRelay::new();
        relay.expect_send_bundle().times(1).returning(|_| {
            Err(RelayError::Call {
                call: "SendBundle",
                message: "rejected".to_string(),
            })
        });
        let engine = engine(chain, relay, CancellationToken::new());
        let result = engine.execute(trigger_for(market.id)).await;
        assert!(matches!(result, Err(ExecutionError::Submit(_))));
    }

    #[tokio::test]
    async fn test_gives_up_at_zero_balance() {
        let market = sample_market();
        let mut chain = chain_with_market(&market, SERUM_PROGRAM_ID);
        chain.expect_get_token_balance().times(3).returning(|_| Ok(0));
        chain.expect_send_transaction().never();
        let mut relay = MockBundleRelay::new();
        relay
            .expect_send_bundle()
            .returning(|_| Ok("bundle".to_string()));

        let engine = engine(chain, relay, CancellationToken::new());
        let outcome = engine.execute(trigger_for(market.id)).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::GivenUp { polls: 3 });
    }

    #[tokio::test]
    async fn test_sell_retries_until_accepted() {
        let market = sample_market();
        let mut chain = chain_with_market(&market, SERUM_PROGRAM_ID);
        let polls = AtomicU32::new(0);
        chain.expect_get_token_balance().returning(move |_| {
            if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(0)
            } else {
                Ok(42_000)
            }
        });
        let sends = AtomicU32::new(0);
        chain.expect_send_transaction().returning(move |_| {
            if sends.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ChainError::Rpc("blockhash not found".to_string()))
            } else {
                Ok(Signature::default())
            }
        });
        let mut relay = MockBundleRelay::new();
        relay
            .expect_send_bundle()
            .withf(|bundle: &Bundle| bundle.packets.len() == 2 && bundle.packets[0].data == vec![7; 64])
            .returning(|_| Ok("bundle".to_string()));

        let engine = engine(chain, relay, CancellationToken::new());
        let outcome = engine.execute(trigger_for(market.id)).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Sold {
                signature: Signature::default(),
                amount: 42_000,
                attempts: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_abandons_sell_loop() {
        let market = sample_market();
        let mut chain = chain_with_market(&market, SERUM_PROGRAM_ID);
        chain.expect_get_token_balance().returning(|_| Ok(1));
        let cancel = CancellationToken::new();
        let on_send = cancel.clone();
        chain.expect_send_transaction().returning(move |_| {
            on_send.cancel();
            Err(ChainError::Rpc("dropped".to_string()))
        });
        let mut relay = MockBundleRelay::new();
        relay
            .expect_send_bundle()
            .returning(|_| Ok("bundle".to_string()));

        let engine = engine(chain, relay, cancel);
        let outcome = engine.execute(trigger_for(market.id)).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Abandoned {
                during: ExecutionState::SellPolling
            }
        );
        assert_eq!(outcome.state(), ExecutionState::Abandoned);
    }

    #[tokio::test]
    async fn test_spawned_failure_stays_isolated() {
        let market = sample_market();
        let mut chain = MockChainClient::new();
        let good = RawAccount::new(market.id, SERUM_PROGRAM_ID, market.encode());
        chain.expect_get_account().returning(move |address| {
            if *address == good.address {
                Ok(good.clone())
            } else {
                Err(ChainError::AccountNotFound(*address))
            }
        });
        chain
            .expect_get_latest_blockhash()
            .returning(|| Ok(Hash::new_unique()));
        chain.expect_get_token_balance().returning(|_| Ok(0));
        let mut relay = MockBundleRelay::new();
        relay
            .expect_send_bundle()
            .times(1)
            .returning(|_| Ok("bundle".to_string()));

        let engine = engine(chain, relay, CancellationToken::new());
        let bad = engine.spawn(trigger_for(Pubkey::new_unique()));
        let ok = engine.spawn(trigger_for(market.id));

        assert_eq!(bad.await.unwrap(), None);
        assert_eq!(ok.await.unwrap(), Some(ExecutionOutcome::GivenUp { polls: 3 }));
    }
}
