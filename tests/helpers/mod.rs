// Helper utilities for the offline pipeline tests
//
// This module provides:
// - Synthetic Raydium pool-creation transactions and their markets
// - An in-memory `ChainClient` and a recording `BundleRelay`
// - Engine construction with millisecond timings

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jito_pool_sniper::chain::constants::{RAYDIUM_AMM_PROGRAM_ID, SERUM_PROGRAM_ID, WSOL_MINT};
use jito_pool_sniper::chain::rpc::{ChainClient, ChainError};
use jito_pool_sniper::chain::{BundleAssembler, ExecutionConfig, ExecutionEngine, TransactionConfig};
use jito_pool_sniper::codec::raydium::{initialize2_accounts, CreatePoolInstruction};
use jito_pool_sniper::codec::serum::MarketRecord;
use jito_pool_sniper::codec::RawAccount;
use jito_pool_sniper::relay::proto::bundle::Bundle;
use jito_pool_sniper::relay::proto::packet::Packet;
use jito_pool_sniper::relay::proto::searcher::PendingTxNotification;
use jito_pool_sniper::relay::{BundleRelay, RelayError};
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Accounts of one synthetic pool and its market
pub struct PoolFixture {
    pub amm: Pubkey,
    pub coin_mint: Pubkey,
    pub coin_vault: Pubkey,
    pub pc_vault: Pubkey,
    pub market: MarketRecord,
}

impl PoolFixture {
    pub fn new() -> Self {
        let market_id = Pubkey::new_unique();
        Self {
            amm: Pubkey::new_unique(),
            coin_mint: Pubkey::new_unique(),
            coin_vault: Pubkey::new_unique(),
            pc_vault: Pubkey::new_unique(),
            market: MarketRecord {
                id: market_id,
                account_flags: 3,
                vault_signer_nonce: 0,
                base_mint: Pubkey::new_unique(),
                quote_mint: WSOL_MINT,
                base_vault: Pubkey::new_unique(),
                base_deposits_total: 0,
                base_fees_accrued: 0,
                quote_vault: Pubkey::new_unique(),
                quote_deposits_total: 0,
                quote_fees_accrued: 0,
                quote_dust_threshold: 100,
                request_queue: Pubkey::new_unique(),
                event_queue: Pubkey::new_unique(),
                bids: Pubkey::new_unique(),
                asks: Pubkey::new_unique(),
            },
        }
    }

    pub fn market_account(&self) -> RawAccount {
        RawAccount::new(self.market.id, SERUM_PROGRAM_ID, self.market.encode())
    }

    /// Serialized, signed transaction carrying an `initialize2` for this pool
    pub fn create_pool_tx(&self, creator: &Keypair, open_time: u64) -> Vec<u8> {
        let mut metas: Vec<AccountMeta> = (0..initialize2_accounts::MIN_ACCOUNTS)
            .map(|_| AccountMeta::new_readonly(Pubkey::new_unique(), false))
            .collect();
        metas[initialize2_accounts::AMM] = AccountMeta::new(self.amm, false);
        metas[initialize2_accounts::COIN_MINT] = AccountMeta::new_readonly(self.coin_mint, false);
        metas[initialize2_accounts::PC_MINT] = AccountMeta::new_readonly(WSOL_MINT, false);
        metas[initialize2_accounts::COIN_VAULT] = AccountMeta::new(self.coin_vault, false);
        metas[initialize2_accounts::PC_VAULT] = AccountMeta::new(self.pc_vault, false);
        metas[initialize2_accounts::MARKET] = AccountMeta::new_readonly(self.market.id, false);
        metas.push(AccountMeta::new(creator.pubkey(), true));

        let ix = Instruction {
            program_id: RAYDIUM_AMM_PROGRAM_ID,
            accounts: metas,
            data: CreatePoolInstruction {
                nonce: 253,
                open_time,
                init_pc_amount: 50_000_000_000,
                init_coin_amount: 1_000_000_000_000_000,
            }
            .encode(),
        };
        let message =
            Message::new_with_blockhash(&[ix], Some(&creator.pubkey()), &Hash::new_unique());
        let tx = VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[creator])
            .expect("sign create pool tx");
        bincode::serialize(&tx).expect("serialize create pool tx")
    }
}

pub fn notification(transactions: Vec<Vec<u8>>) -> PendingTxNotification {
    PendingTxNotification {
        server_side_ts: None,
        expiration_time: None,
        transactions: transactions
            .into_iter()
            .map(|data| Packet { data, meta: None })
            .collect(),
    }
}

/// In-memory chain: fixed accounts, fixed token balance, accepts every send.
pub struct FakeChain {
    accounts: HashMap<Pubkey, RawAccount>,
    token_balance: u64,
    pub sent: Mutex<Vec<VersionedTransaction>>,
}

impl FakeChain {
    pub fn new(accounts: Vec<RawAccount>, token_balance: u64) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.address, a)).collect(),
            token_balance,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_account(&self, address: &Pubkey) -> Result<RawAccount, ChainError> {
        self.accounts
            .get(address)
            .cloned()
            .ok_or(ChainError::AccountNotFound(*address))
    }

    async fn get_token_balance(&self, _token_account: &Pubkey) -> Result<u64, ChainError> {
        Ok(self.token_balance)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ChainError> {
        Ok(Hash::new_from_array([9; 32]))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, ChainError> {
        self.sent.lock().push(tx.clone());
        Ok(tx.signatures[0])
    }
}

/// Forwards every submitted bundle to a channel.
pub struct RecordingRelay {
    bundles: mpsc::UnboundedSender<Bundle>,
}

impl RecordingRelay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bundle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { bundles: tx }, rx)
    }
}

#[async_trait]
impl BundleRelay for RecordingRelay {
    async fn send_bundle(&self, bundle: Bundle) -> Result<String, RelayError> {
        self.bundles
            .send(bundle)
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        Ok("bundle-uuid".to_string())
    }
}

pub fn fast_execution_config() -> ExecutionConfig {
    ExecutionConfig {
        trade_amount_lamports: 5_000_000,
        settle_delay: Duration::from_millis(1),
        balance_poll_interval: Duration::from_millis(1),
        balance_poll_attempts: 2,
        sell_interval: Duration::from_millis(1),
        max_concurrent: 0,
    }
}

pub type TestEngine = ExecutionEngine<FakeChain, RecordingRelay>;

pub fn engine(chain: FakeChain, relay: RecordingRelay, payer: Arc<Keypair>) -> Arc<TestEngine> {
    Arc::new(ExecutionEngine::new(
        Arc::new(chain),
        Arc::new(relay),
        payer,
        BundleAssembler::new(TransactionConfig::default()),
        fast_execution_config(),
        CancellationToken::new(),
    ))
}

/// Program id of every top-level instruction, in order
pub fn program_ids(tx: &VersionedTransaction) -> Vec<Pubkey> {
    let keys = tx.message.static_account_keys();
    tx.message
        .instructions()
        .iter()
        .map(|ix| keys[ix.program_id_index as usize])
        .collect()
}

pub async fn next_bundle(rx: &mut mpsc::UnboundedReceiver<Bundle>) -> Bundle {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("bundle within 5s")
        .expect("relay channel open")
}
