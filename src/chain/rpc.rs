// Chain RPC seam
//
// The execution engine only needs four calls from a node: fetch an account,
// read a token balance, fetch a blockhash and send a transaction. They sit
// behind `ChainClient` so the engine can run against a mock in tests.

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_config::RpcSendTransactionConfig};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, program_pack::Pack, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::RawAccount;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("account {0} not found")]
    AccountNotFound(Pubkey),
    #[error("account {address} is not a token account: {reason}")]
    NotATokenAccount { address: Pubkey, reason: String },
    #[error("rpc error: {0}")]
    Rpc(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<RawAccount, ChainError>;

    /// Token amount held by `token_account`; 0 when the account does not exist yet.
    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64, ChainError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, ChainError>;

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, ChainError>;
}

/// Send options for the plain (non-relay) submission path
#[derive(Clone, Debug)]
pub struct SendConfig {
    pub skip_preflight: bool,
    pub max_retries: Option<usize>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            skip_preflight: true, // Skip simulation for speed
            max_retries: None,
        }
    }
}

/// `ChainClient` over a nonblocking `RpcClient`
pub struct RpcChainClient {
    rpc: Arc<RpcClient>,
    commitment: CommitmentConfig,
    send_config: SendConfig,
}

impl RpcChainClient {
    pub fn new(rpc: Arc<RpcClient>, commitment: CommitmentConfig, send_config: SendConfig) -> Self {
        info!(
            "Initialized RpcChainClient url={} commitment={:?} skip_preflight={}",
            rpc.url(),
            commitment.commitment,
            send_config.skip_preflight
        );
        Self {
            rpc,
            commitment,
            send_config,
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_account(&self, address: &Pubkey) -> Result<RawAccount, ChainError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let account = response.value.ok_or(ChainError::AccountNotFound(*address))?;
        Ok(RawAccount::new(*address, account.owner, account.data))
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64, ChainError> {
        let response = self
            .rpc
            .get_account_with_commitment(token_account, self.commitment)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let Some(account) = response.value else {
            debug!(account = %token_account, "Token account not created yet");
            return Ok(0);
        };
        let state = spl_token::state::Account::unpack(&account.data).map_err(|e| {
            ChainError::NotATokenAccount {
                address: *token_account,
                reason: e.to_string(),
            }
        })?;
        Ok(state.amount)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ChainError> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, ChainError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: self.send_config.skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            max_retries: self.send_config.max_retries,
            ..Default::default()
        };
        self.rpc
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}
