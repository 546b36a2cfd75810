// Bundle Assembly for Raydium v4 Swaps
//
// Builds the engine's own swap transaction and packs it into an ordered block
// engine bundle:
// 1. externally observed transactions first, byte-for-byte as received
// 2. our signed transaction last
//
// Instruction order inside our transaction:
// compute unit price, compute unit limit, [buy] create token account,
// swap, [buy] tip transfer to one randomly chosen tip account.
// Every packet of one bundle shares the same blockhash; atomic acceptance is
// up to the block engine.

use rand::seq::SliceRandom;
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use thiserror::Error;
use tracing::{debug, info};

use super::constants::{RAYDIUM_AMM_PROGRAM_ID, TIP_ACCOUNTS, WSOL_MINT};
use crate::codec::raydium::SWAP_BASE_IN_OPCODE;
use crate::relay::proto::{
    bundle::Bundle,
    packet::{Meta, Packet},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("failed to sign transaction: {0}")]
    Signing(String),
    #[error("failed to serialize transaction: {0}")]
    Serialize(String),
}

/// Trade direction against wrapped SOL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSide {
    /// WSOL -> token, submitted through the relay with a tip
    Buy,
    /// token -> WSOL, submitted as a plain transaction
    Sell,
}

impl SwapSide {
    /// Buy transactions create the destination token account and pay a tip.
    pub fn includes_setup(self) -> bool {
        matches!(self, SwapSide::Buy)
    }

    /// (source mint, destination mint) for `mint` traded against WSOL
    pub fn mints(self, mint: Pubkey) -> (Pubkey, Pubkey) {
        match self {
            SwapSide::Buy => (WSOL_MINT, mint),
            SwapSide::Sell => (mint, WSOL_MINT),
        }
    }
}

/// Every account a Raydium v4 swap needs besides the user's own.
///
/// Built in one piece from the pool creation and its market; never partially
/// filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolKeys {
    pub id: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub market_program: Pubkey,
    pub market_id: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub market_authority: Pubkey,
}

impl PoolKeys {
    pub fn all(&self) -> [Pubkey; 14] {
        [
            self.id,
            self.authority,
            self.open_orders,
            self.target_orders,
            self.base_vault,
            self.quote_vault,
            self.market_program,
            self.market_id,
            self.market_bids,
            self.market_asks,
            self.market_event_queue,
            self.market_base_vault,
            self.market_quote_vault,
            self.market_authority,
        ]
    }
}

/// Configuration for transaction building
#[derive(Clone, Debug)]
pub struct TransactionConfig {
    /// Priority fee in micro-lamports per compute unit
    pub compute_unit_price: u64,
    pub compute_unit_limit: u32,
    pub tip_lamports: u64,
    /// Slippage floor written into the swap; 0 disables it
    pub min_amount_out: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            compute_unit_price: 131_072,
            compute_unit_limit: 65_536,
            tip_lamports: 10_000,
            min_amount_out: 0,
        }
    }
}

pub struct BundleAssembler {
    config: TransactionConfig,
}

impl BundleAssembler {
    pub fn new(config: TransactionConfig) -> Self {
        info!(
            "Initialized BundleAssembler cu_price={} cu_limit={} tip={} min_out={}",
            config.compute_unit_price,
            config.compute_unit_limit,
            config.tip_lamports,
            config.min_amount_out
        );
        Self { config }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Raydium v4 `swap_base_in` in the program's account order.
    pub fn swap_instruction(
        &self,
        wallet: &Pubkey,
        side: SwapSide,
        mint: Pubkey,
        amount_in: u64,
        keys: &PoolKeys,
    ) -> Instruction {
        let (source_mint, destination_mint) = side.mints(mint);
        let user_source = get_associated_token_address(wallet, &source_mint);
        let user_destination = get_associated_token_address(wallet, &destination_mint);

        let accounts = vec![
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new(keys.id, false),
            AccountMeta::new_readonly(keys.authority, false),
            AccountMeta::new(keys.open_orders, false),
            AccountMeta::new(keys.target_orders, false),
            AccountMeta::new(keys.base_vault, false),
            AccountMeta::new(keys.quote_vault, false),
            AccountMeta::new_readonly(keys.market_program, false),
            AccountMeta::new(keys.market_id, false),
            AccountMeta::new(keys.market_bids, false),
            AccountMeta::new(keys.market_asks, false),
            AccountMeta::new(keys.market_event_queue, false),
            AccountMeta::new(keys.market_base_vault, false),
            AccountMeta::new(keys.market_quote_vault, false),
            AccountMeta::new_readonly(keys.market_authority, false),
            AccountMeta::new(user_source, false),
            AccountMeta::new(user_destination, false),
            AccountMeta::new_readonly(*wallet, true),
        ];

        let mut data = Vec::with_capacity(17);
        data.push(SWAP_BASE_IN_OPCODE);
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&self.config.min_amount_out.to_le_bytes());

        Instruction {
            program_id: RAYDIUM_AMM_PROGRAM_ID,
            accounts,
            data,
        }
    }

    /// Ordered instruction list of our own transaction.
    pub fn swap_instructions(
        &self,
        wallet: &Pubkey,
        side: SwapSide,
        mint: Pubkey,
        amount_in: u64,
        keys: &PoolKeys,
        tip_account: &Pubkey,
    ) -> Vec<Instruction> {
        let mut instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_price(self.config.compute_unit_price),
            ComputeBudgetInstruction::set_compute_unit_limit(self.config.compute_unit_limit),
        ];

        if side.includes_setup() {
            instructions.push(create_associated_token_account_idempotent(
                wallet,
                wallet,
                &mint,
                &spl_token::id(),
            ));
        }

        instructions.push(self.swap_instruction(wallet, side, mint, amount_in, keys));

        if side.includes_setup() {
            instructions.push(system_instruction::transfer(
                wallet,
                tip_account,
                self.config.tip_lamports,
            ));
        }

        instructions
    }

    /// Sign our swap transaction against `blockhash`.
    pub fn build_swap_tx(
        &self,
        payer: &Keypair,
        side: SwapSide,
        mint: Pubkey,
        amount_in: u64,
        keys: &PoolKeys,
        blockhash: Hash,
    ) -> Result<VersionedTransaction, BundleError> {
        let tip_account = pick_tip_account();
        let instructions =
            self.swap_instructions(&payer.pubkey(), side, mint, amount_in, keys, &tip_account);
        let message = Message::new_with_blockhash(&instructions, Some(&payer.pubkey()), &blockhash);

        let tx = VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[payer])
            .map_err(|e| BundleError::Signing(e.to_string()))?;

        debug!(
            ?side,
            %mint,
            amount_in,
            instructions = instructions.len(),
            tip_account = %tip_account,
            "Built swap transaction"
        );
        Ok(tx)
    }

    /// External transactions first, verbatim, then our own.
    pub fn build_bundle(
        &self,
        payer: &Keypair,
        side: SwapSide,
        mint: Pubkey,
        amount_in: u64,
        keys: &PoolKeys,
        blockhash: Hash,
        external: &[Vec<u8>],
    ) -> Result<Bundle, BundleError> {
        let own = self.build_swap_tx(payer, side, mint, amount_in, keys, blockhash)?;
        let own_bytes =
            bincode::serialize(&own).map_err(|e| BundleError::Serialize(e.to_string()))?;

        let mut packets: Vec<Packet> = external.iter().cloned().map(packet).collect();
        packets.push(packet(own_bytes));

        info!(
            ?side,
            %mint,
            pool = %keys.id,
            packets = packets.len(),
            "Assembled bundle"
        );
        Ok(Bundle {
            header: None,
            packets,
        })
    }
}

/// Wrap raw transaction bytes in a packet with the fixed sender metadata.
pub fn packet(data: Vec<u8>) -> Packet {
    Packet {
        meta: Some(Meta {
            size: data.len() as u64,
            addr: "0.0.0.0".to_string(),
            port: 0,
            flags: None,
            sender_stake: 0,
        }),
        data,
    }
}

pub fn pick_tip_account() -> Pubkey {
    *TIP_ACCOUNTS
        .choose(&mut rand::thread_rng())
        .unwrap_or(&TIP_ACCOUNTS[0])
}
