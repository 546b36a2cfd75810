// Serum / OpenBook v3 market state
//
// The market account has no discriminator: it opens with the 5-byte literal
// "serum" followed by the account flags. Only the prefix up to `asks` is needed
// to build a swap, so the trailing lot sizes and padding are not decoded.

use solana_sdk::pubkey::Pubkey;

use super::{layout_len, AccountReader, AccountWriter, DecodeError, Field, FieldKind};

pub const SHAPE: &str = "serum_market";
pub const HEAD: &[u8; 5] = b"serum";

const ACCOUNT_FLAGS: Field = Field::new("account_flags", 5, FieldKind::U64);
const OWN_ADDRESS: Field = Field::new("own_address", 13, FieldKind::Pubkey);
const VAULT_SIGNER_NONCE: Field = Field::new("vault_signer_nonce", 45, FieldKind::U64);
const BASE_MINT: Field = Field::new("base_mint", 53, FieldKind::Pubkey);
const QUOTE_MINT: Field = Field::new("quote_mint", 85, FieldKind::Pubkey);
const BASE_VAULT: Field = Field::new("base_vault", 117, FieldKind::Pubkey);
const BASE_DEPOSITS: Field = Field::new("base_deposits_total", 149, FieldKind::U64);
const BASE_FEES: Field = Field::new("base_fees_accrued", 157, FieldKind::U64);
const QUOTE_VAULT: Field = Field::new("quote_vault", 165, FieldKind::Pubkey);
const QUOTE_DEPOSITS: Field = Field::new("quote_deposits_total", 197, FieldKind::U64);
const QUOTE_FEES: Field = Field::new("quote_fees_accrued", 205, FieldKind::U64);
const QUOTE_DUST: Field = Field::new("quote_dust_threshold", 213, FieldKind::U64);
const REQUEST_QUEUE: Field = Field::new("request_queue", 221, FieldKind::Pubkey);
const EVENT_QUEUE: Field = Field::new("event_queue", 253, FieldKind::Pubkey);
const BIDS: Field = Field::new("bids", 285, FieldKind::Pubkey);
const ASKS: Field = Field::new("asks", 317, FieldKind::Pubkey);

pub const LAYOUT: &[Field] = &[
    ACCOUNT_FLAGS,
    OWN_ADDRESS,
    VAULT_SIGNER_NONCE,
    BASE_MINT,
    QUOTE_MINT,
    BASE_VAULT,
    BASE_DEPOSITS,
    BASE_FEES,
    QUOTE_VAULT,
    QUOTE_DEPOSITS,
    QUOTE_FEES,
    QUOTE_DUST,
    REQUEST_QUEUE,
    EVENT_QUEUE,
    BIDS,
    ASKS,
];

/// 349 bytes.
pub const MIN_LEN: usize = layout_len(LAYOUT);

/// Decoded order-book market associated with a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRecord {
    pub id: Pubkey,
    pub account_flags: u64,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub base_deposits_total: u64,
    pub base_fees_accrued: u64,
    pub quote_vault: Pubkey,
    pub quote_deposits_total: u64,
    pub quote_fees_accrued: u64,
    pub quote_dust_threshold: u64,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
}

impl MarketRecord {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, SHAPE);
        r.require(MIN_LEN)?;

        Ok(Self {
            id: r.pubkey_at(OWN_ADDRESS)?,
            account_flags: r.u64_at(ACCOUNT_FLAGS)?,
            vault_signer_nonce: r.u64_at(VAULT_SIGNER_NONCE)?,
            base_mint: r.pubkey_at(BASE_MINT)?,
            quote_mint: r.pubkey_at(QUOTE_MINT)?,
            base_vault: r.pubkey_at(BASE_VAULT)?,
            base_deposits_total: r.u64_at(BASE_DEPOSITS)?,
            base_fees_accrued: r.u64_at(BASE_FEES)?,
            quote_vault: r.pubkey_at(QUOTE_VAULT)?,
            quote_deposits_total: r.u64_at(QUOTE_DEPOSITS)?,
            quote_fees_accrued: r.u64_at(QUOTE_FEES)?,
            quote_dust_threshold: r.u64_at(QUOTE_DUST)?,
            request_queue: r.pubkey_at(REQUEST_QUEUE)?,
            event_queue: r.pubkey_at(EVENT_QUEUE)?,
            bids: r.pubkey_at(BIDS)?,
            asks: r.pubkey_at(ASKS)?,
        })
    }

    /// Decode and check that the account describes `expected`.
    pub fn decode_for(expected: &Pubkey, data: &[u8]) -> Result<Self, DecodeError> {
        let market = Self::decode(data)?;
        if market.id != *expected {
            return Err(DecodeError::Invalid {
                shape: SHAPE,
                reason: format!("own address {} does not match {}", market.id, expected),
            });
        }
        Ok(market)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(MIN_LEN);
        w.put_raw(0, HEAD);
        w.put_at(ACCOUNT_FLAGS, &self.account_flags.to_le_bytes());
        w.put_at(OWN_ADDRESS, self.id.as_ref());
        w.put_at(VAULT_SIGNER_NONCE, &self.vault_signer_nonce.to_le_bytes());
        w.put_at(BASE_MINT, self.base_mint.as_ref());
        w.put_at(QUOTE_MINT, self.quote_mint.as_ref());
        w.put_at(BASE_VAULT, self.base_vault.as_ref());
        w.put_at(BASE_DEPOSITS, &self.base_deposits_total.to_le_bytes());
        w.put_at(BASE_FEES, &self.base_fees_accrued.to_le_bytes());
        w.put_at(QUOTE_VAULT, self.quote_vault.as_ref());
        w.put_at(QUOTE_DEPOSITS, &self.quote_deposits_total.to_le_bytes());
        w.put_at(QUOTE_FEES, &self.quote_fees_accrued.to_le_bytes());
        w.put_at(QUOTE_DUST, &self.quote_dust_threshold.to_le_bytes());
        w.put_at(REQUEST_QUEUE, self.request_queue.as_ref());
        w.put_at(EVENT_QUEUE, self.event_queue.as_ref());
        w.put_at(BIDS, self.bids.as_ref());
        w.put_at(ASKS, self.asks.as_ref());
        w.into_inner()
    }
}
