// Account Codec
//
// Stateless decoders turning raw account buffers into typed records. Every
// fixed-offset shape is described by a static table of `Field`s; the minimum
// buffer length of a shape is derived from that table at compile time, so a
// short buffer is rejected before any field is read.
//
// Shape selection happens by 8-byte discriminator prefix where the owning
// program writes one, by magic number (Pyth), or by owning program (Raydium
// AMM v4 and Serum/OpenBook markets carry no discriminator).

pub mod marginfi;
pub mod marketplace;
pub mod pyth;
pub mod raydium;
pub mod reader;
pub mod serum;

use solana_sdk::{hash::hash, pubkey::Pubkey};
use thiserror::Error;

pub use reader::{field_ranges, AccountReader, AccountWriter, Untouched};

use crate::chain::constants::{OPENBOOK_PROGRAM_ID, RAYDIUM_AMM_PROGRAM_ID, SERUM_PROGRAM_ID};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{shape}: buffer too short, need {needed} bytes, got {actual}")]
    TooShort {
        shape: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("{shape}: unexpected discriminator {found:02x?}")]
    Discriminator { shape: &'static str, found: Vec<u8> },
    #[error("{shape}: invalid option tag {tag} at offset {offset}")]
    InvalidTag {
        shape: &'static str,
        offset: usize,
        tag: u8,
    },
    #[error("{shape}: {reason}")]
    Invalid { shape: &'static str, reason: String },
    #[error("no known account shape for owner {owner}")]
    UnknownShape { owner: Pubkey },
}

/// Immutable snapshot of an on-chain account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccount {
    pub address: Pubkey,
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

impl RawAccount {
    pub fn new(address: Pubkey, owner: Pubkey, data: Vec<u8>) -> Self {
        Self { address, owner, data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    Bool,
    U32,
    I32,
    U64,
    I64,
    Pubkey,
    Fixed,
    Bytes(usize),
    /// reserved space, carried through re-encoding but never interpreted
    Padding(usize),
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::Bool => 1,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::U64 | FieldKind::I64 => 8,
            FieldKind::Pubkey => 32,
            FieldKind::Fixed => 16,
            FieldKind::Bytes(n) | FieldKind::Padding(n) => n,
        }
    }
}

/// One (offset, width, semantic type) entry of a shape table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self { name, offset, kind }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.kind.width()
    }
}

/// Smallest buffer that holds every field of a table.
pub const fn layout_len(fields: &[Field]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < fields.len() {
        let end = fields[i].end();
        if end > max {
            max = end;
        }
        i += 1;
    }
    max
}

/// Anchor account discriminator: `sha256("account:<Name>")[..8]`.
pub fn anchor_discriminator(account_name: &str) -> [u8; 8] {
    let digest = hash(format!("account:{account_name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest.to_bytes()[..8]);
    out
}

pub(crate) fn check_discriminator(
    data: &[u8],
    expected: &[u8; 8],
    shape: &'static str,
) -> Result<(), DecodeError> {
    let found = data.get(..8).ok_or(DecodeError::TooShort {
        shape,
        needed: 8,
        actual: data.len(),
    })?;
    if found != expected {
        return Err(DecodeError::Discriminator {
            shape,
            found: found.to_vec(),
        });
    }
    Ok(())
}

/// Any record the codec knows how to decode.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedAccount {
    AmmPool(raydium::AmmPool),
    Market(serum::MarketRecord),
    Bank(Box<marginfi::Bank>),
    MarginAccount(Box<marginfi::MarginAccount>),
    Price(pyth::PriceAccount),
    M2Listing(marketplace::M2SellerTradeState),
    M3Listing(marketplace::M3SellerTradeState),
    Whitelist(marketplace::Whitelist),
    Bid(marketplace::BidState),
}

/// Select a shape for `account` and decode it.
pub fn decode_account(account: &RawAccount) -> Result<DecodedAccount, DecodeError> {
    let data = account.data.as_slice();

    if let Some(prefix) = data.get(..8) {
        if prefix == marginfi::bank_discriminator() {
            return marginfi::Bank::decode(data).map(|b| DecodedAccount::Bank(Box::new(b)));
        }
        if prefix == marginfi::margin_account_discriminator() {
            return marginfi::MarginAccount::decode(data)
                .map(|a| DecodedAccount::MarginAccount(Box::new(a)));
        }
        if prefix == marketplace::M2_SELLER_TRADE_STATE_DISCRIMINATOR {
            return marketplace::M2SellerTradeState::decode(data).map(DecodedAccount::M2Listing);
        }
        if prefix == marketplace::M3_SELLER_TRADE_STATE_DISCRIMINATOR {
            return marketplace::M3SellerTradeState::decode(data).map(DecodedAccount::M3Listing);
        }
        if prefix == marketplace::WHITELIST_DISCRIMINATOR {
            return marketplace::Whitelist::decode(account.address, data)
                .map(DecodedAccount::Whitelist);
        }
        if prefix == marketplace::BID_STATE_DISCRIMINATOR {
            return marketplace::BidState::decode(data).map(DecodedAccount::Bid);
        }
        if pyth::has_magic(data) {
            return pyth::PriceAccount::decode(data).map(DecodedAccount::Price);
        }
    }

    if account.owner == RAYDIUM_AMM_PROGRAM_ID {
        return raydium::AmmPool::decode(data).map(DecodedAccount::AmmPool);
    }
    if account.owner == SERUM_PROGRAM_ID || account.owner == OPENBOOK_PROGRAM_ID {
        return serum::MarketRecord::decode(data).map(DecodedAccount::Market);
    }

    Err(DecodeError::UnknownShape {
        owner: account.owner,
    })
}
