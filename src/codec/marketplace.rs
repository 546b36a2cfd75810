// NFT marketplace listing and bid layouts
//
// Magic Eden M2/M3 seller trade states are fixed-offset records; Tensor
// whitelists and bid states are Borsh-style sequential records with tagged
// optional fields, so they are walked with the reader's cursor.

use solana_sdk::pubkey::Pubkey;

use super::{
    check_discriminator, field_ranges, layout_len, AccountReader, AccountWriter, DecodeError,
    Field, FieldKind, Untouched,
};

pub const M2_SELLER_TRADE_STATE_DISCRIMINATOR: [u8; 8] =
    [0xa4, 0x0e, 0x5c, 0x64, 0x7b, 0x39, 0xea, 0xcc];
pub const M3_SELLER_TRADE_STATE_DISCRIMINATOR: [u8; 8] =
    [0x01, 0xee, 0x48, 0x89, 0x8a, 0x15, 0xfe, 0xf9];
pub const WHITELIST_DISCRIMINATOR: [u8; 8] = [0xcc, 0xb0, 0x34, 0x4f, 0x92, 0x79, 0x36, 0xf7];
pub const BID_STATE_DISCRIMINATOR: [u8; 8] = [0x9b, 0xc5, 0x05, 0x61, 0xbd, 0x3c, 0x08, 0xb7];

// ----------------------------------------------------------------------
// Magic Eden M2
// ----------------------------------------------------------------------

pub const M2_SHAPE: &str = "me_m2_seller_trade_state";

const M2_AUCTION_HOUSE: Field = Field::new("auction_house", 8, FieldKind::Pubkey);
const M2_SELLER: Field = Field::new("seller", 40, FieldKind::Pubkey);
const M2_SELLER_REFERRAL: Field = Field::new("seller_referral", 72, FieldKind::Pubkey);
const M2_BUYER_PRICE: Field = Field::new("buyer_price", 104, FieldKind::U64);
const M2_TOKEN_MINT: Field = Field::new("token_mint", 112, FieldKind::Pubkey);
const M2_TOKEN_SIZE: Field = Field::new("token_size", 144, FieldKind::U64);
const M2_EXPIRY: Field = Field::new("expiry", 152, FieldKind::I64);
const M2_PAYMENT_MINT: Field = Field::new("payment_mint", 160, FieldKind::Pubkey);

pub const M2_LAYOUT: &[Field] = &[
    M2_AUCTION_HOUSE,
    M2_SELLER,
    M2_SELLER_REFERRAL,
    M2_BUYER_PRICE,
    M2_TOKEN_MINT,
    M2_TOKEN_SIZE,
    M2_EXPIRY,
    M2_PAYMENT_MINT,
];
pub const M2_MIN_LEN: usize = layout_len(M2_LAYOUT);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M2SellerTradeState {
    pub auction_house: Pubkey,
    pub seller: Pubkey,
    pub seller_referral: Pubkey,
    pub buyer_price: u64,
    pub token_mint: Pubkey,
    pub token_size: u64,
    pub expiry: i64,
    pub payment_mint: Pubkey,
    pub untouched: Untouched,
}

impl M2SellerTradeState {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, M2_SHAPE);
        r.require(M2_MIN_LEN)?;
        check_discriminator(data, &M2_SELLER_TRADE_STATE_DISCRIMINATOR, M2_SHAPE)?;

        Ok(Self {
            auction_house: r.pubkey_at(M2_AUCTION_HOUSE)?,
            seller: r.pubkey_at(M2_SELLER)?,
            seller_referral: r.pubkey_at(M2_SELLER_REFERRAL)?,
            buyer_price: r.u64_at(M2_BUYER_PRICE)?,
            token_mint: r.pubkey_at(M2_TOKEN_MINT)?,
            token_size: r.u64_at(M2_TOKEN_SIZE)?,
            expiry: r.i64_at(M2_EXPIRY)?,
            payment_mint: r.pubkey_at(M2_PAYMENT_MINT)?,
            untouched: Untouched::capture(
                data,
                M2_MIN_LEN,
                std::iter::once(0..8).chain(field_ranges(M2_LAYOUT)),
            ),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(M2_MIN_LEN);
        w.put_raw(0, &M2_SELLER_TRADE_STATE_DISCRIMINATOR);
        w.put_at(M2_AUCTION_HOUSE, self.auction_house.as_ref());
        w.put_at(M2_SELLER, self.seller.as_ref());
        w.put_at(M2_SELLER_REFERRAL, self.seller_referral.as_ref());
        w.put_at(M2_BUYER_PRICE, &self.buyer_price.to_le_bytes());
        w.put_at(M2_TOKEN_MINT, self.token_mint.as_ref());
        w.put_at(M2_TOKEN_SIZE, &self.token_size.to_le_bytes());
        w.put_at(M2_EXPIRY, &self.expiry.to_le_bytes());
        w.put_at(M2_PAYMENT_MINT, self.payment_mint.as_ref());
        w.restore(&self.untouched);
        w.into_inner()
    }
}

// ----------------------------------------------------------------------
// Magic Eden M3 (compressed)
// ----------------------------------------------------------------------

pub const M3_SHAPE: &str = "me_m3_seller_trade_state";

const M3_SELLER: Field = Field::new("seller", 8, FieldKind::Pubkey);
const M3_SELLER_REFERRAL: Field = Field::new("seller_referral", 40, FieldKind::Pubkey);
const M3_BUYER_PRICE: Field = Field::new("buyer_price", 72, FieldKind::U64);
const M3_ASSET_ID: Field = Field::new("asset_id", 80, FieldKind::Pubkey);
const M3_PAYMENT_MINT: Field = Field::new("payment_mint", 112, FieldKind::Pubkey);
// one byte at 144 is not decoded
const M3_MERKLE_TREE: Field = Field::new("merkle_tree", 145, FieldKind::Pubkey);
const M3_INDEX: Field = Field::new("index", 177, FieldKind::U32);
const M3_CREATED_AT: Field = Field::new("created_at", 181, FieldKind::I64);
const M3_UPDATED_AT: Field = Field::new("updated_at", 189, FieldKind::I64);

pub const M3_LAYOUT: &[Field] = &[
    M3_SELLER,
    M3_SELLER_REFERRAL,
    M3_BUYER_PRICE,
    M3_ASSET_ID,
    M3_PAYMENT_MINT,
    M3_MERKLE_TREE,
    M3_INDEX,
    M3_CREATED_AT,
    M3_UPDATED_AT,
];
pub const M3_MIN_LEN: usize = layout_len(M3_LAYOUT);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3SellerTradeState {
    pub seller: Pubkey,
    pub seller_referral: Pubkey,
    pub buyer_price: u64,
    pub asset_id: Pubkey,
    pub payment_mint: Pubkey,
    pub merkle_tree: Pubkey,
    pub index: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub untouched: Untouched,
}

impl M3SellerTradeState {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, M3_SHAPE);
        r.require(M3_MIN_LEN)?;
        check_discriminator(data, &M3_SELLER_TRADE_STATE_DISCRIMINATOR, M3_SHAPE)?;

        Ok(Self {
            seller: r.pubkey_at(M3_SELLER)?,
            seller_referral: r.pubkey_at(M3_SELLER_REFERRAL)?,
            buyer_price: r.u64_at(M3_BUYER_PRICE)?,
            asset_id: r.pubkey_at(M3_ASSET_ID)?,
            payment_mint: r.pubkey_at(M3_PAYMENT_MINT)?,
            merkle_tree: r.pubkey_at(M3_MERKLE_TREE)?,
            index: r.u32_at(M3_INDEX)?,
            created_at: r.i64_at(M3_CREATED_AT)?,
            updated_at: r.i64_at(M3_UPDATED_AT)?,
            untouched: Untouched::capture(
                data,
                M3_MIN_LEN,
                std::iter::once(0..8).chain(field_ranges(M3_LAYOUT)),
            ),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(M3_MIN_LEN);
        w.put_raw(0, &M3_SELLER_TRADE_STATE_DISCRIMINATOR);
        w.put_at(M3_SELLER, self.seller.as_ref());
        w.put_at(M3_SELLER_REFERRAL, self.seller_referral.as_ref());
        w.put_at(M3_BUYER_PRICE, &self.buyer_price.to_le_bytes());
        w.put_at(M3_ASSET_ID, self.asset_id.as_ref());
        w.put_at(M3_PAYMENT_MINT, self.payment_mint.as_ref());
        w.put_at(M3_MERKLE_TREE, self.merkle_tree.as_ref());
        w.put_at(M3_INDEX, &self.index.to_le_bytes());
        w.put_at(M3_CREATED_AT, &self.created_at.to_le_bytes());
        w.put_at(M3_UPDATED_AT, &self.updated_at.to_le_bytes());
        w.restore(&self.untouched);
        w.into_inner()
    }
}

// ----------------------------------------------------------------------
// Tensor whitelist
// ----------------------------------------------------------------------

pub const WHITELIST_SHAPE: &str = "tensor_whitelist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    /// Account address; not part of the account data.
    pub address: Pubkey,
    pub version: u8,
    pub root_hash: [u8; 32],
    pub uuid: [u8; 32],
    pub name: [u8; 32],
    pub frozen: bool,
    pub voc: Option<Pubkey>,
    pub fvc: Option<Pubkey>,
    /// Padding, the deprecated flag and reserved space after `fvc`
    pub untouched: Untouched,
}

impl Whitelist {
    pub fn decode(address: Pubkey, data: &[u8]) -> Result<Self, DecodeError> {
        check_discriminator(data, &WHITELIST_DISCRIMINATOR, WHITELIST_SHAPE)?;
        let mut r = AccountReader::new(data, WHITELIST_SHAPE);
        r.skip(8)?;

        let version = r.read_u8()?;
        // padding, deprecated flag
        r.skip(2)?;
        let root_hash = r.read_bytes()?;
        let uuid = r.read_bytes()?;
        let name = r.read_bytes()?;
        let frozen = r.read_bool()?;
        let voc = r.read_option(|r| r.read_pubkey())?;
        let fvc = r.read_option(|r| r.read_pubkey())?;
        let end = r.position();
        Ok(Self {
            address,
            version,
            root_hash,
            uuid,
            name,
            frozen,
            voc,
            fvc,
            untouched: Untouched::capture(data, end, [0..9, 11..end]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::default();
        w.push(&WHITELIST_DISCRIMINATOR);
        w.push(&[self.version, 0, 0]);
        w.push(&self.root_hash);
        w.push(&self.uuid);
        w.push(&self.name);
        w.push(&[u8::from(self.frozen)]);
        w.push_option(self.voc, |w, k| w.push(k.as_ref()));
        w.push_option(self.fvc, |w, k| w.push(k.as_ref()));
        w.restore(&self.untouched);
        w.into_inner()
    }

    /// Collection name with trailing NUL padding removed.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

// ----------------------------------------------------------------------
// Tensor bid state
// ----------------------------------------------------------------------

pub const BID_STATE_SHAPE: &str = "tensor_bid_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidTarget {
    AssetId,
    Whitelist,
    Other(u8),
}

impl From<u8> for BidTarget {
    fn from(raw: u8) -> Self {
        match raw {
            0 => BidTarget::AssetId,
            1 => BidTarget::Whitelist,
            other => BidTarget::Other(other),
        }
    }
}

impl From<BidTarget> for u8 {
    fn from(target: BidTarget) -> Self {
        match target {
            BidTarget::AssetId => 0,
            BidTarget::Whitelist => 1,
            BidTarget::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidState {
    pub version: u8,
    pub owner: Pubkey,
    pub bid_id: Pubkey,
    pub target: BidTarget,
    pub target_id: Pubkey,
    pub field: Option<u8>,
    pub field_id: Option<Pubkey>,
    pub quantity: u32,
    pub filled_quantity: u32,
    pub amount: u64,
    pub currency: Option<Pubkey>,
    pub expiry: i64,
    pub private_taker: Option<Pubkey>,
    pub maker_broker: Option<Pubkey>,
    pub margin: Option<Pubkey>,
    pub updated_at: i64,
    pub cosigner: Pubkey,
    /// Padding byte and reserved space after `cosigner`
    pub untouched: Untouched,
}

impl BidState {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        check_discriminator(data, &BID_STATE_DISCRIMINATOR, BID_STATE_SHAPE)?;
        let mut r = AccountReader::new(data, BID_STATE_SHAPE);
        r.skip(8)?;

        let version = r.read_u8()?;
        r.skip(1)?;
        let mut bid = Self {
            version,
            owner: r.read_pubkey()?,
            bid_id: r.read_pubkey()?,
            target: BidTarget::from(r.read_u8()?),
            target_id: r.read_pubkey()?,
            field: r.read_option(|r| r.read_u8())?,
            field_id: r.read_option(|r| r.read_pubkey())?,
            quantity: r.read_u32()?,
            filled_quantity: r.read_u32()?,
            amount: r.read_u64()?,
            currency: r.read_option(|r| r.read_pubkey())?,
            expiry: r.read_i64()?,
            private_taker: r.read_option(|r| r.read_pubkey())?,
            maker_broker: r.read_option(|r| r.read_pubkey())?,
            margin: r.read_option(|r| r.read_pubkey())?,
            updated_at: r.read_i64()?,
            cosigner: r.read_pubkey()?,
            untouched: Untouched::default(),
        };
        let end = r.position();
        bid.untouched = Untouched::capture(data, end, [0..9, 10..end]);
        Ok(bid)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::default();
        w.push(&BID_STATE_DISCRIMINATOR);
        w.push(&[self.version, 0]);
        w.push(self.owner.as_ref());
        w.push(self.bid_id.as_ref());
        w.push(&[u8::from(self.target)]);
        w.push(self.target_id.as_ref());
        w.push_option(self.field, |w, f| w.push(&[f]));
        w.push_option(self.field_id, |w, k| w.push(k.as_ref()));
        w.push(&self.quantity.to_le_bytes());
        w.push(&self.filled_quantity.to_le_bytes());
        w.push(&self.amount.to_le_bytes());
        w.push_option(self.currency, |w, k| w.push(k.as_ref()));
        w.push(&self.expiry.to_le_bytes());
        w.push_option(self.private_taker, |w, k| w.push(k.as_ref()));
        w.push_option(self.maker_broker, |w, k| w.push(k.as_ref()));
        w.push_option(self.margin, |w, k| w.push(k.as_ref()));
        w.push(&self.updated_at.to_le_bytes());
        w.push(self.cosigner.as_ref());
        w.restore(&self.untouched);
        w.into_inner()
    }

    pub fn remaining_quantity(&self) -> u32 {
        self.quantity.saturating_sub(self.filled_quantity)
    }
}
