// Raydium AMM v4 layouts
//
// - `AmmPool`: the 752-byte liquidity state account (no discriminator, selected
//   by owner program)
// - `CreatePoolInstruction`: the `initialize2` instruction payload the mempool
//   watcher keys on, plus the positions of the accounts it needs

use solana_sdk::pubkey::Pubkey;

use super::{
    field_ranges, layout_len, AccountReader, AccountWriter, DecodeError, Field, FieldKind,
    Untouched,
};

pub const SHAPE: &str = "raydium_amm_v4";

const STATUS: Field = Field::new("status", 0, FieldKind::U64);
const NONCE: Field = Field::new("nonce", 8, FieldKind::U64);
const BASE_DECIMAL: Field = Field::new("base_decimal", 32, FieldKind::U64);
const QUOTE_DECIMAL: Field = Field::new("quote_decimal", 40, FieldKind::U64);
const TRADE_FEE_NUMERATOR: Field = Field::new("trade_fee_numerator", 144, FieldKind::U64);
const TRADE_FEE_DENOMINATOR: Field = Field::new("trade_fee_denominator", 152, FieldKind::U64);
const SWAP_FEE_NUMERATOR: Field = Field::new("swap_fee_numerator", 176, FieldKind::U64);
const SWAP_FEE_DENOMINATOR: Field = Field::new("swap_fee_denominator", 184, FieldKind::U64);
const POOL_OPEN_TIME: Field = Field::new("pool_open_time", 224, FieldKind::U64);
const BASE_VAULT: Field = Field::new("base_vault", 336, FieldKind::Pubkey);
const QUOTE_VAULT: Field = Field::new("quote_vault", 368, FieldKind::Pubkey);
const BASE_MINT: Field = Field::new("base_mint", 400, FieldKind::Pubkey);
const QUOTE_MINT: Field = Field::new("quote_mint", 432, FieldKind::Pubkey);
const LP_MINT: Field = Field::new("lp_mint", 464, FieldKind::Pubkey);
const OPEN_ORDERS: Field = Field::new("open_orders", 496, FieldKind::Pubkey);
const MARKET_ID: Field = Field::new("market_id", 528, FieldKind::Pubkey);
const MARKET_PROGRAM: Field = Field::new("market_program_id", 560, FieldKind::Pubkey);
const TARGET_ORDERS: Field = Field::new("target_orders", 592, FieldKind::Pubkey);
const WITHDRAW_QUEUE: Field = Field::new("withdraw_queue", 624, FieldKind::Pubkey);
const LP_VAULT: Field = Field::new("lp_vault", 656, FieldKind::Pubkey);
const OWNER: Field = Field::new("owner", 688, FieldKind::Pubkey);
const LP_RESERVE: Field = Field::new("lp_reserve", 720, FieldKind::U64);
// three u64 of trailing padding
const PADDING: Field = Field::new("padding", 728, FieldKind::Padding(24));

pub const LAYOUT: &[Field] = &[
    STATUS,
    NONCE,
    BASE_DECIMAL,
    QUOTE_DECIMAL,
    TRADE_FEE_NUMERATOR,
    TRADE_FEE_DENOMINATOR,
    SWAP_FEE_NUMERATOR,
    SWAP_FEE_DENOMINATOR,
    POOL_OPEN_TIME,
    BASE_VAULT,
    QUOTE_VAULT,
    BASE_MINT,
    QUOTE_MINT,
    LP_MINT,
    OPEN_ORDERS,
    MARKET_ID,
    MARKET_PROGRAM,
    TARGET_ORDERS,
    WITHDRAW_QUEUE,
    LP_VAULT,
    OWNER,
    LP_RESERVE,
    PADDING,
];

/// 752 bytes.
pub const POOL_LEN: usize = layout_len(LAYOUT);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmPool {
    pub status: u64,
    pub nonce: u64,
    pub base_decimal: u64,
    pub quote_decimal: u64,
    pub trade_fee_numerator: u64,
    pub trade_fee_denominator: u64,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
    pub pool_open_time: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
    pub owner: Pubkey,
    pub lp_reserve: u64,
    /// Order-book parameters, PnL and swap totals, padding
    pub untouched: Untouched,
}

impl AmmPool {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, SHAPE);
        r.require(POOL_LEN)?;

        Ok(Self {
            status: r.u64_at(STATUS)?,
            nonce: r.u64_at(NONCE)?,
            base_decimal: r.u64_at(BASE_DECIMAL)?,
            quote_decimal: r.u64_at(QUOTE_DECIMAL)?,
            trade_fee_numerator: r.u64_at(TRADE_FEE_NUMERATOR)?,
            trade_fee_denominator: r.u64_at(TRADE_FEE_DENOMINATOR)?,
            swap_fee_numerator: r.u64_at(SWAP_FEE_NUMERATOR)?,
            swap_fee_denominator: r.u64_at(SWAP_FEE_DENOMINATOR)?,
            pool_open_time: r.u64_at(POOL_OPEN_TIME)?,
            base_vault: r.pubkey_at(BASE_VAULT)?,
            quote_vault: r.pubkey_at(QUOTE_VAULT)?,
            base_mint: r.pubkey_at(BASE_MINT)?,
            quote_mint: r.pubkey_at(QUOTE_MINT)?,
            lp_mint: r.pubkey_at(LP_MINT)?,
            open_orders: r.pubkey_at(OPEN_ORDERS)?,
            market_id: r.pubkey_at(MARKET_ID)?,
            market_program_id: r.pubkey_at(MARKET_PROGRAM)?,
            target_orders: r.pubkey_at(TARGET_ORDERS)?,
            withdraw_queue: r.pubkey_at(WITHDRAW_QUEUE)?,
            lp_vault: r.pubkey_at(LP_VAULT)?,
            owner: r.pubkey_at(OWNER)?,
            lp_reserve: r.u64_at(LP_RESERVE)?,
            untouched: Untouched::capture(data, POOL_LEN, field_ranges(LAYOUT)),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(POOL_LEN);
        w.put_at(STATUS, &self.status.to_le_bytes());
        w.put_at(NONCE, &self.nonce.to_le_bytes());
        w.put_at(BASE_DECIMAL, &self.base_decimal.to_le_bytes());
        w.put_at(QUOTE_DECIMAL, &self.quote_decimal.to_le_bytes());
        w.put_at(TRADE_FEE_NUMERATOR, &self.trade_fee_numerator.to_le_bytes());
        w.put_at(TRADE_FEE_DENOMINATOR, &self.trade_fee_denominator.to_le_bytes());
        w.put_at(SWAP_FEE_NUMERATOR, &self.swap_fee_numerator.to_le_bytes());
        w.put_at(SWAP_FEE_DENOMINATOR, &self.swap_fee_denominator.to_le_bytes());
        w.put_at(POOL_OPEN_TIME, &self.pool_open_time.to_le_bytes());
        w.put_at(BASE_VAULT, self.base_vault.as_ref());
        w.put_at(QUOTE_VAULT, self.quote_vault.as_ref());
        w.put_at(BASE_MINT, self.base_mint.as_ref());
        w.put_at(QUOTE_MINT, self.quote_mint.as_ref());
        w.put_at(LP_MINT, self.lp_mint.as_ref());
        w.put_at(OPEN_ORDERS, self.open_orders.as_ref());
        w.put_at(MARKET_ID, self.market_id.as_ref());
        w.put_at(MARKET_PROGRAM, self.market_program_id.as_ref());
        w.put_at(TARGET_ORDERS, self.target_orders.as_ref());
        w.put_at(WITHDRAW_QUEUE, self.withdraw_queue.as_ref());
        w.put_at(LP_VAULT, self.lp_vault.as_ref());
        w.put_at(OWNER, self.owner.as_ref());
        w.put_at(LP_RESERVE, &self.lp_reserve.to_le_bytes());
        w.restore(&self.untouched);
        w.into_inner()
    }

    /// Whether the pool has reached its scheduled open time.
    pub fn is_open_at(&self, now_unix: u64) -> bool {
        self.pool_open_time <= now_unix
    }
}

// ----------------------------------------------------------------------
// initialize2
// ----------------------------------------------------------------------

pub const INITIALIZE2_OPCODE: u8 = 1;
pub const SWAP_BASE_IN_OPCODE: u8 = 9;

pub const INITIALIZE2_SHAPE: &str = "raydium_initialize2";
/// opcode + nonce + open_time + init_pc_amount + init_coin_amount
pub const INITIALIZE2_DATA_LEN: usize = 1 + 1 + 8 + 8 + 8;

/// Account positions inside an `initialize2` instruction.
pub mod initialize2_accounts {
    pub const AMM: usize = 4;
    pub const COIN_MINT: usize = 8;
    pub const PC_MINT: usize = 9;
    pub const COIN_VAULT: usize = 10;
    pub const PC_VAULT: usize = 11;
    pub const MARKET: usize = 16;

    /// Shortest account list that contains every position above.
    pub const MIN_ACCOUNTS: usize = MARKET + 1;
}

/// Payload of a pool-creation instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatePoolInstruction {
    pub nonce: u8,
    pub open_time: u64,
    pub init_pc_amount: u64,
    pub init_coin_amount: u64,
}

impl CreatePoolInstruction {
    /// `Ok(None)` when the instruction is some other AMM opcode.
    pub fn decode(data: &[u8]) -> Result<Option<Self>, DecodeError> {
        let mut r = AccountReader::new(data, INITIALIZE2_SHAPE);
        match data.first() {
            Some(&INITIALIZE2_OPCODE) => {}
            _ => return Ok(None),
        }
        r.require(INITIALIZE2_DATA_LEN)?;
        r.skip(1)?;

        Ok(Some(Self {
            nonce: r.read_u8()?,
            open_time: r.read_u64()?,
            init_pc_amount: r.read_u64()?,
            init_coin_amount: r.read_u64()?,
        }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::default();
        w.push(&[INITIALIZE2_OPCODE, self.nonce]);
        w.push(&self.open_time.to_le_bytes());
        w.push(&self.init_pc_amount.to_le_bytes());
        w.push(&self.init_coin_amount.to_le_bytes());
        w.into_inner()
    }

    /// A pool whose open time lies in the future is not tradable yet.
    pub fn is_open_at(&self, now_unix: u64) -> bool {
        self.open_time <= now_unix
    }
}

/// The side of a new pool that is not wrapped SOL.
pub fn traded_mint(coin_mint: Pubkey, pc_mint: Pubkey, wsol: &Pubkey) -> Pubkey {
    if coin_mint == *wsol {
        pc_mint
    } else {
        coin_mint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::constants::WSOL_MINT;
    use proptest::prelude::*;

    fn sample_pool() -> AmmPool {
        AmmPool {
            status: 6,
            nonce: 254,
            base_decimal: 9,
            quote_decimal: 9,
            trade_fee_numerator: 25,
            trade_fee_denominator: 10_000,
            swap_fee_numerator: 25,
            swap_fee_denominator: 10_000,
            pool_open_time: 1_700_000_000,
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            quote_mint: WSOL_MINT,
            lp_mint: Pubkey::new_unique(),
            open_orders: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            market_program_id: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            withdraw_queue: Pubkey::new_unique(),
            lp_vault: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            lp_reserve: 42,
            untouched: Untouched::default(),
        }
    }

    #[test]
    fn test_pool_len() {
        assert_eq!(POOL_LEN, 752);
    }

    #[test]
    fn test_pool_round_trip() {
        let pool = sample_pool();
        let bytes = pool.encode();
        assert_eq!(bytes.len(), POOL_LEN);
        assert_eq!(&bytes[528..560], pool.market_id.as_ref());
        assert_eq!(AmmPool::decode(&bytes).unwrap(), pool);
    }

    #[test]
    fn test_pool_keeps_undecoded_regions() {
        let data: Vec<u8> = (0..POOL_LEN).map(|i| (i * 31 + 7) as u8).collect();
        let pool = AmmPool::decode(&data).unwrap();
        let encoded = pool.encode();
        assert_eq!(&encoded[16..32], &data[16..32]);
        assert_eq!(&encoded[728..], &data[728..]);
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_pool_open_time_guard() {
        let pool = sample_pool();
        assert!(pool.is_open_at(1_700_000_000));
        assert!(!pool.is_open_at(1_699_999_999));
    }

    #[test]
    fn test_initialize2_decode() {
        let ix = CreatePoolInstruction {
            nonce: 254,
            open_time: 1_700_000_123,
            init_pc_amount: 5_000_000_000,
            init_coin_amount: 1_000_000_000_000,
        };
        let data = ix.encode();
        assert_eq!(data.len(), INITIALIZE2_DATA_LEN);
        assert_eq!(CreatePoolInstruction::decode(&data).unwrap(), Some(ix));
    }

    #[test]
    fn test_other_opcode_is_not_a_trigger() {
        let mut data = vec![SWAP_BASE_IN_OPCODE];
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(CreatePoolInstruction::decode(&data).unwrap(), None);
        assert_eq!(CreatePoolInstruction::decode(&[]).unwrap(), None);
    }

    #[test]
    fn test_truncated_initialize2_is_error() {
        let data = [INITIALIZE2_OPCODE, 1, 2, 3];
        assert!(matches!(
            CreatePoolInstruction::decode(&data),
            Err(DecodeError::TooShort { needed: 26, actual: 4, .. })
        ));
    }

    #[test]
    fn test_traded_mint_skips_wsol() {
        let token = Pubkey::new_unique();
        assert_eq!(traded_mint(token, WSOL_MINT, &WSOL_MINT), token);
        assert_eq!(traded_mint(WSOL_MINT, token, &WSOL_MINT), token);
    }

    proptest! {
        #[test]
        fn prop_short_pool_is_rejected(len in 0usize..POOL_LEN) {
            prop_assert!(AmmPool::decode(&vec![1u8; len]).is_err());
        }

        #[test]
        fn prop_pool_bytes_round_trip(data in proptest::collection::vec(any::<u8>(), POOL_LEN)) {
            let decoded = AmmPool::decode(&data).unwrap();
            prop_assert_eq!(decoded.encode(), data);
        }

        #[test]
        fn prop_initialize2_round_trip(nonce in any::<u8>(), open in any::<u64>(), pc in any::<u64>(), coin in any::<u64>()) {
            let ix = CreatePoolInstruction { nonce, open_time: open, init_pc_amount: pc, init_coin_amount: coin };
            prop_assert_eq!(CreatePoolInstruction::decode(&ix.encode()).unwrap(), Some(ix));
        }
    }
}
