// Pyth v2 price account
//
// Tagged by a 4-byte magic number rather than a discriminator. Only the header,
// the previous-price snapshot and the aggregate price are decoded; the rest of
// the account (EMA fields, publisher components) is carried as untouched bytes.

use super::{
    field_ranges, layout_len, AccountReader, AccountWriter, DecodeError, Field, FieldKind,
    Untouched,
};
use crate::fixed::{FixedPointError, U80F48};

pub const SHAPE: &str = "pyth_price";
pub const MAGIC: u32 = 0xa1b2_c3d4;
pub const ACCOUNT_TYPE_PRICE: u32 = 3;

const MAGIC_FIELD: Field = Field::new("magic", 0, FieldKind::U32);
const VERSION: Field = Field::new("version", 4, FieldKind::U32);
const ACCOUNT_TYPE: Field = Field::new("account_type", 8, FieldKind::U32);
const SIZE: Field = Field::new("size", 12, FieldKind::U32);
const PRICE_TYPE: Field = Field::new("price_type", 16, FieldKind::U32);
const EXPONENT: Field = Field::new("exponent", 20, FieldKind::I32);
const LAST_SLOT: Field = Field::new("last_slot", 32, FieldKind::U64);
const VALID_SLOT: Field = Field::new("valid_slot", 40, FieldKind::U64);
const TIMESTAMP: Field = Field::new("timestamp", 96, FieldKind::I64);
const PREV_SLOT: Field = Field::new("prev_slot", 176, FieldKind::U64);
const PREV_PRICE: Field = Field::new("prev_price", 184, FieldKind::I64);
const PREV_CONF: Field = Field::new("prev_conf", 192, FieldKind::U64);
const PREV_TIMESTAMP: Field = Field::new("prev_timestamp", 200, FieldKind::I64);
const AGG_PRICE: Field = Field::new("agg_price", 208, FieldKind::I64);
const AGG_CONF: Field = Field::new("agg_conf", 216, FieldKind::U64);
const AGG_STATUS: Field = Field::new("agg_status", 224, FieldKind::U32);
const AGG_PUB_SLOT: Field = Field::new("agg_pub_slot", 232, FieldKind::U64);

pub const LAYOUT: &[Field] = &[
    MAGIC_FIELD,
    VERSION,
    ACCOUNT_TYPE,
    SIZE,
    PRICE_TYPE,
    EXPONENT,
    LAST_SLOT,
    VALID_SLOT,
    TIMESTAMP,
    PREV_SLOT,
    PREV_PRICE,
    PREV_CONF,
    PREV_TIMESTAMP,
    AGG_PRICE,
    AGG_CONF,
    AGG_STATUS,
    AGG_PUB_SLOT,
];

/// 240 bytes.
pub const MIN_LEN: usize = layout_len(LAYOUT);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStatus {
    /// 0 or any value this decoder does not name
    Unknown(u32),
    Trading,
    Halted,
    Auction,
    Ignored,
}

impl PriceStatus {
    fn from_u32(raw: u32) -> Self {
        match raw {
            1 => PriceStatus::Trading,
            2 => PriceStatus::Halted,
            3 => PriceStatus::Auction,
            4 => PriceStatus::Ignored,
            other => PriceStatus::Unknown(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            PriceStatus::Unknown(raw) => raw,
            PriceStatus::Trading => 1,
            PriceStatus::Halted => 2,
            PriceStatus::Auction => 3,
            PriceStatus::Ignored => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceAccount {
    pub version: u32,
    pub size: u32,
    pub price_type: u32,
    pub exponent: i32,
    pub last_slot: u64,
    pub valid_slot: u64,
    pub timestamp: i64,
    pub prev_slot: u64,
    pub prev_price: i64,
    pub prev_conf: u64,
    pub prev_timestamp: i64,
    pub price: i64,
    pub conf: u64,
    pub status: PriceStatus,
    pub pub_slot: u64,
    pub untouched: Untouched,
}

pub fn has_magic(data: &[u8]) -> bool {
    data.get(..4)
        .map(|b| b == MAGIC.to_le_bytes().as_slice())
        .unwrap_or(false)
}

impl PriceAccount {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, SHAPE);
        r.require(MIN_LEN)?;

        let magic = r.u32_at(MAGIC_FIELD)?;
        if magic != MAGIC {
            return Err(DecodeError::Invalid {
                shape: SHAPE,
                reason: format!("bad magic {magic:#x}"),
            });
        }
        let account_type = r.u32_at(ACCOUNT_TYPE)?;
        if account_type != ACCOUNT_TYPE_PRICE {
            return Err(DecodeError::Invalid {
                shape: SHAPE,
                reason: format!("account type {account_type} is not a price account"),
            });
        }

        Ok(Self {
            version: r.u32_at(VERSION)?,
            size: r.u32_at(SIZE)?,
            price_type: r.u32_at(PRICE_TYPE)?,
            exponent: r.i32_at(EXPONENT)?,
            last_slot: r.u64_at(LAST_SLOT)?,
            valid_slot: r.u64_at(VALID_SLOT)?,
            timestamp: r.i64_at(TIMESTAMP)?,
            prev_slot: r.u64_at(PREV_SLOT)?,
            prev_price: r.i64_at(PREV_PRICE)?,
            prev_conf: r.u64_at(PREV_CONF)?,
            prev_timestamp: r.i64_at(PREV_TIMESTAMP)?,
            price: r.i64_at(AGG_PRICE)?,
            conf: r.u64_at(AGG_CONF)?,
            status: PriceStatus::from_u32(r.u32_at(AGG_STATUS)?),
            pub_slot: r.u64_at(AGG_PUB_SLOT)?,
            untouched: Untouched::capture(data, MIN_LEN, field_ranges(LAYOUT)),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(MIN_LEN);
        w.put_at(MAGIC_FIELD, &MAGIC.to_le_bytes());
        w.put_at(VERSION, &self.version.to_le_bytes());
        w.put_at(ACCOUNT_TYPE, &ACCOUNT_TYPE_PRICE.to_le_bytes());
        w.put_at(SIZE, &self.size.to_le_bytes());
        w.put_at(PRICE_TYPE, &self.price_type.to_le_bytes());
        w.put_at(EXPONENT, &self.exponent.to_le_bytes());
        w.put_at(LAST_SLOT, &self.last_slot.to_le_bytes());
        w.put_at(VALID_SLOT, &self.valid_slot.to_le_bytes());
        w.put_at(TIMESTAMP, &self.timestamp.to_le_bytes());
        w.put_at(PREV_SLOT, &self.prev_slot.to_le_bytes());
        w.put_at(PREV_PRICE, &self.prev_price.to_le_bytes());
        w.put_at(PREV_CONF, &self.prev_conf.to_le_bytes());
        w.put_at(PREV_TIMESTAMP, &self.prev_timestamp.to_le_bytes());
        w.put_at(AGG_PRICE, &self.price.to_le_bytes());
        w.put_at(AGG_CONF, &self.conf.to_le_bytes());
        w.put_at(AGG_STATUS, &self.status.to_u32().to_le_bytes());
        w.put_at(AGG_PUB_SLOT, &self.pub_slot.to_le_bytes());
        w.restore(&self.untouched);
        w.into_inner()
    }

    /// Aggregate price scaled by the exponent, as fixed point.
    ///
    /// Negative prices are not representable and are reported as such.
    pub fn price_fixed(&self) -> Result<U80F48, FixedPointError> {
        let raw = u64::try_from(self.price)
            .map_err(|_| FixedPointError::NotRepresentable(self.price as f64))?;
        let value = U80F48::from_integer(raw);
        let scale = 10u64
            .checked_pow(self.exponent.unsigned_abs())
            .ok_or(FixedPointError::Overflow)?;
        if self.exponent < 0 {
            value.checked_div_int(scale)
        } else {
            value.checked_mul(U80F48::from_integer(scale))
        }
    }

    pub fn is_trading(&self) -> bool {
        self.status == PriceStatus::Trading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_price() -> PriceAccount {
        PriceAccount {
            version: 2,
            size: 3312,
            price_type: 1,
            exponent: -8,
            last_slot: 250_000_000,
            valid_slot: 250_000_001,
            timestamp: 1_700_000_000,
            prev_slot: 249_999_999,
            prev_price: 9_300_000_000,
            prev_conf: 4_000_000,
            prev_timestamp: 1_699_999_999,
            price: 9_313_074_543,
            conf: 5_012_345,
            status: PriceStatus::Trading,
            pub_slot: 250_000_000,
            untouched: Untouched::default(),
        }
    }

    #[test]
    fn test_min_len() {
        assert_eq!(MIN_LEN, 240);
    }

    #[test]
    fn test_round_trip_and_magic() {
        let price = sample_price();
        let bytes = price.encode();
        assert!(has_magic(&bytes));
        assert_eq!(PriceAccount::decode(&bytes).unwrap(), price);
    }

    #[test]
    fn test_price_fixed_applies_exponent() {
        let price = sample_price();
        let fixed = price.price_fixed().unwrap();
        assert!((fixed.to_f64() - 93.130_745_43).abs() < 1e-9);
        assert!(price.is_trading());
    }

    #[test]
    fn test_negative_price_not_representable() {
        let price = PriceAccount { price: -1, ..sample_price() };
        assert!(price.price_fixed().is_err());
    }

    #[test]
    fn test_wrong_account_type_rejected() {
        let mut bytes = sample_price().encode();
        bytes[8] = 2;
        assert!(matches!(
            PriceAccount::decode(&bytes),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn test_unnamed_status_keeps_its_value() {
        let mut bytes = sample_price().encode();
        bytes[224..228].copy_from_slice(&9u32.to_le_bytes());
        let decoded = PriceAccount::decode(&bytes).unwrap();
        assert_eq!(decoded.status, PriceStatus::Unknown(9));
        assert!(!decoded.is_trading());
        assert_eq!(decoded.encode(), bytes);
    }

    proptest! {
        #[test]
        fn prop_bytes_round_trip(mut data in proptest::collection::vec(any::<u8>(), MIN_LEN)) {
            data[..4].copy_from_slice(&MAGIC.to_le_bytes());
            data[8..12].copy_from_slice(&ACCOUNT_TYPE_PRICE.to_le_bytes());
            let decoded = PriceAccount::decode(&data).unwrap();
            prop_assert_eq!(decoded.encode(), data);
        }

        #[test]
        fn prop_short_buffer_is_rejected(len in 0usize..MIN_LEN) {
            let mut data = vec![0u8; len];
            let magic = MAGIC.to_le_bytes();
            let n = len.min(4);
            data[..n].copy_from_slice(&magic[..n]);
            let is_too_short = matches!(
                PriceAccount::decode(&data),
                Err(DecodeError::TooShort { .. })
            );
            prop_assert!(is_too_short);
        }
    }
}
