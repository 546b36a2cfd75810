// marginfi v2 lending layouts
//
// `Bank` and `MarginfiAccount` are Anchor accounts; every offset below is
// absolute, i.e. includes the 8-byte discriminator. Share values, weights and
// fee totals are U80F48.

use solana_sdk::pubkey::Pubkey;

use std::ops::Range;

use super::{
    anchor_discriminator, check_discriminator, field_ranges, layout_len, AccountReader,
    AccountWriter, DecodeError, Field, FieldKind, Untouched,
};
use crate::fixed::{FixedPointError, U80F48};

pub const BANK_SHAPE: &str = "marginfi_bank";
pub const ACCOUNT_SHAPE: &str = "marginfi_account";

pub fn bank_discriminator() -> [u8; 8] {
    anchor_discriminator("Bank")
}

pub fn margin_account_discriminator() -> [u8; 8] {
    anchor_discriminator("MarginfiAccount")
}

const MINT: Field = Field::new("mint", 8, FieldKind::Pubkey);
const MINT_DECIMALS: Field = Field::new("mint_decimals", 40, FieldKind::U8);
const GROUP: Field = Field::new("group", 41, FieldKind::Pubkey);
const ASSET_SHARE_VALUE: Field = Field::new("asset_share_value", 80, FieldKind::Fixed);
const LIABILITY_SHARE_VALUE: Field = Field::new("liability_share_value", 96, FieldKind::Fixed);
const LIQUIDITY_VAULT: Field = Field::new("liquidity_vault", 112, FieldKind::Pubkey);
const INSURANCE_VAULT: Field = Field::new("insurance_vault", 146, FieldKind::Pubkey);
const COLLECTED_INSURANCE_FEES: Field =
    Field::new("collected_insurance_fees_outstanding", 184, FieldKind::Fixed);
const FEE_VAULT: Field = Field::new("fee_vault", 200, FieldKind::Pubkey);
const COLLECTED_GROUP_FEES: Field =
    Field::new("collected_group_fees_outstanding", 240, FieldKind::Fixed);
const TOTAL_LIABILITY_SHARES: Field = Field::new("total_liability_shares", 256, FieldKind::Fixed);
const TOTAL_ASSET_SHARES: Field = Field::new("total_asset_shares", 272, FieldKind::Fixed);
const LAST_UPDATE: Field = Field::new("last_update", 288, FieldKind::I64);
const ASSET_WEIGHT_INIT: Field = Field::new("asset_weight_init", 296, FieldKind::Fixed);
const ASSET_WEIGHT_MAINT: Field = Field::new("asset_weight_maint", 312, FieldKind::Fixed);
const LIABILITY_WEIGHT_INIT: Field = Field::new("liability_weight_init", 328, FieldKind::Fixed);
const LIABILITY_WEIGHT_MAINT: Field = Field::new("liability_weight_maint", 344, FieldKind::Fixed);
const DEPOSIT_LIMIT: Field = Field::new("deposit_limit", 360, FieldKind::U64);
const OPERATIONAL_STATE: Field = Field::new("operational_state", 608, FieldKind::U8);
const ORACLE_SETUP: Field = Field::new("oracle_setup", 609, FieldKind::U8);
const ORACLE_KEYS: Field = Field::new("oracle_keys", 610, FieldKind::Bytes(ORACLE_KEY_COUNT * 32));
const BORROW_LIMIT: Field = Field::new("borrow_limit", 776, FieldKind::U64);

pub const ORACLE_KEY_COUNT: usize = 5;

pub const BANK_LAYOUT: &[Field] = &[
    MINT,
    MINT_DECIMALS,
    GROUP,
    ASSET_SHARE_VALUE,
    LIABILITY_SHARE_VALUE,
    LIQUIDITY_VAULT,
    INSURANCE_VAULT,
    COLLECTED_INSURANCE_FEES,
    FEE_VAULT,
    COLLECTED_GROUP_FEES,
    TOTAL_LIABILITY_SHARES,
    TOTAL_ASSET_SHARES,
    LAST_UPDATE,
    ASSET_WEIGHT_INIT,
    ASSET_WEIGHT_MAINT,
    LIABILITY_WEIGHT_INIT,
    LIABILITY_WEIGHT_MAINT,
    DEPOSIT_LIMIT,
    OPERATIONAL_STATE,
    ORACLE_SETUP,
    ORACLE_KEYS,
    BORROW_LIMIT,
];

/// 784 bytes including the discriminator.
pub const BANK_MIN_LEN: usize = layout_len(BANK_LAYOUT);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub mint: Pubkey,
    pub mint_decimals: u8,
    pub group: Pubkey,
    pub asset_share_value: U80F48,
    pub liability_share_value: U80F48,
    pub liquidity_vault: Pubkey,
    pub insurance_vault: Pubkey,
    pub collected_insurance_fees_outstanding: U80F48,
    pub fee_vault: Pubkey,
    pub collected_group_fees_outstanding: U80F48,
    pub total_liability_shares: U80F48,
    pub total_asset_shares: U80F48,
    pub last_update: i64,
    pub asset_weight_init: U80F48,
    pub asset_weight_maint: U80F48,
    pub liability_weight_init: U80F48,
    pub liability_weight_maint: U80F48,
    pub deposit_limit: u64,
    pub operational_state: u8,
    pub oracle_setup: u8,
    pub oracle_keys: [Pubkey; ORACLE_KEY_COUNT],
    pub borrow_limit: u64,
    /// Vault bumps, interest rate config, padding
    pub untouched: Untouched,
}

impl Bank {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, BANK_SHAPE);
        r.require(BANK_MIN_LEN)?;
        check_discriminator(data, &bank_discriminator(), BANK_SHAPE)?;

        let keys = r.element(ORACLE_KEYS.offset, ORACLE_KEYS.kind.width())?;
        let mut oracle_keys = [Pubkey::default(); ORACLE_KEY_COUNT];
        for (i, key) in oracle_keys.iter_mut().enumerate() {
            *key = keys.pubkey_at(Field::new("oracle_key", i * 32, FieldKind::Pubkey))?;
        }

        Ok(Self {
            mint: r.pubkey_at(MINT)?,
            mint_decimals: r.u8_at(MINT_DECIMALS)?,
            group: r.pubkey_at(GROUP)?,
            asset_share_value: r.fixed_at(ASSET_SHARE_VALUE)?,
            liability_share_value: r.fixed_at(LIABILITY_SHARE_VALUE)?,
            liquidity_vault: r.pubkey_at(LIQUIDITY_VAULT)?,
            insurance_vault: r.pubkey_at(INSURANCE_VAULT)?,
            collected_insurance_fees_outstanding: r.fixed_at(COLLECTED_INSURANCE_FEES)?,
            fee_vault: r.pubkey_at(FEE_VAULT)?,
            collected_group_fees_outstanding: r.fixed_at(COLLECTED_GROUP_FEES)?,
            total_liability_shares: r.fixed_at(TOTAL_LIABILITY_SHARES)?,
            total_asset_shares: r.fixed_at(TOTAL_ASSET_SHARES)?,
            last_update: r.i64_at(LAST_UPDATE)?,
            asset_weight_init: r.fixed_at(ASSET_WEIGHT_INIT)?,
            asset_weight_maint: r.fixed_at(ASSET_WEIGHT_MAINT)?,
            liability_weight_init: r.fixed_at(LIABILITY_WEIGHT_INIT)?,
            liability_weight_maint: r.fixed_at(LIABILITY_WEIGHT_MAINT)?,
            deposit_limit: r.u64_at(DEPOSIT_LIMIT)?,
            operational_state: r.u8_at(OPERATIONAL_STATE)?,
            oracle_setup: r.u8_at(ORACLE_SETUP)?,
            oracle_keys,
            borrow_limit: r.u64_at(BORROW_LIMIT)?,
            untouched: Untouched::capture(
                data,
                BANK_MIN_LEN,
                std::iter::once(0..8).chain(field_ranges(BANK_LAYOUT)),
            ),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(BANK_MIN_LEN);
        w.put_raw(0, &bank_discriminator());
        w.put_at(MINT, self.mint.as_ref());
        w.put_at(MINT_DECIMALS, &[self.mint_decimals]);
        w.put_at(GROUP, self.group.as_ref());
        w.put_at(ASSET_SHARE_VALUE, &self.asset_share_value.to_le_bytes());
        w.put_at(LIABILITY_SHARE_VALUE, &self.liability_share_value.to_le_bytes());
        w.put_at(LIQUIDITY_VAULT, self.liquidity_vault.as_ref());
        w.put_at(INSURANCE_VAULT, self.insurance_vault.as_ref());
        w.put_at(
            COLLECTED_INSURANCE_FEES,
            &self.collected_insurance_fees_outstanding.to_le_bytes(),
        );
        w.put_at(FEE_VAULT, self.fee_vault.as_ref());
        w.put_at(
            COLLECTED_GROUP_FEES,
            &self.collected_group_fees_outstanding.to_le_bytes(),
        );
        w.put_at(TOTAL_LIABILITY_SHARES, &self.total_liability_shares.to_le_bytes());
        w.put_at(TOTAL_ASSET_SHARES, &self.total_asset_shares.to_le_bytes());
        w.put_at(LAST_UPDATE, &self.last_update.to_le_bytes());
        w.put_at(ASSET_WEIGHT_INIT, &self.asset_weight_init.to_le_bytes());
        w.put_at(ASSET_WEIGHT_MAINT, &self.asset_weight_maint.to_le_bytes());
        w.put_at(LIABILITY_WEIGHT_INIT, &self.liability_weight_init.to_le_bytes());
        w.put_at(LIABILITY_WEIGHT_MAINT, &self.liability_weight_maint.to_le_bytes());
        w.put_at(DEPOSIT_LIMIT, &self.deposit_limit.to_le_bytes());
        w.put_at(OPERATIONAL_STATE, &[self.operational_state]);
        w.put_at(ORACLE_SETUP, &[self.oracle_setup]);
        for (i, key) in self.oracle_keys.iter().enumerate() {
            w.put_raw(ORACLE_KEYS.offset + i * 32, key.as_ref());
        }
        w.put_at(BORROW_LIMIT, &self.borrow_limit.to_le_bytes());
        w.restore(&self.untouched);
        w.into_inner()
    }

    /// Token quantity backing `shares` of deposits.
    pub fn asset_quantity(&self, shares: U80F48) -> Result<U80F48, FixedPointError> {
        shares.checked_mul(self.asset_share_value)
    }

    /// Token quantity owed for `shares` of borrows.
    pub fn liability_quantity(&self, shares: U80F48) -> Result<U80F48, FixedPointError> {
        shares.checked_mul(self.liability_share_value)
    }

    pub fn asset_weight(&self, requirement: Requirement) -> U80F48 {
        match requirement {
            Requirement::Initial => self.asset_weight_init,
            Requirement::Maintenance => self.asset_weight_maint,
        }
    }

    pub fn liability_weight(&self, requirement: Requirement) -> U80F48 {
        match requirement {
            Requirement::Initial => self.liability_weight_init,
            Requirement::Maintenance => self.liability_weight_maint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Initial,
    Maintenance,
}

/// `quantity * price [* weight] / 10^decimals`, evaluated left to right.
pub fn usd_value(
    quantity: U80F48,
    price: U80F48,
    weight: Option<U80F48>,
    decimals: u8,
) -> Result<U80F48, FixedPointError> {
    let mut value = quantity.checked_mul(price)?;
    if let Some(weight) = weight {
        value = value.checked_mul(weight)?;
    }
    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .ok_or(FixedPointError::Overflow)?;
    value.checked_div_int(scale)
}

// ----------------------------------------------------------------------
// MarginfiAccount
// ----------------------------------------------------------------------

pub const MAX_BALANCES: usize = 16;
pub const BALANCE_LEN: usize = 104;
const BALANCES_OFFSET: usize = 72;

const ACCOUNT_GROUP: Field = Field::new("group", 8, FieldKind::Pubkey);
const ACCOUNT_AUTHORITY: Field = Field::new("authority", 40, FieldKind::Pubkey);
const BALANCES: Field = Field::new(
    "balances",
    BALANCES_OFFSET,
    FieldKind::Bytes(MAX_BALANCES * BALANCE_LEN),
);

pub const ACCOUNT_LAYOUT: &[Field] = &[ACCOUNT_GROUP, ACCOUNT_AUTHORITY, BALANCES];
pub const ACCOUNT_MIN_LEN: usize = layout_len(ACCOUNT_LAYOUT);

// offsets inside one balance slot
const BAL_ACTIVE: Field = Field::new("active", 0, FieldKind::Bool);
const BAL_BANK: Field = Field::new("bank_pk", 1, FieldKind::Pubkey);
const BAL_ASSET_SHARES: Field = Field::new("asset_shares", 40, FieldKind::Fixed);
const BAL_LIABILITY_SHARES: Field = Field::new("liability_shares", 56, FieldKind::Fixed);
const BAL_EMISSIONS: Field = Field::new("emissions_outstanding", 72, FieldKind::Fixed);
const BAL_LAST_UPDATE: Field = Field::new("last_update", 88, FieldKind::U64);

const BALANCE_FIELDS: &[Field] = &[
    BAL_ACTIVE,
    BAL_BANK,
    BAL_ASSET_SHARES,
    BAL_LIABILITY_SHARES,
    BAL_EMISSIONS,
    BAL_LAST_UPDATE,
];

/// Ranges of a `MarginfiAccount` the record decodes.
fn account_ranges() -> impl Iterator<Item = Range<usize>> {
    let slots = (0..MAX_BALANCES).flat_map(|i| {
        let base = BALANCES_OFFSET + i * BALANCE_LEN;
        field_ranges(BALANCE_FIELDS).map(move |r| base + r.start..base + r.end)
    });
    std::iter::once(0..8)
        .chain(field_ranges(&[ACCOUNT_GROUP, ACCOUNT_AUTHORITY]).collect::<Vec<_>>())
        .chain(slots)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub active: bool,
    pub bank: Pubkey,
    pub asset_shares: U80F48,
    pub liability_shares: U80F48,
    pub emissions_outstanding: U80F48,
    pub last_update: u64,
}

impl Balance {
    fn decode(r: &AccountReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            active: r.bool_at(BAL_ACTIVE)?,
            bank: r.pubkey_at(BAL_BANK)?,
            asset_shares: r.fixed_at(BAL_ASSET_SHARES)?,
            liability_shares: r.fixed_at(BAL_LIABILITY_SHARES)?,
            emissions_outstanding: r.fixed_at(BAL_EMISSIONS)?,
            last_update: r.u64_at(BAL_LAST_UPDATE)?,
        })
    }

    fn encode_into(&self, w: &mut AccountWriter, base: usize) {
        w.put_raw(base + BAL_ACTIVE.offset, &[u8::from(self.active)]);
        w.put_raw(base + BAL_BANK.offset, self.bank.as_ref());
        w.put_raw(base + BAL_ASSET_SHARES.offset, &self.asset_shares.to_le_bytes());
        w.put_raw(
            base + BAL_LIABILITY_SHARES.offset,
            &self.liability_shares.to_le_bytes(),
        );
        w.put_raw(
            base + BAL_EMISSIONS.offset,
            &self.emissions_outstanding.to_le_bytes(),
        );
        w.put_raw(base + BAL_LAST_UPDATE.offset, &self.last_update.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginAccount {
    pub group: Pubkey,
    pub authority: Pubkey,
    pub balances: [Balance; MAX_BALANCES],
    /// Slot padding and the account's trailing reserved space
    pub untouched: Untouched,
}

impl MarginAccount {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let r = AccountReader::new(data, ACCOUNT_SHAPE);
        r.require(ACCOUNT_MIN_LEN)?;
        check_discriminator(data, &margin_account_discriminator(), ACCOUNT_SHAPE)?;

        let mut balances = [Balance::default(); MAX_BALANCES];
        for (i, balance) in balances.iter_mut().enumerate() {
            let slot = r.element(BALANCES_OFFSET + i * BALANCE_LEN, BALANCE_LEN)?;
            *balance = Balance::decode(&slot)?;
        }

        Ok(Self {
            group: r.pubkey_at(ACCOUNT_GROUP)?,
            authority: r.pubkey_at(ACCOUNT_AUTHORITY)?,
            balances,
            untouched: Untouched::capture(data, ACCOUNT_MIN_LEN, account_ranges()),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_len(ACCOUNT_MIN_LEN);
        w.put_raw(0, &margin_account_discriminator());
        w.put_at(ACCOUNT_GROUP, self.group.as_ref());
        w.put_at(ACCOUNT_AUTHORITY, self.authority.as_ref());
        for (i, balance) in self.balances.iter().enumerate() {
            balance.encode_into(&mut w, BALANCES_OFFSET + i * BALANCE_LEN);
        }
        w.restore(&self.untouched);
        w.into_inner()
    }

    pub fn active_balances(&self) -> impl Iterator<Item = &Balance> {
        self.balances.iter().filter(|b| b.active)
    }
}
