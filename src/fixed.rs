// Unsigned 80.48 fixed-point arithmetic
//
// On-chain programs (marginfi banks and balances, oracle-derived prices) store
// share values and prices as 128-bit little-endian fixed-point numbers with 48
// fractional bits. This module mirrors the on-chain evaluation order exactly:
//
// - multiplication widens, multiplies, then shifts right by 48
// - division shifts the dividend left by 48, then divides
//
// Intermediate values are computed in `num_bigint::BigUint` so no high bits are
// ever dropped; a result that does not fit back into 128 bits is an error.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use std::fmt;
use thiserror::Error;

/// Number of fractional bits
pub const FRACTIONAL_BITS: u32 = 48;

/// Width of the on-chain field in bytes
pub const ENCODED_LEN: usize = 16;

const ONE_RAW: u128 = 1u128 << FRACTIONAL_BITS;
const ONE_F64: f64 = 281_474_976_710_656.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FixedPointError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("subtraction underflow")]
    Underflow,
    #[error("result does not fit in 128 bits")]
    Overflow,
    #[error("value {0} is not representable as non-negative 80.48 fixed point")]
    NotRepresentable(f64),
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Non-negative 80.48 fixed-point number.
///
/// The raw representation is the value scaled by 2^48.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U80F48(u128);

impl U80F48 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(ONE_RAW);

    pub const fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u128 {
        self.0
    }

    pub const fn from_integer(value: u64) -> Self {
        Self((value as u128) << FRACTIONAL_BITS)
    }

    /// Read exactly 16 little-endian bytes.
    pub fn from_le_slice(data: &[u8]) -> Result<Self, FixedPointError> {
        let bytes: [u8; ENCODED_LEN] =
            data.try_into()
                .map_err(|_| FixedPointError::InvalidLength {
                    expected: ENCODED_LEN,
                    actual: data.len(),
                })?;
        Ok(Self::from_le_bytes(bytes))
    }

    pub const fn from_le_bytes(bytes: [u8; ENCODED_LEN]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    pub const fn to_le_bytes(self) -> [u8; ENCODED_LEN] {
        self.0.to_le_bytes()
    }

    /// Lossy construction from a float, used for thresholds and tests.
    pub fn from_f64(value: f64) -> Result<Self, FixedPointError> {
        if !value.is_finite() || value < 0.0 {
            return Err(FixedPointError::NotRepresentable(value));
        }
        let whole = value.trunc();
        if whole >= 2f64.powi(80) {
            return Err(FixedPointError::NotRepresentable(value));
        }
        let frac = ((value - whole) * ONE_F64).round() as u128;
        Ok(Self(((whole as u128) << FRACTIONAL_BITS) + frac))
    }

    /// Lossy conversion for display and telemetry only.
    ///
    /// Protocol-critical comparisons must stay in fixed point.
    pub fn to_f64(self) -> f64 {
        let whole = (self.0 >> FRACTIONAL_BITS) as f64;
        let frac = (self.0 & (ONE_RAW - 1)) as f64 / ONE_F64;
        whole + frac
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, FixedPointError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, FixedPointError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(FixedPointError::Underflow)
    }

    /// Widen, multiply, then shift right by 48.
    pub fn checked_mul(self, rhs: Self) -> Result<Self, FixedPointError> {
        let product = (BigUint::from(self.0) * BigUint::from(rhs.0)) >> FRACTIONAL_BITS;
        narrow(product)
    }

    /// Shift left by 48, then divide.
    pub fn checked_div(self, rhs: Self) -> Result<Self, FixedPointError> {
        if rhs.0 == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        let quotient = (BigUint::from(self.0) << FRACTIONAL_BITS) / BigUint::from(rhs.0);
        narrow(quotient)
    }

    /// Divide by a plain integer, promoted to fixed point first.
    pub fn checked_div_int(self, rhs: u64) -> Result<Self, FixedPointError> {
        self.checked_div(Self::from_integer(rhs))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

fn narrow(value: BigUint) -> Result<U80F48, FixedPointError> {
    if value.is_zero() {
        return Ok(U80F48::ZERO);
    }
    value.to_u128().map(U80F48).ok_or(FixedPointError::Overflow)
}

impl fmt::Debug for U80F48 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U80F48({})", self.to_f64())
    }
}

impl fmt::Display for U80F48 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_is_two_pow_48() {
        assert_eq!(U80F48::ONE.to_bits(), 281_474_976_710_656);
        assert_eq!(U80F48::from_integer(1), U80F48::ONE);
    }

    #[test]
    fn test_float_round_trip() {
        let value = 9_313_074_543.0 / 100_000_000.0;
        let fixed = U80F48::from_f64(value).unwrap();
        assert!((fixed.to_f64() - value).abs() < 1e-12);
    }

    #[test]
    fn test_mul_shifts_after_multiply() {
        // 1.5 * 2.5 = 3.75
        let a = U80F48::from_f64(1.5).unwrap();
        let b = U80F48::from_f64(2.5).unwrap();
        assert_eq!(a.checked_mul(b).unwrap(), U80F48::from_f64(3.75).unwrap());

        // smallest unit times smallest unit truncates to zero
        let ulp = U80F48::from_bits(1);
        assert_eq!(ulp.checked_mul(ulp).unwrap(), U80F48::ZERO);
    }

    #[test]
    fn test_mul_keeps_high_bits_of_intermediate() {
        // 2^60 * 2^10 overflows u128 before the shift but not after
        let a = U80F48::from_integer(1 << 60);
        let b = U80F48::from_integer(1 << 10);
        let product = a.checked_mul(b).unwrap();
        assert_eq!(product.to_bits(), 1u128 << (70 + FRACTIONAL_BITS));
    }

    #[test]
    fn test_mul_overflow_is_reported() {
        let big = U80F48::from_integer(u64::MAX);
        let result = big.checked_mul(big).and_then(|v| v.checked_mul(big));
        assert_eq!(result, Err(FixedPointError::Overflow));
    }

    #[test]
    fn test_div_by_zero_is_error() {
        let a = U80F48::from_integer(10);
        assert_eq!(a.checked_div(U80F48::ZERO), Err(FixedPointError::DivisionByZero));
        assert_eq!(a.checked_div_int(0), Err(FixedPointError::DivisionByZero));
    }

    #[test]
    fn test_div_int_scales_by_decimals() {
        let amount = U80F48::from_integer(1_500_000);
        let scaled = amount.checked_div_int(1_000_000).unwrap();
        assert_eq!(scaled, U80F48::from_f64(1.5).unwrap());
    }

    #[test]
    fn test_sub_underflow() {
        let a = U80F48::from_integer(1);
        let b = U80F48::from_integer(2);
        assert_eq!(a.checked_sub(b), Err(FixedPointError::Underflow));
    }

    #[test]
    fn test_from_le_slice_rejects_wrong_width() {
        assert!(matches!(
            U80F48::from_le_slice(&[0u8; 15]),
            Err(FixedPointError::InvalidLength { expected: 16, actual: 15 })
        ));
        let bytes = 287_207_082_485_166u128.to_le_bytes();
        let value = U80F48::from_le_slice(&bytes).unwrap();
        assert_eq!(value.to_le_bytes(), bytes);
        assert!((value.to_f64() - 1.020_364_5).abs() < 1e-6);
    }

    #[test]
    fn test_negative_float_rejected() {
        assert!(U80F48::from_f64(-1.0).is_err());
        assert!(U80F48::from_f64(f64::NAN).is_err());
    }

    proptest! {
        #[test]
        fn prop_add_then_sub_is_identity(a in 0u128..(1u128 << 100), b in 0u128..(1u128 << 100)) {
            let a = U80F48::from_bits(a);
            let b = U80F48::from_bits(b);
            prop_assert_eq!(a.checked_add(b).unwrap().checked_sub(b).unwrap(), a);
        }

        #[test]
        fn prop_mul_then_div_within_one_ulp(
            a in 0u128..(1u128 << 90),
            b in (1u128 << FRACTIONAL_BITS)..(1u128 << 70),
        ) {
            let a = U80F48::from_bits(a);
            let b = U80F48::from_bits(b);
            let back = a.checked_mul(b).unwrap().checked_div(b).unwrap();
            let diff = a.to_bits().abs_diff(back.to_bits());
            prop_assert!(diff <= 1, "a={:?} b={:?} back={:?}", a, b, back);
        }

        #[test]
        fn prop_bytes_round_trip(bits in any::<u128>()) {
            let value = U80F48::from_bits(bits);
            prop_assert_eq!(U80F48::from_le_bytes(value.to_le_bytes()), value);
        }
    }
}
