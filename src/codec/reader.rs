use std::ops::Range;

use solana_sdk::pubkey::Pubkey;

use super::{DecodeError, Field, FieldKind};
use crate::fixed::U80F48;

/// Bounds-checked view over an account buffer.
///
/// Fixed-offset shapes read through `Field` descriptors; variable shapes with
/// tagged options walk the buffer sequentially with the cursor methods.
pub struct AccountReader<'a> {
    data: &'a [u8],
    shape: &'static str,
    pos: usize,
}

impl<'a> AccountReader<'a> {
    pub fn new(data: &'a [u8], shape: &'static str) -> Self {
        Self { data, shape, pos: 0 }
    }

    /// Fail early when the buffer cannot hold `min_len` bytes.
    pub fn require(&self, min_len: usize) -> Result<(), DecodeError> {
        if self.data.len() < min_len {
            return Err(self.too_short(min_len));
        }
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn too_short(&self, needed: usize) -> DecodeError {
        DecodeError::TooShort {
            shape: self.shape,
            needed,
            actual: self.data.len(),
        }
    }

    fn slice(&self, offset: usize, width: usize) -> Result<&'a [u8], DecodeError> {
        let end = offset.checked_add(width).ok_or_else(|| self.too_short(usize::MAX))?;
        self.data.get(offset..end).ok_or_else(|| self.too_short(end))
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(offset, N)?);
        Ok(out)
    }

    fn field_bytes(&self, field: Field, expected: FieldKind) -> Result<&'a [u8], DecodeError> {
        debug_assert_eq!(
            field.kind.width(),
            expected.width(),
            "field {} read with the wrong width",
            field.name
        );
        self.slice(field.offset, field.kind.width())
    }

    // ------------------------------------------------------------------
    // fixed-offset access
    // ------------------------------------------------------------------

    pub fn u8_at(&self, field: Field) -> Result<u8, DecodeError> {
        Ok(self.field_bytes(field, FieldKind::U8)?[0])
    }

    pub fn bool_at(&self, field: Field) -> Result<bool, DecodeError> {
        match self.field_bytes(field, FieldKind::Bool)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag {
                shape: self.shape,
                offset: field.offset,
                tag,
            }),
        }
    }

    pub fn u32_at(&self, field: Field) -> Result<u32, DecodeError> {
        self.field_bytes(field, FieldKind::U32)?;
        Ok(u32::from_le_bytes(self.array(field.offset)?))
    }

    pub fn i32_at(&self, field: Field) -> Result<i32, DecodeError> {
        self.field_bytes(field, FieldKind::I32)?;
        Ok(i32::from_le_bytes(self.array(field.offset)?))
    }

    pub fn u64_at(&self, field: Field) -> Result<u64, DecodeError> {
        self.field_bytes(field, FieldKind::U64)?;
        Ok(u64::from_le_bytes(self.array(field.offset)?))
    }

    pub fn i64_at(&self, field: Field) -> Result<i64, DecodeError> {
        self.field_bytes(field, FieldKind::I64)?;
        Ok(i64::from_le_bytes(self.array(field.offset)?))
    }

    pub fn pubkey_at(&self, field: Field) -> Result<Pubkey, DecodeError> {
        self.field_bytes(field, FieldKind::Pubkey)?;
        Ok(Pubkey::new_from_array(self.array(field.offset)?))
    }

    pub fn fixed_at(&self, field: Field) -> Result<U80F48, DecodeError> {
        self.field_bytes(field, FieldKind::Fixed)?;
        Ok(U80F48::from_le_bytes(self.array(field.offset)?))
    }

    /// Sub-reader over a repeated element, e.g. one balance slot.
    pub fn element(&self, base: usize, width: usize) -> Result<AccountReader<'a>, DecodeError> {
        Ok(AccountReader::new(self.slice(base, width)?, self.shape))
    }

    // ------------------------------------------------------------------
    // sequential access
    // ------------------------------------------------------------------

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.slice(self.pos, n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let value = self.slice(self.pos, 1)?[0];
        self.pos += 1;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag {
                shape: self.shape,
                offset,
                tag,
            }),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let value = u32::from_le_bytes(self.array(self.pos)?);
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let value = u64::from_le_bytes(self.array(self.pos)?);
        self.pos += 8;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let value = i64::from_le_bytes(self.array(self.pos)?);
        self.pos += 8;
        Ok(value)
    }

    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let value = self.array::<N>(self.pos)?;
        self.pos += N;
        Ok(value)
    }

    pub fn read_pubkey(&mut self) -> Result<Pubkey, DecodeError> {
        Ok(Pubkey::new_from_array(self.read_bytes::<32>()?))
    }

    /// Tagged option: a presence byte, then the payload only when present.
    pub fn read_option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Option<T>, DecodeError> {
        if self.read_bool()? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Byte ranges written by the decoded fields of a fixed-offset table.
/// Padding entries are left out so their contents survive in `Untouched`.
pub fn field_ranges(fields: &[Field]) -> impl Iterator<Item = Range<usize>> + '_ {
    fields
        .iter()
        .filter(|f| !matches!(f.kind, FieldKind::Padding(_)))
        .map(|f| f.offset..f.end())
}

/// Account bytes a record does not model: gaps between fields, padding and
/// anything past the record's natural length.
///
/// Only non-zero runs are kept, so a record built in code compares equal to
/// the same record decoded from a zero-filled buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Untouched {
    runs: Vec<(usize, Vec<u8>)>,
    tail: usize,
}

impl Untouched {
    /// Keep every byte of `data` outside `covered`. `natural_len` is the
    /// length the record encodes to on its own.
    pub fn capture(
        data: &[u8],
        natural_len: usize,
        covered: impl IntoIterator<Item = Range<usize>>,
    ) -> Self {
        let mut mask = vec![false; data.len()];
        for range in covered {
            let end = range.end.min(data.len());
            let start = range.start.min(end);
            mask[start..end].iter_mut().for_each(|m| *m = true);
        }

        let mut runs = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if mask[i] || data[i] == 0 {
                i += 1;
                continue;
            }
            let start = i;
            while i < data.len() && !mask[i] && data[i] != 0 {
                i += 1;
            }
            runs.push((start, data[start..i].to_vec()));
        }

        Self {
            runs,
            tail: data.len().saturating_sub(natural_len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.tail == 0
    }
}

/// Mirror of `AccountReader` used to re-encode decoded records.
#[derive(Default)]
pub struct AccountWriter {
    buf: Vec<u8>,
}

impl AccountWriter {
    pub fn with_len(len: usize) -> Self {
        Self { buf: vec![0u8; len] }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_at(&mut self, field: Field, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), field.kind.width(), "field {}", field.name);
        self.buf[field.offset..field.offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn put_raw(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write back the bytes a decoded record kept aside. Call last.
    pub fn restore(&mut self, untouched: &Untouched) {
        let len = self.buf.len() + untouched.tail;
        self.buf.resize(len, 0);
        for (offset, bytes) in &untouched.runs {
            let end = offset + bytes.len();
            if end > self.buf.len() {
                self.buf.resize(end, 0);
            }
            self.buf[*offset..end].copy_from_slice(bytes);
        }
    }

    pub fn push_option<T>(&mut self, value: Option<T>, write: impl FnOnce(&mut Self, T)) {
        match value {
            Some(v) => {
                self.buf.push(1);
                write(self, v);
            }
            None => self.buf.push(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAG: Field = Field::new("flag", 0, FieldKind::U8);
    const AMOUNT: Field = Field::new("amount", 1, FieldKind::U64);

    #[test]
    fn test_fixed_reads_are_bounds_checked() {
        let data = [7u8, 1, 0, 0];
        let reader = AccountReader::new(&data, "test");
        assert_eq!(reader.u8_at(FLAG).unwrap(), 7);
        assert!(matches!(
            reader.u64_at(AMOUNT),
            Err(DecodeError::TooShort { needed: 9, actual: 4, .. })
        ));
    }

    #[test]
    fn test_bool_field_rejects_other_bytes() {
        let data = [2u8];
        let reader = AccountReader::new(&data, "test");
        let flag = Field::new("flag", 0, FieldKind::Bool);
        assert!(matches!(
            reader.bool_at(flag),
            Err(DecodeError::InvalidTag { tag: 2, offset: 0, .. })
        ));
    }

    #[test]
    fn test_untouched_restores_gaps_and_tail() {
        let data = [9u8, 0, 0, 5, 6, 0, 7, 1, 2];
        let untouched = Untouched::capture(&data, 7, [0..1, 6..7]);

        let mut w = AccountWriter::with_len(7);
        w.put_raw(0, &[9]);
        w.put_raw(6, &[7]);
        w.restore(&untouched);
        assert_eq!(w.into_inner(), data);
    }

    #[test]
    fn test_zero_gaps_are_not_kept() {
        let data = [9u8, 0, 0, 7];
        assert!(Untouched::capture(&data, 4, [0..1, 3..4]).is_empty());
        assert!(!Untouched::capture(&data, 3, [0..1]).is_empty());
    }

    #[test]
    fn test_option_reads_payload_only_when_present() {
        let mut data = vec![1u8];
        data.extend_from_slice(&[9u8; 32]);
        data.push(0);
        data.extend_from_slice(&42u64.to_le_bytes());

        let mut reader = AccountReader::new(&data, "test");
        let first = reader.read_option(|r| r.read_pubkey()).unwrap();
        let second = reader.read_option(|r| r.read_pubkey()).unwrap();
        assert_eq!(first, Some(Pubkey::new_from_array([9u8; 32])));
        assert_eq!(second, None);
        assert_eq!(reader.read_u64().unwrap(), 42);
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn test_option_rejects_bad_tag() {
        let data = [2u8, 0, 0];
        let mut reader = AccountReader::new(&data, "test");
        assert!(matches!(
            reader.read_option(|r| r.read_u8()),
            Err(DecodeError::InvalidTag { tag: 2, offset: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_option_payload() {
        let data = [1u8, 0, 0];
        let mut reader = AccountReader::new(&data, "test");
        assert!(reader.read_option(|r| r.read_pubkey()).is_err());
    }
}
