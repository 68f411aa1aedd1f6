use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single column value as it appears in a row image.
///
/// The set of variants is exactly what MySQL ROW-format replication can
/// produce for a single table: temporal types keep their native
/// representation, DECIMAL stays arbitrary-precision, and character data
/// that survived charset decoding is `String` while raw binary (or
/// undecodable) data stays `Bytes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(BigDecimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// MySQL TIME rendered canonically (`-838:59:59.000000`..`838:59:59.000000`).
    /// Kept as the literal body because TIME exceeds chrono's clock range.
    Time(String),
    Bytes(Vec<u8>),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Decimal(v) => v.to_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Decimal(v) => v.to_u64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Time(s) => Some(s),
            _ => None,
        }
    }

    /// Rough serialized size, used to keep batched statements under the
    /// connection's packet limit.
    pub fn size_bytes(&self) -> usize {
        match self {
            Value::Null => 4,
            Value::Int(_) | Value::UInt(_) => 20,
            Value::Float(_) => 24,
            Value::Decimal(v) => v.to_string().len(),
            Value::Date(_) => 12,
            Value::DateTime(_) => 28,
            Value::Time(s) => s.len() + 2,
            // Bytes render as 0x-prefixed hex
            Value::Bytes(b) => 2 + 2 * b.len(),
            Value::String(s) => s.len() + 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn integer_accessors_cross_convert() {
        assert_eq!(Value::Int(-5).as_i64(), Some(-5));
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn decimal_accessor() {
        let v = Value::Decimal(BigDecimal::from_str("42").unwrap());
        assert_eq!(v.as_i64(), Some(42));
    }

    #[test]
    fn null_is_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn bytes_size_accounts_for_hex_rendering() {
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).size_bytes(), 6);
    }
}
