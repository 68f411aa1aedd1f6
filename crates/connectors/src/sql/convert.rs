//! Conversion from driver-level values into the engine's value model.
//!
//! Both the full-load SELECTs and the binlog row decoder produce
//! [`mysql_async::Value`]s; this is the single place where they become
//! typed [`Value`]s, with character data routed through the charset
//! decoder keyed on the column's declared charset.

use crate::sql::{charset, error::DbError, metadata::ColumnMetadata};
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use model::core::value::Value;
use model::events::RowImage;
use std::str::FromStr;

pub fn from_sql_value(value: mysql_async::Value, column: &ColumnMetadata) -> Value {
    use mysql_async::Value as Sql;

    match value {
        Sql::NULL => Value::Null,
        Sql::Int(v) => Value::Int(v),
        Sql::UInt(v) => Value::UInt(v),
        Sql::Float(v) => Value::Float(f64::from(v)),
        Sql::Double(v) => Value::Float(v),
        Sql::Date(y, mo, d, h, mi, s, us) => convert_date(column, y, mo, d, h, mi, s, us),
        Sql::Time(neg, days, h, mi, s, us) => Value::Time(format_time(neg, days, h, mi, s, us)),
        Sql::Bytes(bytes) => convert_bytes(bytes, column),
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_date(column: &ColumnMetadata, y: u16, mo: u8, d: u8, h: u8, mi: u8, s: u8, us: u32) -> Value {
    let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d));
    match date {
        Some(date) if column.data_type == "date" => Value::Date(date),
        Some(date) => match date.and_hms_micro_opt(
            u32::from(h),
            u32::from(mi),
            u32::from(s),
            us,
        ) {
            Some(ts) => Value::DateTime(ts),
            None => Value::String(format_raw_datetime(y, mo, d, h, mi, s, us)),
        },
        // zero dates (0000-00-00) survive as their literal text
        None => Value::String(format_raw_datetime(y, mo, d, h, mi, s, us)),
    }
}

fn format_raw_datetime(y: u16, mo: u8, d: u8, h: u8, mi: u8, s: u8, us: u32) -> String {
    if h == 0 && mi == 0 && s == 0 && us == 0 {
        format!("{y:04}-{mo:02}-{d:02}")
    } else {
        format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}")
    }
}

fn format_time(neg: bool, days: u32, h: u8, mi: u8, s: u8, us: u32) -> String {
    let hours = days * 24 + u32::from(h);
    let sign = if neg { "-" } else { "" };
    format!("{sign}{hours}:{mi:02}:{s:02}.{us:06}")
}

fn convert_bytes(bytes: Vec<u8>, column: &ColumnMetadata) -> Value {
    if column.data_type == "decimal" {
        if let Ok(text) = std::str::from_utf8(&bytes)
            && let Ok(dec) = BigDecimal::from_str(text)
        {
            return Value::Decimal(dec);
        }
        return Value::Bytes(bytes);
    }

    // Temporal values arrive as text over some protocol paths.
    if matches!(column.data_type.as_str(), "datetime" | "timestamp")
        && let Ok(text) = std::str::from_utf8(&bytes)
        && let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
    {
        return Value::DateTime(ts);
    }

    let is_text = column.charset.is_some() || column.data_type == "json";
    if is_text {
        match charset::decode_bytes(&bytes, column.charset.as_deref()) {
            Some(text) => Value::String(text),
            // keep raw bytes rather than dropping the event
            None => Value::Bytes(bytes),
        }
    } else {
        Value::Bytes(bytes)
    }
}

/// Convert a driver row (from the full-load SELECTs) into a row image,
/// column by column against the captured metadata.
pub fn row_to_image(mut row: mysql_async::Row, columns: &[ColumnMetadata]) -> Result<RowImage, DbError> {
    if row.len() != columns.len() {
        return Err(DbError::Decode(format!(
            "row has {} columns, metadata has {}",
            row.len(),
            columns.len()
        )));
    }

    let mut values = Vec::with_capacity(row.len());
    for (i, column) in columns.iter().enumerate() {
        let value: mysql_async::Value = row
            .take(i)
            .ok_or_else(|| DbError::Decode(format!("missing value for column {}", column.name)))?;
        values.push(from_sql_value(value, column));
    }
    Ok(RowImage(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: &str, charset: Option<&str>) -> ColumnMetadata {
        ColumnMetadata {
            name: "c".into(),
            data_type: data_type.into(),
            charset: charset.map(str::to_string),
        }
    }

    #[test]
    fn integers_map_directly() {
        assert_eq!(
            from_sql_value(mysql_async::Value::Int(-9), &column("bigint", None)),
            Value::Int(-9)
        );
        assert_eq!(
            from_sql_value(mysql_async::Value::UInt(9), &column("bigint", None)),
            Value::UInt(9)
        );
    }

    #[test]
    fn decimal_bytes_parse() {
        let v = from_sql_value(
            mysql_async::Value::Bytes(b"12.34".to_vec()),
            &column("decimal", None),
        );
        assert_eq!(v, Value::Decimal(BigDecimal::from_str("12.34").unwrap()));
    }

    #[test]
    fn varchar_bytes_decode_to_string() {
        let v = from_sql_value(
            mysql_async::Value::Bytes(b"hello".to_vec()),
            &column("varchar", Some("utf8mb4")),
        );
        assert_eq!(v, Value::String("hello".into()));
    }

    #[test]
    fn utf32_column_converts() {
        let raw = vec![0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00, 0x42];
        let v = from_sql_value(
            mysql_async::Value::Bytes(raw),
            &column("char", Some("utf32")),
        );
        assert_eq!(v, Value::String("AB".into()));
    }

    #[test]
    fn binary_column_stays_bytes() {
        let raw = vec![0xde, 0xad, 0xbe, 0xef];
        let v = from_sql_value(
            mysql_async::Value::Bytes(raw.clone()),
            &column("varbinary", None),
        );
        assert_eq!(v, Value::Bytes(raw));
    }

    #[test]
    fn datetime_splits_from_date() {
        let v = from_sql_value(
            mysql_async::Value::Date(2024, 3, 9, 0, 0, 0, 0),
            &column("date", None),
        );
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));

        let v = from_sql_value(
            mysql_async::Value::Date(2024, 3, 9, 10, 0, 0, 0),
            &column("datetime", None),
        );
        assert!(matches!(v, Value::DateTime(_)));
    }

    #[test]
    fn zero_date_survives_as_text() {
        let v = from_sql_value(
            mysql_async::Value::Date(0, 0, 0, 0, 0, 0, 0),
            &column("date", None),
        );
        assert_eq!(v, Value::String("0000-00-00".into()));
    }

    #[test]
    fn negative_time_formats_with_sign_and_day_overflow() {
        let v = from_sql_value(
            mysql_async::Value::Time(true, 1, 2, 3, 4, 0),
            &column("time", None),
        );
        assert_eq!(v, Value::Time("-26:03:04.000000".into()));
    }
}
