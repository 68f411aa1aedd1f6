use model::core::value::Value;
use std::fmt::Write;

/// Render a [`Value`] as a MySQL literal for use inside emitted
/// statements. Strings are escaped for a connection running with default
/// SQL modes (backslash escapes active).
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => ryu::Buffer::new().format(*v).to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
        Value::Time(t) => format!("'{}'", escape_string(t)),
        Value::Bytes(bytes) => encode_bytes(bytes),
        Value::String(s) => format!("'{}'", escape_string(s)),
    }
}

fn encode_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "''".to_string();
    }
    let mut out = String::with_capacity(2 + 2 * bytes.len());
    out.push_str("0x");
    for byte in bytes {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::str::FromStr;

    #[test]
    fn null_and_numbers_are_bare() {
        assert_eq!(encode_value(&Value::Null), "NULL");
        assert_eq!(encode_value(&Value::Int(-3)), "-3");
        assert_eq!(encode_value(&Value::UInt(18446744073709551615)), "18446744073709551615");
        assert_eq!(
            encode_value(&Value::Decimal(BigDecimal::from_str("12.500").unwrap())),
            "12.500"
        );
    }

    #[test]
    fn float_round_trips_through_ryu() {
        assert_eq!(encode_value(&Value::Float(1.25)), "1.25");
    }

    #[test]
    fn strings_are_quoted_and_escaped() {
        assert_eq!(
            encode_value(&Value::String("it's a \\ test".into())),
            "'it\\'s a \\\\ test'"
        );
        assert_eq!(encode_value(&Value::String("nul\0byte".into())), "'nul\\0byte'");
    }

    #[test]
    fn bytes_render_as_hex() {
        assert_eq!(encode_value(&Value::Bytes(vec![0xde, 0xad])), "0xdead");
        assert_eq!(encode_value(&Value::Bytes(vec![])), "''");
    }

    #[test]
    fn temporal_literals() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(encode_value(&Value::Date(d)), "'2024-03-09'");

        let ts = NaiveDateTime::parse_from_str("2024-03-09 10:20:30.000400", "%Y-%m-%d %H:%M:%S%.f")
            .unwrap();
        assert_eq!(
            encode_value(&Value::DateTime(ts)),
            "'2024-03-09 10:20:30.000400'"
        );

        assert_eq!(
            encode_value(&Value::Time("-838:59:59.000000".into())),
            "'-838:59:59.000000'"
        );
    }
}
