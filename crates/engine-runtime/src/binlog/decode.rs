//! Decoding of binlog row images into the engine's value model.

use connectors::sql::convert::from_sql_value;
use connectors::sql::error::DbError;
use connectors::sql::metadata::ColumnMetadata;
use model::core::value::Value;
use model::events::RowImage;
use mysql_common::binlog::events::RowsEventData;
use mysql_common::binlog::jsonb;
use mysql_common::binlog::jsonb::{Array, ComplexValue, Object, StorageFormat};
use mysql_common::binlog::row::BinlogRow;
use mysql_common::binlog::value::BinlogValue;

/// Convert one binlog row into a [`RowImage`], dispatching character
/// columns through the charset decoder via the captured metadata.
pub fn decode_binlog_row(
    mut row: BinlogRow,
    columns: &[ColumnMetadata],
) -> Result<RowImage, DbError> {
    if row.len() != columns.len() {
        return Err(DbError::Decode(format!(
            "binlog row has {} columns, table has {}; schemas have drifted",
            row.len(),
            columns.len()
        )));
    }

    let mut values = Vec::with_capacity(row.len());
    for (i, column) in columns.iter().enumerate() {
        let value = match row.take(i) {
            // column absent from the image (minimal row images)
            None => Value::Null,
            Some(BinlogValue::Value(v)) => from_sql_value(v, column),
            Some(BinlogValue::Jsonb(json)) => Value::String(jsonb_to_json(json)?.to_string()),
            Some(BinlogValue::JsonDiff(_)) => {
                return Err(DbError::Decode(format!(
                    "partial JSON update on column {}; binlog_row_value_options must be empty",
                    column.name
                )));
            }
        };
        values.push(value);
    }
    Ok(RowImage(values))
}

/// The table a rows event belongs to, needed to look up its table map
/// event before the rows can be parsed.
pub fn rows_event_table_id(data: &RowsEventData<'_>) -> u64 {
    match data {
        RowsEventData::WriteRowsEvent(e) => e.table_id(),
        RowsEventData::WriteRowsEventV1(e) => e.table_id(),
        RowsEventData::UpdateRowsEvent(e) => e.table_id(),
        RowsEventData::UpdateRowsEventV1(e) => e.table_id(),
        RowsEventData::PartialUpdateRowsEvent(e) => e.table_id(),
        RowsEventData::DeleteRowsEvent(e) => e.table_id(),
        RowsEventData::DeleteRowsEventV1(e) => e.table_id(),
        _ => 0,
    }
}

fn jsonb_to_json(value: jsonb::Value<'_>) -> Result<serde_json::Value, DbError> {
    use jsonb::Value::*;
    Ok(match value {
        Null => serde_json::Value::Null,
        Bool(v) => serde_json::Value::Bool(v),
        I16(v) => serde_json::Value::from(v),
        U16(v) => serde_json::Value::from(v),
        I32(v) => serde_json::Value::from(v),
        U32(v) => serde_json::Value::from(v),
        I64(v) => serde_json::Value::from(v),
        U64(v) => serde_json::Value::from(v),
        F64(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        String(v) => serde_json::Value::String(v.str().into_owned()),
        SmallArray(v) => jsonb_array_to_json(v)?,
        LargeArray(v) => jsonb_array_to_json(v)?,
        SmallObject(v) => jsonb_object_to_json(v)?,
        LargeObject(v) => jsonb_object_to_json(v)?,
        Opaque(v) => {
            // opaque scalars (dates, decimals) surface as hex so nothing
            // is silently lost
            let hex: std::string::String =
                v.data_raw().iter().map(|b| format!("{b:02x}")).collect();
            serde_json::Value::String(hex)
        }
    })
}

fn jsonb_array_to_json<T: StorageFormat>(
    array: ComplexValue<'_, T, Array>,
) -> Result<serde_json::Value, DbError> {
    let mut out = Vec::new();
    for value in array.iter() {
        let value = value.map_err(|e| DbError::Decode(e.to_string()))?;
        out.push(jsonb_to_json(value)?);
    }
    Ok(serde_json::Value::Array(out))
}

fn jsonb_object_to_json<T: StorageFormat>(
    object: ComplexValue<'_, T, Object>,
) -> Result<serde_json::Value, DbError> {
    let mut out = serde_json::Map::new();
    for entry in object.iter() {
        let (key, value) = entry.map_err(|e| DbError::Decode(e.to_string()))?;
        out.insert(key.value().into_owned(), jsonb_to_json(value)?);
    }
    Ok(serde_json::Value::Object(out))
}
