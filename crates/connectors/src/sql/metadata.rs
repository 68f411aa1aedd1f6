use crate::sql::{error::DbError, pool::MySqlPool};
use model::core::table::TableRef;
use mysql_async::prelude::Queryable;

const COLUMNS_SQL: &str = "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_SET_NAME \
     FROM information_schema.columns \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

const PK_SQL: &str = "SELECT COLUMN_NAME \
     FROM information_schema.key_column_usage \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
     ORDER BY ORDINAL_POSITION";

const INTEGER_TYPES: &[&str] = &["tinyint", "smallint", "mediumint", "int", "bigint"];

#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    pub name: String,
    /// Lowercased `DATA_TYPE` from information_schema.
    pub data_type: String,
    /// Declared charset; `None` for binary and non-character columns.
    pub charset: Option<String>,
}

impl ColumnMetadata {
    pub fn is_integer(&self) -> bool {
        INTEGER_TYPES.contains(&self.data_type.as_str())
    }
}

/// Column layout and primary key of the replicated table, captured once
/// at anchor time. The charset column drives the per-column decoder
/// dispatch in the apply path.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub table: TableRef,
    pub columns: Vec<ColumnMetadata>,
    /// PK column names in key order.
    pub pk_columns: Vec<String>,
}

impl TableMetadata {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Positions of the PK columns within the column list, in key order.
    pub fn pk_indexes(&self) -> Vec<usize> {
        self.pk_columns
            .iter()
            .filter_map(|pk| self.columns.iter().position(|c| &c.name == pk))
            .collect()
    }

    /// The PK column when it is exactly one integer column; parallel
    /// full-load mode is only available in that case.
    pub fn single_int_pk(&self) -> Option<&ColumnMetadata> {
        match self.pk_columns.as_slice() {
            [only] => self
                .columns
                .iter()
                .find(|c| &c.name == only)
                .filter(|c| c.is_integer()),
            _ => None,
        }
    }
}

pub async fn fetch_table_metadata(
    pool: &MySqlPool,
    table: &TableRef,
) -> Result<TableMetadata, DbError> {
    let mut conn = pool.get().await?;

    let rows: Vec<(String, String, Option<String>)> = conn
        .exec(COLUMNS_SQL, (&table.db, &table.table))
        .await?;
    if rows.is_empty() {
        return Err(DbError::Schema(format!("table {table} does not exist")));
    }

    let columns = rows
        .into_iter()
        .map(|(name, data_type, charset)| ColumnMetadata {
            name,
            data_type: data_type.to_lowercase(),
            charset,
        })
        .collect();

    let pk_columns: Vec<String> = conn.exec(PK_SQL, (&table.db, &table.table)).await?;
    if pk_columns.is_empty() {
        return Err(DbError::Schema(format!(
            "table {table} has no primary key; replication requires one"
        )));
    }

    Ok(TableMetadata {
        table: table.clone(),
        columns,
        pk_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(cols: &[(&str, &str)], pk: &[&str]) -> TableMetadata {
        TableMetadata {
            table: TableRef::new("db", "t"),
            columns: cols
                .iter()
                .map(|(name, data_type)| ColumnMetadata {
                    name: (*name).to_string(),
                    data_type: (*data_type).to_string(),
                    charset: None,
                })
                .collect(),
            pk_columns: pk.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    #[test]
    fn single_int_pk_detected() {
        let m = meta(&[("id", "int"), ("v", "varchar")], &["id"]);
        assert_eq!(m.single_int_pk().map(|c| c.name.as_str()), Some("id"));
    }

    #[test]
    fn composite_pk_is_not_single_int() {
        let m = meta(&[("a", "int"), ("b", "int")], &["a", "b"]);
        assert!(m.single_int_pk().is_none());
    }

    #[test]
    fn non_integer_pk_is_not_single_int() {
        let m = meta(&[("id", "varchar")], &["id"]);
        assert!(m.single_int_pk().is_none());
    }

    #[test]
    fn pk_indexes_follow_key_order_not_column_order() {
        let m = meta(&[("v", "varchar"), ("b", "int"), ("a", "int")], &["a", "b"]);
        assert_eq!(m.pk_indexes(), vec![2, 1]);
    }
}
