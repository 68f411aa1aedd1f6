use crate::sql::{error::DbError, pool::MySqlPool};
use model::core::table::TableRef;
use mysql_async::prelude::Queryable;
use tracing::info;

/// Clone the source table's DDL onto the target.
///
/// Column types, order, primary key and charset/collation declarations
/// are preserved verbatim; only the table name is rewritten. The emitted
/// statement is `CREATE TABLE IF NOT EXISTS`, so re-running after a
/// partial start is harmless.
pub async fn copy_schema(
    src: &MySqlPool,
    tgt: &MySqlPool,
    src_table: &TableRef,
    tgt_table: &TableRef,
    drop_if_exists: bool,
) -> Result<(), DbError> {
    if drop_if_exists {
        tgt.query_drop(&format!("DROP TABLE IF EXISTS {}", tgt_table.qualified()))
            .await?;
        info!(table = %tgt_table, "dropped target table before recreate");
    }

    let ddl = fetch_create_table(src, src_table).await?;
    let rewritten = rewrite_ddl(&ddl, tgt_table)?;

    tgt.query_drop(&rewritten).await?;
    info!(source = %src_table, target = %tgt_table, "target schema created");
    Ok(())
}

async fn fetch_create_table(src: &MySqlPool, table: &TableRef) -> Result<String, DbError> {
    let mut conn = src.get().await?;
    let row: Option<(String, String)> = conn
        .query_first(format!("SHOW CREATE TABLE {}", table.qualified()))
        .await?;

    match row {
        Some((_, ddl)) => Ok(ddl),
        None => Err(DbError::Schema(format!(
            "SHOW CREATE TABLE returned nothing for {table}"
        ))),
    }
}

/// Swap the table name in a `SHOW CREATE TABLE` result for the fully
/// qualified target name, keeping the column definitions untouched.
fn rewrite_ddl(ddl: &str, tgt_table: &TableRef) -> Result<String, DbError> {
    let body_start = ddl
        .find('(')
        .ok_or_else(|| DbError::Schema("malformed DDL: no column list".into()))?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} {}",
        tgt_table.qualified(),
        &ddl[body_start..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_replaces_name_and_keeps_body() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
        let out = rewrite_ddl(ddl, &TableRef::new("tgt", "t_copy")).unwrap();
        assert!(out.starts_with("CREATE TABLE IF NOT EXISTS `tgt`.`t_copy` ("));
        assert!(out.contains("`id` int NOT NULL"));
        assert!(out.contains("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn rewrite_rejects_ddl_without_column_list() {
        assert!(rewrite_ddl("CREATE TABLE `broken`", &TableRef::new("d", "t")).is_err());
    }
}
