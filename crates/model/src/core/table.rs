use serde::{Deserialize, Serialize};
use std::fmt;

/// A database-qualified table reference.
///
/// Every statement the engines emit uses [`TableRef::qualified`] so that
/// correctness never depends on which pooled connection (and therefore
/// which default database) serves the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub db: String,
    pub table: String,
}

impl TableRef {
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
        }
    }

    /// Backtick-quoted `` `db`.`table` `` for use in emitted SQL.
    pub fn qualified(&self) -> String {
        format!(
            "`{}`.`{}`",
            escape_identifier(&self.db),
            escape_identifier(&self.table)
        )
    }

    /// The stable `db.table` key identifying a replication job across
    /// restarts; used as the checkpoint row id.
    pub fn key(&self) -> String {
        format!("{}.{}", self.db, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.table)
    }
}

fn escape_identifier(name: &str) -> String {
    name.replace('`', "``")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_quotes_both_parts() {
        let t = TableRef::new("shop", "orders");
        assert_eq!(t.qualified(), "`shop`.`orders`");
    }

    #[test]
    fn qualified_escapes_backticks() {
        let t = TableRef::new("we`ird", "ta`ble");
        assert_eq!(t.qualified(), "`we``ird`.`ta``ble`");
    }

    #[test]
    fn key_is_unquoted() {
        let t = TableRef::new("shop", "orders");
        assert_eq!(t.key(), "shop.orders");
    }
}
