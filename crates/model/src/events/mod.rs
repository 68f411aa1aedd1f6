use crate::core::{anchor::BinlogAnchor, table::TableRef, value::Value};
use serde::{Deserialize, Serialize};

/// The column values of one row, in source column order.
///
/// Arity always equals the source table's column count at the time the
/// anchor was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowImage(pub Vec<Value>);

impl RowImage {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Serialized-size estimate of the row, for packet budgeting.
    pub fn size_bytes(&self) -> usize {
        // per-value separators plus the surrounding parentheses
        self.0.iter().map(|v| v.size_bytes() + 1).sum::<usize>() + 2
    }
}

/// What a row event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A decoded row change for the replicated table, annotated with the
/// binlog position *after* the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: TableRef,
    pub anchor: BinlogAnchor,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Insert { after: RowImage },
    Update { before: RowImage, after: RowImage },
    Delete { before: RowImage },
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Insert { .. } => ChangeKind::Insert,
            Change::Update { .. } => ChangeKind::Update,
            Change::Delete { .. } => ChangeKind::Delete,
        }
    }
}

/// One completed chunk of a parallel full load, as recorded in the
/// `full_load_progress` ledger. Idempotent on `(table_key, start)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullLoadRange {
    pub table_key: String,
    pub start: i64,
    pub end: i64,
}

impl FullLoadRange {
    pub fn contains(&self, pk: i64) -> bool {
        pk >= self.start && pk <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_reports_its_kind() {
        let row = RowImage(vec![Value::Int(1)]);
        assert_eq!(
            Change::Insert { after: row.clone() }.kind(),
            ChangeKind::Insert
        );
        assert_eq!(
            Change::Update {
                before: row.clone(),
                after: row.clone()
            }
            .kind(),
            ChangeKind::Update
        );
        assert_eq!(Change::Delete { before: row }.kind(), ChangeKind::Delete);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let r = FullLoadRange {
            table_key: "db.t".into(),
            start: 10,
            end: 20,
        };
        assert!(r.contains(10));
        assert!(r.contains(20));
        assert!(!r.contains(9));
        assert!(!r.contains(21));
    }

    #[test]
    fn row_size_estimate_grows_with_content() {
        let small = RowImage(vec![Value::Int(1)]);
        let big = RowImage(vec![Value::String("x".repeat(100))]);
        assert!(big.size_bytes() > small.size_bytes());
    }
}
