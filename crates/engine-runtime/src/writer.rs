//! Batched extended-INSERT execution with packet budgeting.
//!
//! A batch is split and retried whenever its rendered statement would
//! not fit under the connection's packet ceiling, both proactively
//! (client-side size estimate) and reactively (server error 1153).
//! Splitting bottoms out at single rows, at which point the error is
//! real.

use connectors::sql::error::{DbError, is_packet_too_large};
use connectors::sql::pool::MAX_ALLOWED_PACKET;
use connectors::sql::statements::extended_insert;
use model::core::table::TableRef;
use model::events::RowImage;
use mysql_async::Conn;
use mysql_async::prelude::Queryable;
use tracing::warn;

// Leave headroom under max_allowed_packet for protocol framing.
const PACKET_BUDGET: usize = MAX_ALLOWED_PACKET - (1 << 20);

/// Write `rows` into `table` as one or more extended INSERT … ON
/// DUPLICATE KEY UPDATE statements. Returns the number of rows written.
pub(crate) async fn write_insert_batch(
    conn: &mut Conn,
    table: &TableRef,
    columns: &[String],
    rows: &[RowImage],
) -> Result<u64, DbError> {
    write_insert_batch_with_budget(conn, table, columns, rows, PACKET_BUDGET).await
}

pub(crate) async fn write_insert_batch_with_budget(
    conn: &mut Conn,
    table: &TableRef,
    columns: &[String],
    rows: &[RowImage],
    budget: usize,
) -> Result<u64, DbError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut written = 0u64;
    // LIFO stack of row spans still to write, kept in row order.
    let mut pending = plan_spans(rows, budget);
    pending.reverse();

    while let Some((start, end)) = pending.pop() {
        let span = &rows[start..end];

        let sql = extended_insert(table, columns, span);
        if sql.len() > budget && span.len() > 1 {
            let mid = start + span.len() / 2;
            pending.push((mid, end));
            pending.push((start, mid));
            continue;
        }

        match conn.query_drop(&sql).await {
            Ok(()) => written += span.len() as u64,
            Err(err) if is_packet_too_large(&err) && span.len() > 1 => {
                warn!(rows = span.len(), "statement exceeded max_allowed_packet, halving batch");
                let mid = start + span.len() / 2;
                pending.push((mid, end));
                pending.push((start, mid));
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(written)
}

/// Proactively split `rows` into spans whose estimated statement size
/// fits the budget, preserving row order.
fn plan_spans(rows: &[RowImage], budget: usize) -> Vec<(usize, usize)> {
    let mut stack = vec![(0usize, rows.len())];
    let mut spans = Vec::new();

    while let Some((start, end)) = stack.pop() {
        let span = &rows[start..end];
        if span.len() > 1 && estimate_statement_len(span) > budget {
            let mid = start + span.len() / 2;
            stack.push((mid, end));
            stack.push((start, mid));
        } else {
            spans.push((start, end));
        }
    }

    spans
}

fn estimate_statement_len(rows: &[RowImage]) -> usize {
    // per-row tuple plus the statement skeleton
    rows.iter().map(RowImage::size_bytes).sum::<usize>() + 512
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::Value;

    fn rows(count: usize, payload: usize) -> Vec<RowImage> {
        (0..count)
            .map(|i| RowImage(vec![Value::Int(i as i64), Value::String("x".repeat(payload))]))
            .collect()
    }

    #[test]
    fn small_batches_stay_whole() {
        let rows = rows(100, 10);
        assert_eq!(plan_spans(&rows, 1 << 20), vec![(0, 100)]);
    }

    #[test]
    fn oversized_batches_halve_until_they_fit() {
        let rows = rows(8, 1000);
        // budget fits roughly two rows per statement
        let spans = plan_spans(&rows, 2 * 1100 + 512);
        assert!(spans.len() >= 4, "expected several spans, got {spans:?}");
        // spans cover every row in order, with no overlap
        let mut expected_start = 0;
        for (start, end) in &spans {
            assert_eq!(*start, expected_start);
            assert!(end > start);
            expected_start = *end;
        }
        assert_eq!(expected_start, 8);
    }

    #[test]
    fn a_single_huge_row_is_never_split_further() {
        let rows = rows(1, 1 << 20);
        assert_eq!(plan_spans(&rows, 1024), vec![(0, 1)]);
    }

    #[test]
    fn estimate_tracks_row_content() {
        let small = rows(1, 4);
        let big = rows(8, 4096);
        assert!(estimate_statement_len(&big) > estimate_statement_len(&small));
    }
}
