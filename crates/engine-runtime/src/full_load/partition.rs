use model::events::FullLoadRange;

/// Split the inclusive PK span `[min, max]` into at most `workers`
/// contiguous, disjoint, inclusive ranges that cover it exactly.
pub fn partition(min: i64, max: i64, workers: usize) -> Vec<(i64, i64)> {
    if max < min || workers == 0 {
        return Vec::new();
    }

    let total = (max as i128) - (min as i128) + 1;
    let chunks = (workers as i128).min(total);
    let base = total / chunks;
    let remainder = total % chunks;

    let mut ranges = Vec::with_capacity(chunks as usize);
    let mut start = min as i128;
    for i in 0..chunks {
        let len = base + i128::from(i < remainder);
        let end = start + len - 1;
        ranges.push((start as i64, end as i64));
        start = end + 1;
    }
    ranges
}

/// Drop the ranges a previous run already finished. A ledger row covers
/// a planned range when it starts at the same PK and reaches at least as
/// far; partial overlap is re-copied (idempotent writes make that safe).
pub fn pending_ranges(planned: &[(i64, i64)], done: &[FullLoadRange]) -> Vec<(i64, i64)> {
    planned
        .iter()
        .copied()
        .filter(|(start, end)| {
            !done
                .iter()
                .any(|range| range.start == *start && range.end >= *end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(ranges: &[(i64, i64)]) -> Vec<FullLoadRange> {
        ranges
            .iter()
            .map(|(start, end)| FullLoadRange {
                table_key: "db.t".into(),
                start: *start,
                end: *end,
            })
            .collect()
    }

    #[test]
    fn covers_the_span_exactly_with_no_gaps() {
        let ranges = partition(1, 100_000, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges.first().unwrap().0, 1);
        assert_eq!(ranges.last().unwrap().1, 100_000);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }

    #[test]
    fn uneven_spans_distribute_the_remainder() {
        let ranges = partition(1, 10, 3);
        assert_eq!(ranges, vec![(1, 4), (5, 7), (8, 10)]);
    }

    #[test]
    fn fewer_rows_than_workers_yields_single_key_ranges() {
        let ranges = partition(5, 7, 8);
        assert_eq!(ranges, vec![(5, 5), (6, 6), (7, 7)]);
    }

    #[test]
    fn empty_span_yields_no_ranges() {
        assert!(partition(10, 9, 4).is_empty());
    }

    #[test]
    fn negative_keys_partition_correctly() {
        let ranges = partition(-10, 9, 2);
        assert_eq!(ranges, vec![(-10, -1), (0, 9)]);
    }

    #[test]
    fn resume_skips_completed_ranges() {
        let planned = partition(1, 100, 4);
        let finished = done(&[(1, 25), (51, 75)]);
        assert_eq!(
            pending_ranges(&planned, &finished),
            vec![(26, 50), (76, 100)]
        );
    }

    #[test]
    fn shorter_ledger_entry_does_not_satisfy_a_planned_range() {
        let planned = vec![(1, 50)];
        let finished = done(&[(1, 25)]);
        assert_eq!(pending_ranges(&planned, &finished), vec![(1, 50)]);
    }
}
