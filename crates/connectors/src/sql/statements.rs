//! Builders for every statement the engines emit against the target (and
//! the paged reads against the source). All table references are fully
//! qualified; row iteration is keyset-only, never OFFSET.

use crate::sql::encoder::encode_value;
use model::core::{table::TableRef, value::Value};
use model::events::RowImage;

fn quote_col(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_col(c))
        .collect::<Vec<_>>()
        .join(",")
}

fn row_tuple(row: &RowImage) -> String {
    let values = row
        .values()
        .iter()
        .map(encode_value)
        .collect::<Vec<_>>()
        .join(",");
    format!("({values})")
}

/// `INSERT INTO t (cols) VALUES (...),(...) ON DUPLICATE KEY UPDATE ...`
///
/// The ON DUPLICATE KEY clause makes replay after the pre-snapshot anchor
/// idempotent: a re-delivered insert degrades to an in-place update.
pub fn extended_insert(table: &TableRef, columns: &[String], rows: &[RowImage]) -> String {
    let tuples = rows.iter().map(row_tuple).collect::<Vec<_>>().join(",");
    let updates = columns
        .iter()
        .map(|c| {
            let q = quote_col(c);
            format!("{q}=VALUES({q})")
        })
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
        table.qualified(),
        column_list(columns),
        tuples,
        updates
    )
}

/// Single-row `UPDATE … WHERE pk = …`, keyed on the before image's PK.
pub fn update_by_pk(
    table: &TableRef,
    columns: &[String],
    pk_idx: &[usize],
    before: &RowImage,
    after: &RowImage,
) -> String {
    let assignments = columns
        .iter()
        .zip(after.values())
        .map(|(col, value)| format!("{}={}", quote_col(col), encode_value(value)))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "UPDATE {} SET {} WHERE {}",
        table.qualified(),
        assignments,
        pk_predicate(columns, pk_idx, before)
    )
}

/// `DELETE FROM t WHERE pk IN (…)` over the before images of a batch of
/// same-table deletes. Composite keys use row-value IN.
pub fn delete_in(
    table: &TableRef,
    columns: &[String],
    pk_idx: &[usize],
    before_rows: &[RowImage],
) -> String {
    let key_expr = if pk_idx.len() == 1 {
        quote_col(&columns[pk_idx[0]])
    } else {
        let cols = pk_idx
            .iter()
            .map(|i| quote_col(&columns[*i]))
            .collect::<Vec<_>>()
            .join(",");
        format!("({cols})")
    };

    let keys = before_rows
        .iter()
        .map(|row| {
            let vals = pk_idx
                .iter()
                .map(|i| encode_value(&row.values()[*i]))
                .collect::<Vec<_>>()
                .join(",");
            if pk_idx.len() == 1 {
                vals
            } else {
                format!("({vals})")
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        table.qualified(),
        key_expr,
        keys
    )
}

fn pk_predicate(columns: &[String], pk_idx: &[usize], row: &RowImage) -> String {
    pk_idx
        .iter()
        .map(|i| {
            format!(
                "{}={}",
                quote_col(&columns[*i]),
                encode_value(&row.values()[*i])
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// One page of a keyset scan over the full primary key.
///
/// First page has no predicate; later pages continue strictly after the
/// last seen key tuple. PK columns are NOT NULL in MySQL, so the row
/// comparison is total and agrees with the ORDER BY.
pub fn keyset_page(
    table: &TableRef,
    columns: &[String],
    pk_cols: &[String],
    last_key: Option<&[Value]>,
    limit: usize,
) -> String {
    let order = pk_cols
        .iter()
        .map(|c| quote_col(c))
        .collect::<Vec<_>>()
        .join(",");

    let predicate = match last_key {
        Some(key) => {
            let values = key.iter().map(encode_value).collect::<Vec<_>>().join(",");
            if pk_cols.len() == 1 {
                format!(" WHERE {} > {}", order, values)
            } else {
                format!(" WHERE ({}) > ({})", order, values)
            }
        }
        None => String::new(),
    };

    format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {}",
        column_list(columns),
        table.qualified(),
        predicate,
        order,
        limit
    )
}

/// One page of a disjoint PK range, for a parallel full-load worker.
///
/// The first page covers `start..=end`; later pages continue strictly
/// after the last seen key, still bounded by `end`. Keyset inside the
/// range, never OFFSET.
pub fn range_page(
    table: &TableRef,
    columns: &[String],
    pk_col: &str,
    start: i64,
    end: i64,
    last: Option<i64>,
    limit: usize,
) -> String {
    let col = quote_col(pk_col);
    let predicate = match last {
        Some(last) => format!("{col} > {last} AND {col} <= {end}"),
        None => format!("{col} BETWEEN {start} AND {end}"),
    };

    format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT {}",
        column_list(columns),
        table.qualified(),
        predicate,
        col,
        limit
    )
}

/// `(min(pk), max(pk))` for partitioning the parallel load.
pub fn min_max_pk(table: &TableRef, pk_col: &str) -> String {
    let col = quote_col(pk_col);
    format!(
        "SELECT MIN({}), MAX({}) FROM {}",
        col,
        col,
        table.qualified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef::new("tgt", "orders")
    }

    fn cols() -> Vec<String> {
        vec!["id".into(), "v".into()]
    }

    fn row(id: i64, v: &str) -> RowImage {
        RowImage(vec![Value::Int(id), Value::String(v.into())])
    }

    #[test]
    fn extended_insert_shape() {
        let sql = extended_insert(&table(), &cols(), &[row(1, "a"), row(2, "b")]);
        assert_eq!(
            sql,
            "INSERT INTO `tgt`.`orders` (`id`,`v`) VALUES (1,'a'),(2,'b') \
             ON DUPLICATE KEY UPDATE `id`=VALUES(`id`),`v`=VALUES(`v`)"
        );
    }

    #[test]
    fn update_keys_on_before_image() {
        let sql = update_by_pk(&table(), &cols(), &[0], &row(7, "old"), &row(7, "new"));
        assert_eq!(
            sql,
            "UPDATE `tgt`.`orders` SET `id`=7,`v`='new' WHERE `id`=7"
        );
    }

    #[test]
    fn delete_single_pk_uses_plain_in() {
        let sql = delete_in(&table(), &cols(), &[0], &[row(1, "a"), row(2, "b")]);
        assert_eq!(sql, "DELETE FROM `tgt`.`orders` WHERE `id` IN (1,2)");
    }

    #[test]
    fn delete_composite_pk_uses_row_value_in() {
        let columns: Vec<String> = vec!["a".into(), "b".into(), "v".into()];
        let rows = vec![
            RowImage(vec![Value::Int(1), Value::Int(1), Value::Null]),
            RowImage(vec![Value::Int(1), Value::Int(2), Value::Null]),
        ];
        let sql = delete_in(&table(), &columns, &[0, 1], &rows);
        assert_eq!(
            sql,
            "DELETE FROM `tgt`.`orders` WHERE (`a`,`b`) IN ((1,1),(1,2))"
        );
    }

    #[test]
    fn keyset_first_page_has_no_predicate() {
        let sql = keyset_page(&table(), &cols(), &["id".into()], None, 500);
        assert_eq!(
            sql,
            "SELECT `id`,`v` FROM `tgt`.`orders` ORDER BY `id` LIMIT 500"
        );
    }

    #[test]
    fn keyset_later_pages_continue_after_last_key() {
        let columns: Vec<String> = vec!["a".into(), "b".into(), "v".into()];
        let pk: Vec<String> = vec!["a".into(), "b".into()];
        let last = [Value::Int(1), Value::Int(2)];
        let sql = keyset_page(&table(), &columns, &pk, Some(&last), 1);
        assert_eq!(
            sql,
            "SELECT `a`,`b`,`v` FROM `tgt`.`orders` WHERE (`a`,`b`) > (1,2) \
             ORDER BY `a`,`b` LIMIT 1"
        );
    }

    #[test]
    fn no_statement_ever_uses_offset() {
        let columns = cols();
        let pk: Vec<String> = vec!["id".into()];
        let statements = [
            keyset_page(&table(), &columns, &pk, None, 10),
            keyset_page(&table(), &columns, &pk, Some(&[Value::Int(5)]), 10),
            range_page(&table(), &columns, "id", 1, 100, None, 10),
            range_page(&table(), &columns, "id", 1, 100, Some(50), 10),
            min_max_pk(&table(), "id"),
        ];
        for sql in statements {
            assert!(!sql.to_uppercase().contains("OFFSET"), "found OFFSET in {sql}");
        }
    }

    #[test]
    fn range_first_page_is_inclusive_on_both_ends() {
        let sql = range_page(&table(), &cols(), "id", 1, 5000, None, 2000);
        assert_eq!(
            sql,
            "SELECT `id`,`v` FROM `tgt`.`orders` WHERE `id` BETWEEN 1 AND 5000 \
             ORDER BY `id` LIMIT 2000"
        );
    }

    #[test]
    fn range_later_pages_exclude_the_last_seen_key() {
        let sql = range_page(&table(), &cols(), "id", 1, 5000, Some(2000), 2000);
        assert_eq!(
            sql,
            "SELECT `id`,`v` FROM `tgt`.`orders` WHERE `id` > 2000 AND `id` <= 5000 \
             ORDER BY `id` LIMIT 2000"
        );
    }
}
