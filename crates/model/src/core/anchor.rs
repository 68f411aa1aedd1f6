use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A position in the source's binary log.
///
/// Both fields are meaningful only together. Anchors order by
/// `(file, pos)`: MySQL rotates binlog files with lexicographically
/// increasing names, so plain string comparison on the file is correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogAnchor {
    pub file: String,
    pub pos: u64,
}

impl BinlogAnchor {
    pub fn new(file: impl Into<String>, pos: u64) -> Self {
        Self {
            file: file.into(),
            pos,
        }
    }
}

impl PartialOrd for BinlogAnchor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinlogAnchor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then_with(|| self.pos.cmp(&other.pos))
    }
}

impl fmt::Display for BinlogAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_within_a_file_by_position() {
        let a = BinlogAnchor::new("mysql-bin.000003", 100);
        let b = BinlogAnchor::new("mysql-bin.000003", 4096);
        assert!(a < b);
    }

    #[test]
    fn orders_across_rotated_files_lexicographically() {
        let a = BinlogAnchor::new("mysql-bin.000009", 999_999);
        let b = BinlogAnchor::new("mysql-bin.000010", 4);
        assert!(a < b);
    }

    #[test]
    fn displays_as_file_colon_pos() {
        let a = BinlogAnchor::new("mysql-bin.000001", 154);
        assert_eq!(a.to_string(), "mysql-bin.000001:154");
    }
}
