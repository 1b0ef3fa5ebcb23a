use std::io;
use std::path::Path;

use log::debug;

use super::labels::{LabelInfo, LabelView};
use super::tokenizer::{Cell, FlatFileTokenizer};

/// Column names of a classic tree file.
pub const TREE_LABEL_TYPES: [&str; 4] = ["NODEID", "LEFT", "RIGHT", "CORRELATION"];

/// One merge of the tree: `left` and `right` are record IDs or other node IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: String,
    pub left: String,
    pub right: String,
    /// `None` if the correlation column is absent or not a number.
    pub correlation: Option<f64>,
}

// ---------------------------------------------------------------------------
// TreeInfo
// ---------------------------------------------------------------------------

/// Linkage data from a GTR or ATR file, kept as a label table with one
/// record per merge node. The structure of the tree is not validated.
#[derive(Debug, Default)]
pub struct TreeInfo {
    labels: LabelInfo,
}

impl TreeInfo {
    /// Build from the rows of a tree file. `None` for an empty file.
    ///
    /// A four-column file whose first cell is not `NODEID` has no header and
    /// every row is a node. Anything else carries its label types in the
    /// first row.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
        let first = rows.first()?;
        let headerless =
            first.len() == TREE_LABEL_TYPES.len() && !first[0].eq_ignore_ascii_case("NODEID");

        let label_types = if headerless {
            TREE_LABEL_TYPES.iter().map(|s| s.to_string()).collect()
        } else {
            rows.remove(0)
        };
        let mut labels = LabelInfo::from_parts(label_types, rows);
        labels.hash_ids("NODEID");
        Some(Self { labels })
    }

    /// Parse a tab-delimited tree file. `Ok(None)` if it holds no rows.
    pub fn read(path: &Path) -> io::Result<Option<Self>> {
        let rows = FlatFileTokenizer::open(path, b'\t', false)?
            .map(|row| row.map(|cells| cells.into_iter().map(Cell::into_string).collect()))
            .collect::<io::Result<Vec<Vec<String>>>>()?;
        debug!("Read {} tree rows from {}", rows.len(), path.display());
        Ok(Self::from_rows(rows))
    }

    pub fn labels(&self) -> &LabelInfo {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut LabelInfo {
        &mut self.labels
    }

    pub fn num_nodes(&self) -> usize {
        self.labels.num_labels()
    }

    /// Rebuild the `NODEID` index after structural edits.
    pub fn hash_ids(&mut self) {
        self.labels.hash_ids("NODEID");
    }

    pub fn node(&self, index: usize) -> Option<TreeNode> {
        let field = |name: &str| self.labels.label_by_name(index, name).unwrap_or("");
        self.labels.labels(index)?;
        Some(TreeNode {
            id: field("NODEID").to_string(),
            left: field("LEFT").to_string(),
            right: field("RIGHT").to_string(),
            correlation: field("CORRELATION").trim().parse().ok(),
        })
    }

    pub fn node_by_id(&self, id: &str) -> Option<TreeNode> {
        self.node(self.labels.label_index(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn headerless_four_columns_keep_first_row() {
        let tree = TreeInfo::from_rows(vec![
            row(&["ABC", "x", "y", "0.9"]),
            row(&["NODE2X", "ABC", "z", "0.5"]),
        ])
        .unwrap();
        assert_eq!(tree.labels().label_types(), &row(&TREE_LABEL_TYPES)[..]);
        assert_eq!(tree.num_nodes(), 2);
        assert_eq!(tree.labels().label(0, 0), Some("ABC"));

        let node = tree.node_by_id("NODE2X").unwrap();
        assert_eq!(node.left, "ABC");
        assert_eq!(node.correlation, Some(0.5));
    }

    #[test]
    fn nodeid_header_is_dropped() {
        let tree = TreeInfo::from_rows(vec![
            row(&["NODEID", "LEFT", "RIGHT", "CORRELATION"]),
            row(&["NODE1X", "GENE0X", "GENE1X", "0.97"]),
        ])
        .unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.labels().label(0, 0), Some("NODE1X"));
    }

    #[test]
    fn extended_files_name_their_own_columns() {
        let tree = TreeInfo::from_rows(vec![
            row(&["NODEID", "LEFT", "RIGHT", "CORRELATION", "NODECOLOR"]),
            row(&["NODE1X", "GENE0X", "GENE1X", "oops", "#ff0000"]),
        ])
        .unwrap();
        assert_eq!(tree.labels().num_label_types(), 5);
        assert_eq!(tree.node(0).unwrap().correlation, None);
        assert_eq!(tree.labels().label_by_name(0, "NODECOLOR"), Some("#ff0000"));
    }

    #[test]
    fn empty_file_is_no_tree() {
        assert!(TreeInfo::from_rows(Vec::new()).is_none());
    }
}
