use log::debug;

use super::labels::{LabelInfo, LabelView};
use super::matrix::{BaseValues, DataValue, MatrixView};
use super::model::DataModel;
use super::tree::TreeInfo;

/// Index map of one axis of a view. `None` entries are gaps.
pub type IndexOrder = Vec<Option<usize>>;

/// Convert an index list where negative entries mark gaps.
pub fn from_signed(indices: &[i64]) -> IndexOrder {
    indices
        .iter()
        .map(|&i| usize::try_from(i).ok())
        .collect()
}

/// Where position `i` of a view points in its parent.
enum Slot {
    Parent(usize),
    Gap,
    OutOfRange,
}

fn slot(order: Option<&[Option<usize>]>, i: usize) -> Slot {
    match order {
        None => Slot::Parent(i),
        Some(order) => match order.get(i) {
            Some(Some(p)) => Slot::Parent(*p),
            Some(None) => Slot::Gap,
            None => Slot::OutOfRange,
        },
    }
}

// ---------------------------------------------------------------------------
// ReorderedModel
// ---------------------------------------------------------------------------

/// Read-only projection of a [`DataModel`] through optional row and column
/// index maps. Nothing is copied; the view borrows its parent, so the parent
/// cannot change underneath it.
///
/// Gap entries read as [`DataValue::Empty`] and as absent label records.
/// Every mutating call is refused.
pub struct ReorderedModel<'a> {
    parent: &'a DataModel,
    rows: Option<IndexOrder>,
    cols: Option<IndexOrder>,
}

impl<'a> ReorderedModel<'a> {
    /// Identity view.
    pub fn new(parent: &'a DataModel) -> Self {
        Self {
            parent,
            rows: None,
            cols: None,
        }
    }

    pub fn with_row_order(mut self, rows: IndexOrder) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_col_order(mut self, cols: IndexOrder) -> Self {
        self.cols = Some(cols);
        self
    }

    pub fn parent(&self) -> &'a DataModel {
        self.parent
    }

    pub fn row_order(&self) -> Option<&[Option<usize>]> {
        self.rows.as_deref()
    }

    pub fn col_order(&self) -> Option<&[Option<usize>]> {
        self.cols.as_deref()
    }

    pub fn row_labels(&self) -> ReorderedLabels<'_> {
        ReorderedLabels {
            base: self.parent.row_labels(),
            order: self.rows.as_deref(),
        }
    }

    pub fn col_labels(&self) -> ReorderedLabels<'_> {
        ReorderedLabels {
            base: self.parent.col_labels(),
            order: self.cols.as_deref(),
        }
    }

    pub fn gtr(&self) -> Option<&'a TreeInfo> {
        self.parent.gtr()
    }

    pub fn atr(&self) -> Option<&'a TreeInfo> {
        self.parent.atr()
    }

    pub fn is_loaded(&self) -> bool {
        self.parent.is_loaded()
    }

    /// Statistics of the whole parent matrix.
    pub fn base_values(&self) -> Option<BaseValues> {
        self.parent.matrix().base_values()
    }

    pub fn num_unappended_col(&self) -> usize {
        match &self.cols {
            Some(order) => order.len(),
            None => self.parent.matrix().num_unappended_col(),
        }
    }

    // -- refused mutations --

    pub fn set_value(&self, _value: impl Into<DataValue>, col: usize, row: usize) -> bool {
        debug!("Refused write to ({col}, {row}) of a reordered view");
        false
    }

    pub fn append(&self, _other: &DataModel) -> bool {
        false
    }

    pub fn remove_appended(&self) -> bool {
        false
    }
}

impl MatrixView for ReorderedModel<'_> {
    fn num_row(&self) -> usize {
        self.rows
            .as_ref()
            .map_or_else(|| self.parent.n_rows(), Vec::len)
    }

    fn num_col(&self) -> usize {
        self.cols
            .as_ref()
            .map_or_else(|| self.parent.n_cols(), Vec::len)
    }

    fn value(&self, col: usize, row: usize) -> DataValue {
        match (slot(self.cols.as_deref(), col), slot(self.rows.as_deref(), row)) {
            (Slot::OutOfRange, _) | (_, Slot::OutOfRange) => DataValue::Missing,
            (Slot::Gap, _) | (_, Slot::Gap) => DataValue::Empty,
            (Slot::Parent(c), Slot::Parent(r)) => self.parent.value(c, r),
        }
    }
}

// ---------------------------------------------------------------------------
// ReorderedLabels
// ---------------------------------------------------------------------------

/// One axis of labels seen through a view's index map.
pub struct ReorderedLabels<'a> {
    base: &'a LabelInfo,
    order: Option<&'a [Option<usize>]>,
}

impl ReorderedLabels<'_> {
    pub fn add_label_type(&self, _label_type: &str, _index: usize) -> bool {
        false
    }

    pub fn set_label(&self, _record: usize, _label_type: &str, _value: &str) -> bool {
        false
    }

    pub fn reorder_labels(&self, _ordering: &[usize]) -> bool {
        false
    }
}

impl LabelView for ReorderedLabels<'_> {
    fn label_types(&self) -> &[String] {
        self.base.label_types()
    }

    fn num_labels(&self) -> usize {
        self.order.map_or_else(|| self.base.num_labels(), <[_]>::len)
    }

    fn labels(&self, record: usize) -> Option<&[String]> {
        match slot(self.order, record) {
            Slot::Parent(p) => self.base.labels(p),
            Slot::Gap | Slot::OutOfRange => None,
        }
    }

    fn index_of(&self, label_type: &str) -> Option<usize> {
        self.base.index_of(label_type)
    }

    /// Position in the view of the record with this ID.
    fn label_index(&self, id: &str) -> Option<usize> {
        let p = self.base.label_index(id)?;
        match self.order {
            None => Some(p),
            Some(order) => order.iter().position(|&o| o == Some(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::DataMatrix;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn parent() -> DataModel {
        let rows = LabelInfo::from_parts(
            strings(&["GID", "NAME"]),
            (0..4).map(|i| vec![format!("GENE{i}X"), format!("g{i}")]).collect(),
        );
        let cols = LabelInfo::from_parts(
            strings(&["AID"]),
            (0..3).map(|i| vec![format!("ARRY{i}X")]).collect(),
        );
        let matrix = DataMatrix::from_rows(
            (0..4)
                .map(|r| (0..3).map(|c| (r * 10 + c) as f64).collect())
                .collect(),
        );
        DataModel::from_stores(rows, cols, matrix)
    }

    #[test]
    fn reads_follow_the_index_map() {
        let parent = parent();
        let signed = [3, -1, 0, 2];
        let view = ReorderedModel::new(&parent).with_row_order(from_signed(&signed));

        assert_eq!(view.num_row(), 4);
        assert_eq!(view.num_col(), 3);
        for (i, &p) in signed.iter().enumerate() {
            for c in 0..3 {
                let expected = if p < 0 {
                    DataValue::Empty
                } else {
                    parent.value(c, p as usize)
                };
                assert_eq!(view.value(c, i), expected);
            }
        }
        assert_eq!(view.value(0, 4), DataValue::Missing);
    }

    #[test]
    fn columns_can_be_subset() {
        let parent = parent();
        let view = ReorderedModel::new(&parent).with_col_order(vec![Some(2), None]);
        assert_eq!(view.num_col(), 2);
        assert_eq!(view.value(0, 1), DataValue::Value(12.0));
        assert_eq!(view.value(1, 1), DataValue::Empty);
        assert_eq!(view.num_unappended_col(), 2);
        assert_eq!(view.col_labels().label(0, 0), Some("ARRY2X"));
        assert_eq!(view.col_labels().labels(1), None);
    }

    #[test]
    fn labels_and_ids_are_remapped() {
        let parent = parent();
        let view = ReorderedModel::new(&parent).with_row_order(vec![Some(1), None, Some(3)]);
        let rows = view.row_labels();
        assert_eq!(rows.num_labels(), 3);
        assert_eq!(rows.label_by_name(2, "NAME"), Some("g3"));
        assert_eq!(rows.label_index("GENE3X"), Some(2));
        assert_eq!(rows.label_index("GENE0X"), None);
    }

    #[test]
    fn mutations_are_refused() {
        let parent = parent();
        let view = ReorderedModel::new(&parent);
        assert!(!view.set_value(1.0, 0, 0));
        assert!(!view.append(&parent));
        assert!(!view.row_labels().set_label(0, "NAME", "x"));
        assert!(!view.col_labels().add_label_type("NEW", 0));
        assert!(!view.row_labels().reorder_labels(&[0, 1, 2, 3]));
        assert_eq!(parent.value(0, 0), DataValue::Value(0.0));
    }
}
