use std::fmt::Write as _;

use log::{debug, info};

use super::fileset::FileSet;
use super::labels::{is_permutation, LabelInfo, LabelView, ReservedNames};
use super::loader::{CancelToken, LoadJob, LoadOutcome, ProgressSink};
use super::matrix::{DataMatrix, DataValue, MatrixView};
use super::settings::LoadSettings;
use super::tree::TreeInfo;
use crate::error::{LoadError, ModelError};

/// Label written into the separator column when two datasets are shown side
/// by side.
const APPEND_SEPARATOR_LABEL: &str = "-----------------------";

// ---------------------------------------------------------------------------
// ModelParts – the stores a load produces
// ---------------------------------------------------------------------------

/// Everything a [`DataModel`] holds, built off to the side and installed in
/// one step.
#[derive(Debug, Default)]
pub struct ModelParts {
    pub row_labels: LabelInfo,
    pub col_labels: LabelInfo,
    pub gtr: Option<TreeInfo>,
    pub atr: Option<TreeInfo>,
    pub matrix: DataMatrix,
    pub gid_found: bool,
    pub aid_found: bool,
    pub gweight_found: bool,
    pub eweight_found: bool,
}

// ---------------------------------------------------------------------------
// DataModel – the aggregate
// ---------------------------------------------------------------------------

/// One loaded dataset: row and column labels, the optional row (GTR) and
/// column (ATR) trees, and the numeric matrix.
///
/// A model starts empty, is filled as a whole by a successful load and is
/// edited in place afterwards. A failed or cancelled load leaves it reset.
#[derive(Debug)]
pub struct DataModel {
    source: Option<FileSet>,
    row_labels: LabelInfo,
    col_labels: LabelInfo,
    gtr: Option<TreeInfo>,
    atr: Option<TreeInfo>,
    matrix: DataMatrix,
    gid_found: bool,
    aid_found: bool,
    gweight_found: bool,
    eweight_found: bool,
    loaded: bool,
}

impl Default for DataModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DataModel {
    pub fn new() -> Self {
        Self {
            source: None,
            row_labels: LabelInfo::for_rows(),
            col_labels: LabelInfo::new(),
            gtr: None,
            atr: None,
            matrix: DataMatrix::default(),
            gid_found: false,
            aid_found: false,
            gweight_found: false,
            eweight_found: false,
            loaded: false,
        }
    }

    /// A loaded model built in memory, without trees. `GID` / `AID` indices
    /// are hashed when those label types are present.
    pub fn from_stores(row_labels: LabelInfo, col_labels: LabelInfo, matrix: DataMatrix) -> Self {
        let mut row_labels = row_labels.with_reserved(ReservedNames::RowLabels);
        let mut col_labels = col_labels;
        if row_labels.label_types().iter().any(|t| t.eq_ignore_ascii_case("GID")) {
            row_labels.hash_ids("GID");
        }
        if col_labels.label_types().iter().any(|t| t.eq_ignore_ascii_case("AID")) {
            col_labels.hash_ids("AID");
        }
        let mut model = Self::new();
        model.install(
            None,
            ModelParts {
                row_labels,
                col_labels,
                matrix,
                ..ModelParts::default()
            },
        );
        model
    }

    // -- loading --

    /// Load `file_set` into this model, replacing whatever it held.
    ///
    /// The model is reset first and stays reset if the load fails or is
    /// cancelled. On success the returned settings carry the detected data
    /// start and label types, ready to be stored for the next load.
    pub fn load_new(
        &mut self,
        file_set: FileSet,
        settings: LoadSettings,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<LoadSettings, LoadError> {
        self.reset_state();
        let outcome = LoadJob::new(file_set, settings).run(progress, cancel)?;
        Ok(self.install_outcome(outcome))
    }

    /// Install the result of a load that ran elsewhere, e.g. on a
    /// background thread.
    pub fn install_outcome(&mut self, outcome: LoadOutcome) -> LoadSettings {
        self.install(Some(outcome.file_set), outcome.parts);
        outcome.settings
    }

    fn install(&mut self, source: Option<FileSet>, mut parts: ModelParts) {
        parts.row_labels.adopt_listeners(&mut self.row_labels);
        parts.col_labels.adopt_listeners(&mut self.col_labels);
        self.row_labels = parts.row_labels;
        self.col_labels = parts.col_labels;
        self.gtr = parts.gtr;
        self.atr = parts.atr;
        self.matrix = parts.matrix;
        self.gid_found = parts.gid_found;
        self.aid_found = parts.aid_found;
        self.gweight_found = parts.gweight_found;
        self.eweight_found = parts.eweight_found;
        self.loaded = true;
        if let Some(source) = &source {
            info!(
                "Loaded {source}: {} rows x {} columns",
                self.n_rows(),
                self.n_cols()
            );
        }
        self.source = source;
    }

    /// Clear every store and forget the source file.
    pub fn reset_state(&mut self) {
        self.source = None;
        self.row_labels.clear();
        self.col_labels.clear();
        self.gtr = None;
        self.atr = None;
        self.matrix.clear();
        self.gid_found = false;
        self.aid_found = false;
        self.gweight_found = false;
        self.eweight_found = false;
        self.loaded = false;
    }

    // -- accessors --

    pub fn source(&self) -> Option<&FileSet> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: FileSet) {
        self.source = Some(source);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn row_labels(&self) -> &LabelInfo {
        &self.row_labels
    }

    pub fn row_labels_mut(&mut self) -> &mut LabelInfo {
        &mut self.row_labels
    }

    pub fn col_labels(&self) -> &LabelInfo {
        &self.col_labels
    }

    pub fn col_labels_mut(&mut self) -> &mut LabelInfo {
        &mut self.col_labels
    }

    pub fn gtr(&self) -> Option<&TreeInfo> {
        self.gtr.as_ref()
    }

    pub fn gtr_mut(&mut self) -> Option<&mut TreeInfo> {
        self.gtr.as_mut()
    }

    /// Attach or drop the row tree; the tree-found flag follows.
    pub fn set_gtr(&mut self, gtr: Option<TreeInfo>) {
        self.gid_found = gtr.is_some();
        self.gtr = gtr;
    }

    pub fn atr(&self) -> Option<&TreeInfo> {
        self.atr.as_ref()
    }

    pub fn atr_mut(&mut self) -> Option<&mut TreeInfo> {
        self.atr.as_mut()
    }

    pub fn set_atr(&mut self, atr: Option<TreeInfo>) {
        self.aid_found = atr.is_some();
        self.atr = atr;
    }

    pub fn matrix(&self) -> &DataMatrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut DataMatrix {
        &mut self.matrix
    }

    pub fn gid_found(&self) -> bool {
        self.gid_found
    }

    pub fn aid_found(&self) -> bool {
        self.aid_found
    }

    pub fn gweight_found(&self) -> bool {
        self.gweight_found
    }

    pub fn eweight_found(&self) -> bool {
        self.eweight_found
    }

    pub fn n_rows(&self) -> usize {
        self.matrix.num_row()
    }

    pub fn n_cols(&self) -> usize {
        self.matrix.num_col()
    }

    /// Value at column `x`, row `y`; `Missing` outside the matrix.
    pub fn value(&self, x: usize, y: usize) -> DataValue {
        self.matrix.value(x, y)
    }

    /// True if any store has unsaved changes.
    pub fn is_modified(&self) -> bool {
        self.matrix.is_modified()
            || self.row_labels.is_modified()
            || self.col_labels.is_modified()
            || self.gtr.as_ref().is_some_and(|t| t.labels().is_modified())
            || self.atr.as_ref().is_some_and(|t| t.labels().is_modified())
    }

    // -- reordering --

    /// Put row `ordering[i]` at position `i` in both the labels and the
    /// matrix. False, and nothing changed, unless `ordering` is a
    /// permutation of all rows.
    pub fn reorder_rows(&mut self, ordering: &[usize]) -> bool {
        if !is_permutation(ordering, self.n_rows())
            || self.row_labels.num_labels() != self.n_rows()
        {
            return false;
        }
        self.row_labels.reorder_labels(ordering);
        self.matrix.permute_rows(ordering);
        self.row_labels.hash_ids("GID");
        debug!("Reordered {} rows", ordering.len());
        true
    }

    /// Put column `ordering[i]` at position `i`. The ordering covers the
    /// unappended columns; appended columns keep their place.
    pub fn reorder_columns(&mut self, ordering: &[usize]) -> bool {
        let own = self.matrix.num_unappended_col();
        if !is_permutation(ordering, own) || self.col_labels.num_labels() != self.n_cols() {
            return false;
        }
        let full: Vec<usize> = ordering.iter().copied().chain(own..self.n_cols()).collect();
        self.col_labels.reorder_labels(&full);
        self.matrix.permute_cols(ordering);
        self.col_labels.hash_ids("AID");
        debug!("Reordered {} columns", ordering.len());
        true
    }

    // -- comparison --

    /// Show `other` to the right of this dataset, after a separator column.
    /// Column labels of `other` are matched to this model's label types by
    /// name.
    pub fn append(&mut self, other: &DataModel) -> Result<(), ModelError> {
        self.matrix.append(&other.matrix)?;
        let types = self.col_labels.label_types().to_vec();
        let separator = vec![APPEND_SEPARATOR_LABEL.to_string(); types.len()];
        let appended = (0..other.col_labels.num_labels()).map(|j| {
            types
                .iter()
                .map(|t| other.col_labels.label_by_name(j, t).unwrap_or("").to_string())
                .collect::<Vec<_>>()
        });
        self.col_labels
            .append_records(std::iter::once(separator).chain(appended));
        Ok(())
    }

    /// Undo [`append`](Self::append). False if nothing was appended.
    pub fn remove_appended(&mut self) -> bool {
        if !self.matrix.remove_appended() {
            return false;
        }
        self.col_labels.truncate(self.n_cols());
        true
    }

    /// Multi-line description of the model, for logs and the CLI.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let source = self
            .source
            .as_ref()
            .map_or_else(|| "(in memory)".to_string(), ToString::to_string);
        let _ = writeln!(out, "Source: {source}");
        let _ = writeln!(out, "Rows: {}  Columns: {}", self.n_rows(), self.n_cols());
        if let Some(at) = self.matrix.append_index() {
            let _ = writeln!(out, "Appended columns start after column {at}");
        }
        let _ = writeln!(out, "Row label types: {}", self.row_labels.label_types().join(", "));
        let _ = writeln!(
            out,
            "Column label types: {}",
            self.col_labels.label_types().join(", ")
        );
        let _ = writeln!(
            out,
            "gid = {}  aid = {}  gweight = {}  eweight = {}",
            self.gid_found, self.aid_found, self.gweight_found, self.eweight_found
        );
        let nodes = |t: Option<&TreeInfo>| t.map_or(0, TreeInfo::num_nodes);
        let _ = writeln!(
            out,
            "Row tree nodes: {}  Column tree nodes: {}",
            nodes(self.gtr()),
            nodes(self.atr())
        );
        match self.matrix.base_values() {
            Some(b) => {
                let _ = writeln!(
                    out,
                    "min = {}  max = {}  mean = {}  median = {}  ({} cells skipped)",
                    b.min, b.max, b.mean, b.median, b.skipped
                );
            }
            None => {
                let _ = writeln!(out, "No statistics (no finite values, or not computed)");
            }
        }
        out
    }
}
