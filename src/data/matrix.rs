use std::fmt;

use log::debug;

use crate::error::ModelError;

// ---------------------------------------------------------------------------
// DataValue – one numeric cell
// ---------------------------------------------------------------------------

/// A cell of the numeric block.
///
/// Internally the matrix stores plain `f64`s with `NaN` for [`Missing`] and
/// infinity for [`Empty`]; this type is what crosses the API.
///
/// [`Missing`]: DataValue::Missing
/// [`Empty`]: DataValue::Empty
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataValue {
    Value(f64),
    /// Unparseable or explicitly missing in the source file.
    Missing,
    /// Structurally absent: padding, separators and view gaps.
    Empty,
}

impl DataValue {
    pub const MISSING_RAW: f64 = f64::NAN;
    pub const EMPTY_RAW: f64 = f64::INFINITY;

    pub fn from_raw(raw: f64) -> Self {
        if raw.is_nan() {
            DataValue::Missing
        } else if raw.is_infinite() {
            DataValue::Empty
        } else {
            DataValue::Value(raw)
        }
    }

    pub fn to_raw(self) -> f64 {
        match self {
            DataValue::Value(v) => v,
            DataValue::Missing => Self::MISSING_RAW,
            DataValue::Empty => Self::EMPTY_RAW,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            DataValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, DataValue::Missing)
    }

    pub fn is_empty(self) -> bool {
        matches!(self, DataValue::Empty)
    }
}

impl From<f64> for DataValue {
    fn from(raw: f64) -> Self {
        DataValue::from_raw(raw)
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Value(v) => write!(f, "{v}"),
            DataValue::Missing | DataValue::Empty => Ok(()),
        }
    }
}

/// Round to four decimal places, the precision shown for derived statistics.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// MatrixView – read access shared by the store and reordered views
// ---------------------------------------------------------------------------

pub trait MatrixView {
    fn num_row(&self) -> usize;

    fn num_col(&self) -> usize;

    /// Value at (`col`, `row`); out-of-range reads give [`DataValue::Missing`].
    fn value(&self, col: usize, row: usize) -> DataValue;
}

// ---------------------------------------------------------------------------
// BaseValues – cached aggregate statistics
// ---------------------------------------------------------------------------

/// Summary statistics over the finite cells of a matrix. Mean and median
/// are rounded to four decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseValues {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Missing and empty cells left out of the statistics.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// DataMatrix
// ---------------------------------------------------------------------------

/// Dense row-major numeric block.
///
/// Reads are permissive, writes are strict. Statistics are cached and
/// dropped by every mutation; call [`calculate_base_values`] to refresh them.
///
/// [`calculate_base_values`]: DataMatrix::calculate_base_values
#[derive(Debug, Clone, Default)]
pub struct DataMatrix {
    data: Vec<f64>,
    num_rows: usize,
    num_cols: usize,
    append_index: Option<usize>,
    modified: bool,
    base: Option<BaseValues>,
}

impl DataMatrix {
    /// A `rows` x `cols` matrix of missing values.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![DataValue::MISSING_RAW; rows * cols],
            num_rows: rows,
            num_cols: cols,
            ..Self::default()
        }
    }

    /// Wrap an existing row-major buffer. `None` if the length does not match.
    pub fn from_flat(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        if rows.checked_mul(cols)? != data.len() {
            return None;
        }
        Some(Self {
            data,
            num_rows: rows,
            num_cols: cols,
            ..Self::default()
        })
    }

    /// Build from rows of raw values; short rows are padded with missing
    /// values up to the widest row.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let num_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let num_rows = rows.len();
        let mut data = Vec::with_capacity(num_rows * num_cols);
        for mut row in rows {
            row.resize(num_cols, DataValue::MISSING_RAW);
            data.extend(row);
        }
        Self {
            data,
            num_rows,
            num_cols,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    fn offset(&self, col: usize, row: usize) -> Option<usize> {
        (col < self.num_cols && row < self.num_rows).then(|| row * self.num_cols + col)
    }

    pub fn raw_value(&self, col: usize, row: usize) -> f64 {
        self.offset(col, row)
            .map_or(DataValue::MISSING_RAW, |i| self.data[i])
    }

    /// One row of raw values.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.num_rows).then(|| &self.data[row * self.num_cols..(row + 1) * self.num_cols])
    }

    pub fn set_value(
        &mut self,
        value: impl Into<DataValue>,
        col: usize,
        row: usize,
    ) -> Result<(), ModelError> {
        let i = self.offset(col, row).ok_or(ModelError::OutOfBounds {
            col,
            row,
            cols: self.num_cols,
            rows: self.num_rows,
        })?;
        self.data[i] = value.into().to_raw();
        self.modified = true;
        self.base = None;
        Ok(())
    }

    /// Replace every (near) zero with the missing value.
    pub fn set_zeroes_to_missing(&mut self) {
        let mut changed = false;
        for v in &mut self.data {
            if v.abs() < f64::EPSILON {
                *v = DataValue::MISSING_RAW;
                changed = true;
            }
        }
        if changed {
            self.modified = true;
            self.base = None;
        }
    }

    // -- permutations, used by the model's reorder operations --

    pub(crate) fn permute_rows(&mut self, ordering: &[usize]) {
        let cols = self.num_cols;
        let mut permuted = Vec::with_capacity(self.data.len());
        for &from in ordering {
            permuted.extend_from_slice(&self.data[from * cols..(from + 1) * cols]);
        }
        self.data = permuted;
        self.modified = true;
        self.base = None;
    }

    /// Permute the first `ordering.len()` columns of every row.
    pub(crate) fn permute_cols(&mut self, ordering: &[usize]) {
        let cols = self.num_cols;
        let mut scratch = vec![0.0; ordering.len()];
        for row in self.data.chunks_mut(cols.max(1)) {
            for (dst, &from) in scratch.iter_mut().zip(ordering) {
                *dst = row[from];
            }
            row[..ordering.len()].copy_from_slice(&scratch);
        }
        self.modified = true;
        self.base = None;
    }

    // -- append region --

    /// Concatenate `other` to the right, after one empty separator column.
    pub fn append(&mut self, other: &DataMatrix) -> Result<(), ModelError> {
        if self.append_index.is_some() {
            return Err(ModelError::AlreadyAppended);
        }
        if other.num_rows != self.num_rows {
            return Err(ModelError::RowCountMismatch {
                expected: self.num_rows,
                found: other.num_rows,
            });
        }
        let new_cols = self.num_cols + 1 + other.num_cols;
        let mut data = Vec::with_capacity(self.num_rows * new_cols);
        for r in 0..self.num_rows {
            data.extend_from_slice(&self.data[r * self.num_cols..(r + 1) * self.num_cols]);
            data.push(DataValue::EMPTY_RAW);
            data.extend_from_slice(&other.data[r * other.num_cols..(r + 1) * other.num_cols]);
        }
        self.append_index = Some(self.num_cols);
        self.num_cols = new_cols;
        self.data = data;
        self.base = None;
        Ok(())
    }

    /// Drop the appended columns. Returns false if nothing was appended.
    pub fn remove_appended(&mut self) -> bool {
        let Some(keep) = self.append_index.take() else {
            return false;
        };
        let mut data = Vec::with_capacity(self.num_rows * keep);
        for r in 0..self.num_rows {
            data.extend_from_slice(&self.data[r * self.num_cols..r * self.num_cols + keep]);
        }
        self.num_cols = keep;
        self.data = data;
        self.base = None;
        true
    }

    pub fn append_index(&self) -> Option<usize> {
        self.append_index
    }

    pub fn num_unappended_col(&self) -> usize {
        self.append_index.unwrap_or(self.num_cols)
    }

    /// Appending only ever adds columns, so this is the full row count.
    pub fn num_unappended_row(&self) -> usize {
        self.num_rows
    }

    // -- statistics --

    pub fn base_values(&self) -> Option<BaseValues> {
        self.base
    }

    /// Recompute min, max, mean and median over all finite cells. `None`
    /// (and nothing cached) when the matrix holds no finite value.
    pub fn calculate_base_values(&mut self) -> Option<BaseValues> {
        let mut finite: Vec<f64> = self.data.iter().copied().filter(|v| v.is_finite()).collect();
        let skipped = self.data.len() - finite.len();
        if finite.is_empty() {
            debug!("No finite values, base values left unset");
            self.base = None;
            return None;
        }

        let (min, max, sum) = finite.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        let mean = round4(sum / finite.len() as f64);

        finite.sort_unstable_by(f64::total_cmp);
        let mid = finite.len() / 2;
        let median = if finite.len() % 2 == 0 {
            (finite[mid - 1] + finite[mid]) / 2.0
        } else {
            finite[mid]
        };

        let base = BaseValues {
            min,
            max,
            mean,
            median: round4(median),
            skipped,
        };
        debug!("Base values: {base:?}");
        self.base = Some(base);
        self.base
    }

    /// Rounded mean of the finite cells in the inclusive block
    /// `[start_row, end_row] x [start_col, end_col]`. `None` for a block that
    /// is out of range or holds no finite value.
    pub fn zoomed_mean(
        &self,
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Option<f64> {
        if start_row > end_row
            || start_col > end_col
            || end_row >= self.num_rows
            || end_col >= self.num_cols
        {
            debug!("Rejected mean over rows {start_row}..={end_row}, cols {start_col}..={end_col}");
            return None;
        }
        let values = (start_row..=end_row).flat_map(|r| {
            let row = &self.data[r * self.num_cols..(r + 1) * self.num_cols];
            row[start_col..=end_col].iter().copied()
        });
        finite_mean(values)
    }

    /// Rounded mean over whole rows `from_row..=to_row`.
    pub fn row_average(&self, from_row: usize, to_row: usize) -> Option<f64> {
        if self.num_cols == 0 {
            return None;
        }
        self.zoomed_mean(from_row, to_row, 0, self.num_cols - 1)
    }

    /// Rounded mean over whole columns `from_col..=to_col`.
    pub fn col_average(&self, from_col: usize, to_col: usize) -> Option<f64> {
        if self.num_rows == 0 {
            return None;
        }
        self.zoomed_mean(0, self.num_rows - 1, from_col, to_col)
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| round4(sum / count as f64))
}

impl MatrixView for DataMatrix {
    fn num_row(&self) -> usize {
        self.num_rows
    }

    fn num_col(&self) -> usize {
        self.num_cols
    }

    fn value(&self, col: usize, row: usize) -> DataValue {
        DataValue::from_raw(self.raw_value(col, row))
    }
}
