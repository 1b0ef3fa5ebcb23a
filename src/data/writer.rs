use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use log::{debug, info, warn};

use super::fileset::FileSet;
use super::labels::{LabelInfo, LabelView};
use super::matrix::MatrixView;
use super::model::DataModel;
use super::tree::TreeInfo;
use crate::error::WriteError;

const SPOOL_SUFFIX: &str = ".spool";

/// The three outputs of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Cdt,
    Gtr,
    Atr,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Cdt => "CDT",
            FileKind::Gtr => "GTR",
            FileKind::Atr => "ATR",
        })
    }
}

/// What a save did. Outputs not listed in either vector were skipped.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<(FileKind, PathBuf)>,
    pub failed: Vec<(FileKind, WriteError)>,
}

impl WriteReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn wrote(&self, kind: FileKind) -> bool {
        self.written.iter().any(|(k, _)| *k == kind)
    }

    /// The first failure, if any.
    pub fn into_result(self) -> Result<Vec<(FileKind, PathBuf)>, WriteError> {
        match self.failed.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(self.written),
        }
    }
}

// ---------------------------------------------------------------------------
// ModelWriter
// ---------------------------------------------------------------------------

/// Saves a [`DataModel`] as a CDT file plus GTR/ATR tree files.
///
/// Each output goes to `<file>.spool` first and is renamed over the
/// destination once complete. A failed output leaves its spool file behind
/// and keeps its modified flags, so the next save retries it.
#[derive(Debug, Clone)]
pub struct ModelWriter {
    file_set: FileSet,
}

impl ModelWriter {
    pub fn new(file_set: FileSet) -> Self {
        Self { file_set }
    }

    /// Writer targeting the file the model was loaded from.
    pub fn for_model(model: &DataModel) -> Option<Self> {
        model.source().cloned().map(Self::new)
    }

    pub fn file_set(&self) -> &FileSet {
        &self.file_set
    }

    /// Write every output the model has.
    pub fn write_all(&self, model: &mut DataModel) -> WriteReport {
        self.write(model, false)
    }

    /// Write only the outputs with unsaved changes.
    pub fn write_incremental(&self, model: &mut DataModel) -> WriteReport {
        self.write(model, true)
    }

    fn write(&self, model: &mut DataModel, only_modified: bool) -> WriteReport {
        let mut report = WriteReport::default();

        if let Some(atr) = model.atr_mut() {
            if !only_modified || atr.labels().is_modified() {
                record(&mut report, FileKind::Atr, &self.file_set.atr(), |path| {
                    write_tree(path, atr)
                });
                if report.wrote(FileKind::Atr) {
                    atr.labels_mut().set_modified(false);
                }
            }
        }

        if let Some(gtr) = model.gtr_mut() {
            if !only_modified || gtr.labels().is_modified() {
                record(&mut report, FileKind::Gtr, &self.file_set.gtr(), |path| {
                    write_tree(path, gtr)
                });
                if report.wrote(FileKind::Gtr) {
                    gtr.labels_mut().set_modified(false);
                }
            }
        }

        let cdt_dirty = model.matrix().is_modified()
            || model.row_labels().is_modified()
            || model.col_labels().is_modified();
        if !only_modified || cdt_dirty {
            record(&mut report, FileKind::Cdt, &self.file_set.cdt(), |path| {
                write_cdt(path, model)
            });
            if report.wrote(FileKind::Cdt) {
                model.matrix_mut().set_modified(false);
                model.row_labels_mut().set_modified(false);
                model.col_labels_mut().set_modified(false);
            }
        } else {
            debug!("CDT of {} unchanged, not written", self.file_set);
        }

        info!(
            "Saved {}: {} written, {} failed",
            self.file_set,
            report.written.len(),
            report.failed.len()
        );
        report
    }
}

/// Run one spooled write and file the outcome in `report`.
fn record(
    report: &mut WriteReport,
    kind: FileKind,
    dest: &Path,
    body: impl FnOnce(&Path) -> io::Result<()>,
) {
    match write_spooled(dest, body) {
        Ok(()) => {
            debug!("Wrote {kind} file {}", dest.display());
            report.written.push((kind, dest.to_path_buf()));
        }
        Err(e) => {
            warn!("{e}");
            report.failed.push((kind, e));
        }
    }
}

fn spool_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(SPOOL_SUFFIX);
    PathBuf::from(name)
}

fn write_spooled(
    dest: &Path,
    body: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<(), WriteError> {
    let spool = spool_path(dest);
    body(&spool).map_err(|source| WriteError {
        path: spool.clone(),
        source,
    })?;
    fs::rename(&spool, dest).map_err(|source| WriteError {
        path: dest.to_path_buf(),
        source,
    })
}

fn tab_writer(path: &Path) -> io::Result<csv::Writer<BufWriter<File>>> {
    let file = File::create(path)?;
    Ok(WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .flexible(true)
        .from_writer(BufWriter::new(file)))
}

fn finish(writer: csv::Writer<BufWriter<File>>) -> io::Result<()> {
    let mut inner = writer.into_inner().map_err(|e| e.into_error())?;
    inner.flush()?;
    inner.get_ref().sync_all()
}

fn write_tree(path: &Path, tree: &TreeInfo) -> io::Result<()> {
    write_label_table(path, tree.labels())
}

fn write_label_table(path: &Path, labels: &LabelInfo) -> io::Result<()> {
    let mut out = tab_writer(path)?;
    out.write_record(labels.label_types())?;
    for record in labels.label_array() {
        out.write_record(record)?;
    }
    finish(out)
}

/// Label block then numeric block.
///
/// Row 0 holds the row label type names followed by the first column label
/// of every column. Each further column label type gets a row with its name
/// in the first cell. Then one row per record: its labels, then its values,
/// with missing and empty cells left blank. Appended columns are not part of
/// the model's own dataset and are left out.
fn write_cdt(path: &Path, model: &DataModel) -> io::Result<()> {
    let rows = model.row_labels();
    let cols = model.col_labels();
    let matrix = model.matrix();
    let n_row_types = rows.num_label_types();
    let n_cols = match matrix.append_index() {
        Some(own) => own,
        None => matrix.num_col().max(cols.num_labels()),
    };

    let mut out = tab_writer(path)?;
    let mut line: Vec<String> = Vec::with_capacity(n_row_types + n_cols);

    for (t, col_type) in cols.label_types().iter().enumerate() {
        line.clear();
        if t == 0 {
            line.extend(rows.label_types().iter().cloned());
        } else if n_row_types > 0 {
            line.push(col_type.clone());
            line.resize(n_row_types, String::new());
        }
        line.extend((0..n_cols).map(|c| cols.label(c, t).unwrap_or("").to_string()));
        out.write_record(&line)?;
    }

    for r in 0..matrix.num_row() {
        line.clear();
        line.extend((0..n_row_types).map(|t| rows.label(r, t).unwrap_or("").to_string()));
        line.extend((0..n_cols).map(|c| matrix.value(c, r).to_string()));
        out.write_record(&line)?;
    }
    finish(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::DataMatrix;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn model() -> DataModel {
        let rows = LabelInfo::from_parts(
            strings(&["GID", "NAME"]),
            vec![strings(&["GENE0X", "a"]), strings(&["GENE1X", "b"])],
        );
        let cols = LabelInfo::from_parts(
            strings(&["NAME", "AID"]),
            vec![strings(&["t0", "ARRY0X"]), strings(&["t1", "ARRY1X"])],
        );
        let matrix = DataMatrix::from_rows(vec![vec![1.5, f64::NAN], vec![-2.0, 0.25]]);
        DataModel::from_stores(rows, cols, matrix)
    }

    #[test]
    fn cdt_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.cdt");
        write_cdt(&path, &model()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "GID\tNAME\tt0\tt1",
                "AID\t\tARRY0X\tARRY1X",
                "GENE0X\ta\t1.5\t",
                "GENE1X\tb\t-2\t0.25",
            ]
        );
    }

    #[test]
    fn appended_columns_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.cdt");
        let other = model();
        let mut model = model();
        model.append(&other).unwrap();
        assert_eq!(model.n_cols(), 5);
        write_cdt(&path, &model).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("GID\tNAME\tt0\tt1"));
        assert!(text.lines().all(|l| l.split('\t').count() == 4));
    }

    #[test]
    fn tree_layout_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gtr");
        let tree = TreeInfo::from_rows(vec![strings(&["NODE1X", "GENE0X", "GENE1X", "0.9"])])
            .unwrap();
        write_tree(&path, &tree).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "NODEID\tLEFT\tRIGHT\tCORRELATION\nNODE1X\tGENE0X\tGENE1X\t0.9\n");
    }

    #[test]
    fn incremental_skips_clean_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ModelWriter::new(FileSet::from_path(&dir.path().join("m.cdt")));
        let mut model = model();

        let report = writer.write_incremental(&mut model);
        assert!(report.written.is_empty() && report.is_ok());

        model.matrix_mut().set_value(3.0, 1, 0).unwrap();
        let report = writer.write_incremental(&mut model);
        assert!(report.wrote(FileKind::Cdt));
        assert!(!model.is_modified());
        assert!(!spool_path(&writer.file_set().cdt()).exists());
    }

    #[test]
    fn failed_write_keeps_flags_and_spool() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("m.cdt");
        // A directory at the destination makes the rename fail.
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("keep"), "x").unwrap();

        let mut model = model();
        model.row_labels_mut().set_label(0, "NAME", "z");
        let report = ModelWriter::new(FileSet::from_path(&dest)).write_all(&mut model);

        assert!(!report.is_ok());
        assert_eq!(report.failed[0].0, FileKind::Cdt);
        assert!(model.row_labels().is_modified());
        assert!(spool_path(&dest).exists());
    }
}
