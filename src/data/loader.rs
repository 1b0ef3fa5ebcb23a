use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use super::boundary::{self, DataStart};
use super::fileset::FileSet;
use super::labels::LabelInfo;
use super::matrix::{DataMatrix, DataValue};
use super::model::{DataModel, ModelParts};
use super::settings::LoadSettings;
use super::tokenizer::{self, Cell, FlatFileTokenizer};
use super::tree::TreeInfo;
use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a dataset from a file, picking the delimiter by extension.
///
/// Supported formats:
/// * `.cdt` / `.pcl` / `.txt` / `.tsv` – tab-delimited
/// * `.csv` – comma-delimited
///
/// Tree files next to the data file are picked up when the labels ask for
/// them.
pub fn load_file(path: &Path) -> Result<(DataModel, LoadSettings)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let settings = match ext.as_str() {
        "cdt" | "pcl" | "txt" | "tsv" => LoadSettings::with_delimiter('\t'),
        "csv" => LoadSettings::with_delimiter(','),
        other => bail!("Unsupported file extension: .{other}"),
    };

    let mut model = DataModel::new();
    let settings = model
        .load_new(FileSet::from_path(path), settings, &LogProgress, &CancelToken::new())
        .with_context(|| format!("loading {}", path.display()))?;
    Ok((model, settings))
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

/// Phases of a load, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Preparing,
    ReadingCdt,
    AssigningLabels,
    ReadingAtr,
    ReadingGtr,
    Done,
    Failed,
    Cancelled,
}

impl LoadState {
    pub fn label(self) -> &'static str {
        match self {
            LoadState::Preparing => "Preparing...",
            LoadState::ReadingCdt => "Loading data...",
            LoadState::AssigningLabels => "Assigning labels...",
            LoadState::ReadingAtr => "Reading column tree...",
            LoadState::ReadingGtr => "Reading row tree...",
            LoadState::Done => "Done!",
            LoadState::Failed => "Loading failed.",
            LoadState::Cancelled => "Loading cancelled.",
        }
    }
}

/// Receives progress from a running load. Calls must not block.
pub trait ProgressSink {
    fn set_length(&self, length: usize);
    fn set_value(&self, value: usize);
    fn incr_value(&self, by: usize);
    fn println(&self, message: &str);

    fn set_state(&self, state: LoadState) {
        self.println(state.label());
    }
}

/// Discards all progress.
impl ProgressSink for () {
    fn set_length(&self, _length: usize) {}
    fn set_value(&self, _value: usize) {}
    fn incr_value(&self, _by: usize) {}
    fn println(&self, _message: &str) {}
}

/// Forwards messages and phase changes to the `log` facade.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set_length(&self, length: usize) {
        debug!("Progress length {length}");
    }
    fn set_value(&self, _value: usize) {}
    fn incr_value(&self, _by: usize) {}
    fn println(&self, message: &str) {
        info!("{message}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Length(usize),
    Value(usize),
    Increment(usize),
    Message(String),
    State(LoadState),
}

/// Sends progress over a channel. A dropped receiver is ignored.
pub struct ChannelProgress {
    sender: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

impl ProgressSink for ChannelProgress {
    fn set_length(&self, length: usize) {
        self.send(ProgressEvent::Length(length));
    }
    fn set_value(&self, value: usize) {
        self.send(ProgressEvent::Value(value));
    }
    fn incr_value(&self, by: usize) {
        self.send(ProgressEvent::Increment(by));
    }
    fn println(&self, message: &str) {
        self.send(ProgressEvent::Message(message.to_string()));
    }
    fn set_state(&self, state: LoadState) {
        self.send(ProgressEvent::State(state));
    }
}

/// Cooperative cancellation flag, polled between rows and phases.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// LoadJob
// ---------------------------------------------------------------------------

/// Everything a successful load produces.
#[derive(Debug)]
pub struct LoadOutcome {
    pub parts: ModelParts,
    pub file_set: FileSet,
    /// Settings to persist for the next load of this file.
    pub settings: LoadSettings,
}

/// One load of one file set. Runs sequentially on the calling thread.
#[derive(Debug, Clone)]
pub struct LoadJob {
    file_set: FileSet,
    settings: LoadSettings,
}

/// Raw text of the label region collected while reading.
struct CdtContents {
    start: DataStart,
    /// Rows above the data start, complete.
    label_rows: Vec<Vec<String>>,
    /// Left part of every data row, `start.col` cells each.
    row_labels: Vec<Vec<String>>,
    /// Right part of every data row.
    values: Vec<Vec<f64>>,
    recovered_cells: usize,
}

impl LoadJob {
    pub fn new(file_set: FileSet, settings: LoadSettings) -> Self {
        Self { file_set, settings }
    }

    pub fn file_set(&self) -> &FileSet {
        &self.file_set
    }

    pub fn run(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<LoadOutcome, LoadError> {
        let result = self.run_phases(progress, cancel);
        match &result {
            Ok(_) => progress.set_state(LoadState::Done),
            Err(LoadError::Cancelled { .. }) => progress.set_state(LoadState::Cancelled),
            Err(e) => {
                warn!("{e}");
                progress.set_state(LoadState::Failed);
            }
        }
        result
    }

    fn cdt_path(&self) -> PathBuf {
        self.file_set.cdt()
    }

    fn check_cancel(&self, cancel: &CancelToken) -> Result<(), LoadError> {
        if cancel.is_cancelled() {
            info!("Load of {} cancelled", self.file_set);
            return Err(LoadError::Cancelled {
                path: self.cdt_path(),
            });
        }
        Ok(())
    }

    fn cdt_io(&self, source: io::Error) -> LoadError {
        LoadError::CdtIo {
            path: self.cdt_path(),
            source,
        }
    }

    fn cdt_parse(&self, reason: impl Into<String>) -> LoadError {
        LoadError::CdtParse {
            path: self.cdt_path(),
            reason: reason.into(),
        }
    }

    fn run_phases(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<LoadOutcome, LoadError> {
        progress.set_state(LoadState::Preparing);
        let settings = &self.settings;
        let delimiter = tokenizer::delimiter_byte(settings.delimiter).ok_or_else(|| {
            self.cdt_parse(format!(
                "delimiter {:?} is not a single ASCII character",
                settings.delimiter
            ))
        })?;
        let path = self.cdt_path();

        let row_count = tokenizer::count_rows(&path, delimiter, settings.parse_quoted)
            .map_err(|e| self.cdt_io(e))?;
        if row_count == 0 {
            return Err(self.cdt_parse("file holds no rows"));
        }
        progress.set_length(row_count);

        let start = match settings.data_start {
            Some(start) => start,
            None => boundary::find_data_start(
                &path,
                delimiter,
                settings.parse_quoted,
                &settings.row_label_types,
                &settings.col_label_types,
            )
            .map_err(|e| self.cdt_io(e))?,
        };
        if start.row >= row_count {
            return Err(self.cdt_parse(format!(
                "data starts at row {} but the file has {row_count} rows",
                start.row
            )));
        }
        info!(
            "Loading {} ({row_count} rows, data at row {}, column {})",
            self.file_set, start.row, start.col
        );
        self.check_cancel(cancel)?;

        progress.set_state(LoadState::ReadingCdt);
        let contents = self.read_cdt(&path, delimiter, start, row_count, progress, cancel)?;
        self.check_cancel(cancel)?;

        progress.set_state(LoadState::AssigningLabels);
        let flags = LabelFlags::scan(&contents.label_rows, start);
        let mut assembled = self.assemble(contents)?;
        assembled.parts.gid_found = flags.has_gid;
        assembled.parts.aid_found = flags.has_aid;
        assembled.parts.gweight_found = flags.has_gweight;
        assembled.parts.eweight_found = flags.has_eweight;
        self.check_cancel(cancel)?;

        if flags.has_aid {
            progress.set_state(LoadState::ReadingAtr);
            assembled.parts.atr = self.read_tree(&self.file_set.atr(), progress)?;
            assembled.parts.aid_found = assembled.parts.atr.is_some();
            assembled.parts.col_labels.hash_ids("AID");
            self.check_cancel(cancel)?;
        } else {
            debug!("No AID column labels, skipping column tree");
        }

        if flags.has_gid {
            progress.set_state(LoadState::ReadingGtr);
            assembled.parts.gtr = self.read_tree(&self.file_set.gtr(), progress)?;
            assembled.parts.gid_found = assembled.parts.gtr.is_some();
            assembled.parts.row_labels.hash_ids("GID");
            self.check_cancel(cancel)?;
        } else {
            debug!("No GID row labels, skipping row tree");
        }

        let settings = LoadSettings {
            delimiter: settings.delimiter,
            data_start: Some(start),
            row_label_types: assembled.row_label_types,
            col_label_types: assembled.col_label_types,
            parse_quoted: settings.parse_quoted,
        };
        Ok(LoadOutcome {
            parts: assembled.parts,
            file_set: self.file_set.clone(),
            settings,
        })
    }

    fn read_cdt(
        &self,
        path: &Path,
        delimiter: u8,
        start: DataStart,
        row_count: usize,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<CdtContents, LoadError> {
        let data_rows = row_count - start.row;
        let mut contents = CdtContents {
            start,
            label_rows: Vec::with_capacity(start.row),
            row_labels: Vec::new(),
            values: Vec::new(),
            recovered_cells: 0,
        };
        let oom = |cols: usize| LoadError::InsufficientMemory {
            path: path.to_path_buf(),
            rows: data_rows,
            cols,
        };
        contents.row_labels.try_reserve_exact(data_rows).map_err(|_| oom(0))?;
        contents.values.try_reserve_exact(data_rows).map_err(|_| oom(0))?;

        let tokenizer = FlatFileTokenizer::open(path, delimiter, self.settings.parse_quoted)
            .map_err(|e| self.cdt_io(e))?;

        for (row_idx, row) in tokenizer.enumerate() {
            self.check_cancel(cancel)?;
            let row = row.map_err(|e| self.cdt_io(e))?;

            if row_idx < start.row {
                contents
                    .label_rows
                    .push(row.into_iter().map(Cell::into_string).collect());
            } else {
                let mut cells = row.into_iter();
                let mut labels: Vec<String> =
                    cells.by_ref().take(start.col).map(Cell::into_string).collect();
                labels.resize(start.col, String::new());

                let suffix = cells.as_slice();
                let mut values = Vec::new();
                values.try_reserve_exact(suffix.len()).map_err(|_| oom(suffix.len()))?;
                for cell in suffix {
                    let (value, recovered) = parse_value(cell.as_str());
                    if recovered {
                        contents.recovered_cells += 1;
                    }
                    values.push(value);
                }
                contents.row_labels.push(labels);
                contents.values.push(values);
            }
            progress.incr_value(1);
        }

        if contents.recovered_cells > 0 {
            warn!(
                "{} cells of {} were not numbers and were loaded as missing",
                contents.recovered_cells, self.file_set
            );
        }
        Ok(contents)
    }

    fn assemble(&self, contents: CdtContents) -> Result<Assembled, LoadError> {
        let CdtContents {
            start,
            label_rows,
            row_labels,
            values,
            ..
        } = contents;

        let num_rows = values.len();
        let num_cols = values
            .iter()
            .map(Vec::len)
            .chain(label_rows.iter().map(|r| r.len().saturating_sub(start.col)))
            .max()
            .unwrap_or(0);
        if values.iter().any(|r| r.len() != num_cols) {
            warn!("Ragged data rows in {}, padding with missing values", self.file_set);
        }

        let mut row_types: Vec<String> = match label_rows.first() {
            Some(header) => (0..start.col)
                .map(|c| header.get(c).cloned().unwrap_or_default())
                .collect(),
            None if self.settings.row_label_types.len() == start.col => {
                self.settings.row_label_types.clone()
            }
            None => vec![String::new(); start.col],
        };
        let mut col_types: Vec<String> = if start.col > 0 {
            label_rows
                .iter()
                .map(|r| r.first().cloned().unwrap_or_default())
                .collect()
        } else {
            vec![String::new(); start.row]
        };

        if col_types
            .first()
            .is_some_and(|first| first.eq_ignore_ascii_case("GID"))
        {
            col_types[0] = first_descriptive_type(&row_types);
        }
        fill_empty_types(&mut row_types, "ROW");
        fill_empty_types(&mut col_types, "COLUMN");

        let col_labels: Vec<Vec<String>> = (0..num_cols)
            .map(|j| {
                label_rows
                    .iter()
                    .map(|r| r.get(start.col + j).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        let total = num_rows.checked_mul(num_cols).ok_or(LoadError::InsufficientMemory {
            path: self.cdt_path(),
            rows: num_rows,
            cols: num_cols,
        })?;
        let mut flat: Vec<f64> = Vec::new();
        flat.try_reserve_exact(total)
            .map_err(|_| LoadError::InsufficientMemory {
                path: self.cdt_path(),
                rows: num_rows,
                cols: num_cols,
            })?;
        for mut row in values {
            row.resize(num_cols, DataValue::MISSING_RAW);
            flat.extend(row);
        }
        let mut matrix = DataMatrix::from_flat(num_rows, num_cols, flat)
            .ok_or_else(|| self.cdt_parse("numeric block has inconsistent size"))?;
        matrix.calculate_base_values();

        let mut rows = LabelInfo::for_rows();
        rows.replace(row_types.clone(), row_labels);
        let cols = LabelInfo::from_parts(col_types.clone(), col_labels);

        debug!(
            "Row label types {:?}, column label types {:?}",
            row_types, col_types
        );
        Ok(Assembled {
            parts: ModelParts {
                row_labels: rows,
                col_labels: cols,
                gtr: None,
                atr: None,
                matrix,
                ..ModelParts::default()
            },
            row_label_types: row_types,
            col_label_types: col_types,
        })
    }

    /// Missing or empty tree files mean "no tree"; other read errors are fatal.
    fn read_tree(
        &self,
        path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<Option<TreeInfo>, LoadError> {
        match TreeInfo::read(path) {
            Ok(Some(tree)) => {
                debug!("Read {} nodes from {}", tree.num_nodes(), path.display());
                Ok(Some(tree))
            }
            Ok(None) => {
                progress.println(&format!("Tree file {} is empty.", path.display()));
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No tree file {} for {}", path.display(), self.file_set);
                Ok(None)
            }
            Err(source) => Err(LoadError::TreeIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

struct Assembled {
    parts: ModelParts,
    row_label_types: Vec<String>,
    col_label_types: Vec<String>,
}

/// Reserved label types found in the label corner of the file.
#[derive(Debug, Default)]
struct LabelFlags {
    has_gid: bool,
    has_aid: bool,
    has_gweight: bool,
    has_eweight: bool,
}

impl LabelFlags {
    fn scan(label_rows: &[Vec<String>], start: DataStart) -> Self {
        let mut flags = Self::default();
        for row in label_rows.iter().take(start.row) {
            for label in row.iter().take(start.col) {
                let label = label.trim();
                if label.eq_ignore_ascii_case("GID") {
                    flags.has_gid = true;
                } else if label.eq_ignore_ascii_case("AID") {
                    flags.has_aid = true;
                } else if label.eq_ignore_ascii_case("GWEIGHT") {
                    flags.has_gweight = true;
                } else if label.eq_ignore_ascii_case("EWEIGHT") {
                    flags.has_eweight = true;
                }
            }
        }
        flags
    }
}

/// Parse one numeric cell. The flag is set when the cell held text that is
/// not a number (empty cells are plainly missing).
fn parse_value(cell: &str) -> (f64, bool) {
    let cell = cell.trim();
    if cell.is_empty() {
        return (DataValue::MISSING_RAW, false);
    }
    let parsed = if cell.ends_with(['e', 'E']) {
        format!("{cell}+00").parse::<f64>()
    } else {
        cell.parse::<f64>()
    };
    match parsed {
        Ok(v) => (v, false),
        Err(_) => (DataValue::MISSING_RAW, !boundary::is_missing_token(cell)),
    }
}

/// In CDT files row 0 doubles as the row-label header, so a first column
/// label type of `GID` really names the first descriptive row label.
fn first_descriptive_type(row_types: &[String]) -> String {
    row_types
        .iter()
        .find(|t| {
            !["YORF", "GID", "GWEIGHT"]
                .iter()
                .any(|reserved| t.eq_ignore_ascii_case(reserved))
        })
        .cloned()
        .unwrap_or_else(|| "OTHER".to_string())
}

fn fill_empty_types(types: &mut [String], axis: &str) {
    for (i, t) in types.iter_mut().enumerate() {
        if t.trim().is_empty() {
            *t = format!("{axis} LABELS {}", i + 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Background loading
// ---------------------------------------------------------------------------

/// A load running on its own thread.
pub struct LoadHandle {
    progress: Receiver<ProgressEvent>,
    cancel: CancelToken,
    path: PathBuf,
    thread: JoinHandle<Result<LoadOutcome, LoadError>>,
}

impl LoadHandle {
    pub fn progress(&self) -> &Receiver<ProgressEvent> {
        &self.progress
    }

    /// Progress events sent since the last call, without waiting.
    pub fn poll_progress(&self) -> Vec<ProgressEvent> {
        self.progress.try_iter().collect()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the load to finish.
    pub fn join(self) -> Result<LoadOutcome, LoadError> {
        self.thread.join().unwrap_or_else(|_| {
            Err(LoadError::CdtParse {
                path: self.path,
                reason: "loader thread panicked".to_string(),
            })
        })
    }
}

/// Start `job` on a background thread.
pub fn spawn_load(job: LoadJob) -> LoadHandle {
    let (sender, receiver) = mpsc::channel();
    let cancel = CancelToken::new();
    let thread_cancel = cancel.clone();
    let path = job.file_set().cdt();
    let thread = thread::spawn(move || job.run(&ChannelProgress::new(sender), &thread_cancel));
    LoadHandle {
        progress: receiver,
        cancel,
        path,
        thread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_repairs_and_recovers() {
        assert_eq!(parse_value("1.5"), (1.5, false));
        assert_eq!(parse_value("2E"), (2.0, false));
        assert_eq!(parse_value(" -3.25 "), (-3.25, false));
        let (v, recovered) = parse_value("abc");
        assert!(v.is_nan() && recovered);
        let (v, recovered) = parse_value("NA");
        assert!(v.is_nan() && !recovered);
        let (v, recovered) = parse_value("");
        assert!(v.is_nan() && !recovered);
    }

    #[test]
    fn gid_column_type_is_replaced() {
        let types: Vec<String> = ["GID", "YORF", "NAME"].iter().map(|s| s.to_string()).collect();
        assert_eq!(first_descriptive_type(&types), "NAME");
        assert_eq!(first_descriptive_type(&types[..2]), "OTHER");
    }

    #[test]
    fn empty_types_get_placeholders() {
        let mut types = vec!["GID".to_string(), " ".to_string()];
        fill_empty_types(&mut types, "ROW");
        assert_eq!(types[1], "ROW LABELS 2");
    }

    #[test]
    fn label_flags_only_look_at_the_label_corner() {
        let rows = vec![
            vec!["GID".to_string(), "NAME".to_string(), "AID".to_string()],
            vec!["EWEIGHT".to_string(), String::new(), "1".to_string()],
        ];
        let flags = LabelFlags::scan(&rows, DataStart::new(2, 2));
        assert!(flags.has_gid && flags.has_eweight);
        assert!(!flags.has_aid && !flags.has_gweight);
    }
}
