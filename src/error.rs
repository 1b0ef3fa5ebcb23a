use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

/// Coarse classification of a failed load, for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    CdtParse,
    TreeParse,
    InsufficientMemory,
    Cancelled,
}

/// A fatal problem while loading a data file set.
///
/// Cell-level parse problems never surface here; they are replaced by the
/// missing value during the load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read data file {path}: {source}")]
    CdtIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data file {path}: {reason}")]
    CdtParse { path: PathBuf, reason: String },
    #[error("could not read tree file {path}: {source}")]
    TreeIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not enough memory to hold {rows} x {cols} values from {path}")]
    InsufficientMemory {
        path: PathBuf,
        rows: usize,
        cols: usize,
    },
    #[error("loading {path} was cancelled")]
    Cancelled { path: PathBuf },
}

impl LoadError {
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::CdtIo { .. } | LoadError::CdtParse { .. } => LoadErrorKind::CdtParse,
            LoadError::TreeIo { .. } => LoadErrorKind::TreeParse,
            LoadError::InsufficientMemory { .. } => LoadErrorKind::InsufficientMemory,
            LoadError::Cancelled { .. } => LoadErrorKind::Cancelled,
        }
    }

    /// The file the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::CdtIo { path, .. }
            | LoadError::CdtParse { path, .. }
            | LoadError::TreeIo { path, .. }
            | LoadError::InsufficientMemory { path, .. }
            | LoadError::Cancelled { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("cell ({col}, {row}) is outside the {cols} x {rows} matrix")]
    OutOfBounds {
        col: usize,
        row: usize,
        cols: usize,
        rows: usize,
    },
    #[error("cannot append a matrix with {found} rows to one with {expected} rows")]
    RowCountMismatch { expected: usize, found: usize },
    #[error("a second dataset is already appended")]
    AlreadyAppended,
}

// ---------------------------------------------------------------------------
// Write errors
// ---------------------------------------------------------------------------

/// One output of a save that could not be written. The spool file, if any,
/// is left next to the destination.
#[derive(Debug, Error)]
#[error("failed to write {path}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
