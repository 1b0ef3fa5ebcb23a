/// Data layer: reading, holding and writing a clustered data set.
///
/// Architecture:
/// ```text
///  .cdt (+ .gtr / .atr)
///        │
///        ▼
///   ┌───────────┐   ┌──────────┐
///   │ tokenizer │──▶│ boundary │  rows of cells → data start (row, col)
///   └───────────┘   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  LoadJob: labels + matrix + trees, cancellable
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐      ┌───────────┐
///   │ DataModel │◀─────│ reordered │  read-only index-mapped views
///   └───────────┘      └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer   │  spool, then rename over .cdt / .gtr / .atr
///   └──────────┘
/// ```

pub mod boundary;
pub mod fileset;
pub mod labels;
pub mod loader;
pub mod matrix;
pub mod model;
pub mod reordered;
pub mod settings;
pub mod tokenizer;
pub mod tree;
pub mod writer;

pub use boundary::DataStart;
pub use fileset::FileSet;
pub use labels::{LabelEvent, LabelInfo, LabelView};
pub use loader::{spawn_load, CancelToken, LoadHandle, LoadJob, LoadState, ProgressSink};
pub use matrix::{BaseValues, DataMatrix, DataValue, MatrixView};
pub use model::DataModel;
pub use reordered::{ReorderedLabels, ReorderedModel};
pub use settings::{LoadSettings, SettingsStore};
pub use tree::{TreeInfo, TreeNode};
pub use writer::{FileKind, ModelWriter, WriteReport};
