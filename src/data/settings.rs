use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::boundary::DataStart;
use super::fileset::FileSet;
use super::tokenizer::DEFAULT_DELIMITER;

// ---------------------------------------------------------------------------
// LoadSettings – what a load needs to know about a file
// ---------------------------------------------------------------------------

/// Per-file load metadata. Passed into the loader and returned from it with
/// the detected values filled in, so the next load of the same file can skip
/// detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    pub delimiter: char,
    /// `None` until the data start has been detected or confirmed.
    pub data_start: Option<DataStart>,
    pub row_label_types: Vec<String>,
    pub col_label_types: Vec<String>,
    pub parse_quoted: bool,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            data_start: None,
            row_label_types: Vec::new(),
            col_label_types: Vec::new(),
            parse_quoted: false,
        }
    }
}

impl LoadSettings {
    pub fn with_delimiter(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Self::default()
        }
    }

    pub fn with_data_start(mut self, row: usize, col: usize) -> Self {
        self.data_start = Some(DataStart::new(row, col));
        self
    }
}

// ---------------------------------------------------------------------------
// SettingsStore – settings of every file seen, keyed by file identity
// ---------------------------------------------------------------------------

/// Load settings for many files, persisted as one JSON document by the
/// caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsStore {
    files: BTreeMap<String, LoadSettings>,
}

impl SettingsStore {
    /// Read a store from `path`; a missing file gives an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading settings {}", path.display()))
            }
        };
        serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
    }

    /// Written to `<path>.spool` and renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialising settings")?;
        let mut spool = path.as_os_str().to_owned();
        spool.push(".spool");
        let spool = PathBuf::from(spool);
        fs::write(&spool, text).with_context(|| format!("writing settings {}", spool.display()))?;
        fs::rename(&spool, path).with_context(|| format!("replacing settings {}", path.display()))
    }

    pub fn get(&self, file_set: &FileSet) -> Option<&LoadSettings> {
        self.files.get(&file_set.identity())
    }

    pub fn insert(&mut self, file_set: &FileSet, settings: LoadSettings) {
        self.files.insert(file_set.identity(), settings);
    }

    pub fn remove(&mut self, file_set: &FileSet) -> Option<LoadSettings> {
        self.files.remove(&file_set.identity())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
