use std::fmt;
use std::path::{Path, PathBuf};

pub const GTR_EXT: &str = "gtr";
pub const ATR_EXT: &str = "atr";

/// The files making up one dataset: the main data file plus the row (GTR)
/// and column (ATR) tree files sharing its stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    dir: PathBuf,
    root: String,
    ext: String,
}

impl FileSet {
    /// `data/yeast.cdt` gives root `yeast` and extension `cdt`.
    pub fn from_path(path: &Path) -> Self {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let root = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { dir, root, ext }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    fn with_ext(&self, ext: &str) -> PathBuf {
        if ext.is_empty() {
            self.dir.join(&self.root)
        } else {
            self.dir.join(format!("{}.{ext}", self.root))
        }
    }

    pub fn cdt(&self) -> PathBuf {
        self.with_ext(&self.ext)
    }

    pub fn gtr(&self) -> PathBuf {
        self.with_ext(GTR_EXT)
    }

    pub fn atr(&self) -> PathBuf {
        self.with_ext(ATR_EXT)
    }

    /// Key identifying the dataset across sessions: file name, case-folded.
    pub fn identity(&self) -> String {
        if self.ext.is_empty() {
            self.root.to_lowercase()
        } else {
            format!("{}.{}", self.root, self.ext).to_lowercase()
        }
    }
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cdt().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_paths_share_the_stem() {
        let fs = FileSet::from_path(Path::new("data/yeast.CDT"));
        assert_eq!(fs.cdt(), Path::new("data/yeast.CDT"));
        assert_eq!(fs.gtr(), Path::new("data/yeast.gtr"));
        assert_eq!(fs.atr(), Path::new("data/yeast.atr"));
        assert_eq!(fs.identity(), "yeast.cdt");
    }
}
