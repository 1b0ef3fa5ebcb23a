use std::path::Path;
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::tokenizer::{self, Cell};

/// Number of leading rows inspected when looking for the numeric block.
pub const PREVIEW_LIMIT: usize = 20;

/// Label types with a reserved meaning in CDT files: IDs, names, ORFs and
/// weights. Matching is whole-token and case-insensitive.
static LABEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(COMPLEX|NAME|Y?ORF|(GENE|G|ARRAY|A|U|ROW|COL)?ID|.*WEIGHT)$")
        .expect("label token pattern")
});

static MISSING_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(N/?A.?|EMPTY|NONE|MISS.*)$").expect("missing token pattern")
});

static TRAILING_E: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[,.]*\d*[eE]$").expect("trailing exponent pattern"));

// ---------------------------------------------------------------------------
// DataStart – where the numeric block begins
// ---------------------------------------------------------------------------

/// Row and column of the first numeric cell. Everything above is column
/// labels, everything to the left is row labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStart {
    pub row: usize,
    pub col: usize,
}

impl DataStart {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

// ---------------------------------------------------------------------------
// Token classification
// ---------------------------------------------------------------------------

/// Whether `token` is one of the reserved label type names.
pub fn is_label_token(token: &str) -> bool {
    LABEL_TOKEN.is_match(token.trim())
}

/// Whether `token` spells a missing value (`NA`, `N/A`, `NaN`, `NONE`, `MISSING`, ...).
pub fn is_missing_token(token: &str) -> bool {
    MISSING_TOKEN.is_match(token.trim())
}

/// Some producers write `1e` for `1e+00`.
pub fn correct_trailing_e(token: &str) -> std::borrow::Cow<'_, str> {
    if TRAILING_E.is_match(token) {
        std::borrow::Cow::Owned(format!("{token}+00"))
    } else {
        std::borrow::Cow::Borrowed(token)
    }
}

fn is_data_candidate(token: &str) -> bool {
    let token = correct_trailing_e(token);
    token.trim().parse::<f64>().is_ok() || is_missing_token(&token)
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Find the first numeric cell in `rows` (only the first [`PREVIEW_LIMIT`]
/// rows are looked at).
///
/// Label types recorded by a previous load are consulted before the generic
/// token patterns: a known row label type widens the label columns, and a
/// known column label type marks its whole row as labels.
///
/// A numeric-looking cell is rejected when it sits in or left of the
/// rightmost label column seen so far, or when its row carries a label token
/// anywhere (e.g. an `EWEIGHT` row of `1`s). The data row is the first row
/// with a surviving cell; the data column is the leftmost surviving column in
/// the window, so an empty first data cell does not shift it.
pub fn try_detect_data_start(
    rows: &[Vec<Cell>],
    known_row_types: &[String],
    known_col_types: &[String],
) -> Option<DataStart> {
    let mut found: Option<DataStart> = None;
    let mut max_label_col: Option<usize> = None;

    for (row_idx, row) in rows.iter().take(PREVIEW_LIMIT).enumerate() {
        let row_has_label = row.iter().any(|cell| is_label_token(cell.as_str()));
        let col_limit = found.map_or(row.len(), |start| start.col.min(row.len()));

        for col_idx in 0..col_limit {
            let elem = row[col_idx].as_str().trim();
            if elem.is_empty() {
                continue;
            }
            let beyond_labels = max_label_col.map_or(true, |max| max < col_idx);

            if is_data_candidate(elem) {
                if row_has_label && beyond_labels {
                    break;
                }
                if !beyond_labels {
                    continue;
                }
                match found.as_mut() {
                    Some(start) => start.col = start.col.min(col_idx),
                    None => found = Some(DataStart::new(row_idx, col_idx)),
                }
                break;
            }

            if known_row_types.iter().any(|t| t == elem) {
                if beyond_labels {
                    max_label_col = Some(col_idx);
                }
                continue;
            }
            if known_col_types.iter().any(|t| t == elem) {
                break;
            }
            if is_label_token(elem) && beyond_labels {
                max_label_col = Some(col_idx);
            }
        }
    }

    found
}

/// Like [`try_detect_data_start`], falling back to `(0, 0)` when no numeric
/// cell survives.
pub fn detect_data_start(
    rows: &[Vec<Cell>],
    known_row_types: &[String],
    known_col_types: &[String],
) -> DataStart {
    match try_detect_data_start(rows, known_row_types, known_col_types) {
        Some(start) => {
            debug!("Found data start at row {}, column {}", start.row, start.col);
            start
        }
        None => {
            warn!("Could not detect the numeric block, defaulting to (0, 0)");
            DataStart::default()
        }
    }
}

/// Read the preview window of `path` and detect the data start in it.
pub fn find_data_start(
    path: &Path,
    delimiter: u8,
    parse_quoted: bool,
    known_row_types: &[String],
    known_col_types: &[String],
) -> std::io::Result<DataStart> {
    let preview = tokenizer::read_rows(path, delimiter, parse_quoted, PREVIEW_LIMIT)?;
    Ok(detect_data_start(&preview, known_row_types, known_col_types))
}
