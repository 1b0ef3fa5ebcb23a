use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};

/// Tab, the delimiter every CDT producer we know of uses.
pub const DEFAULT_DELIMITER: char = '\t';

// ---------------------------------------------------------------------------
// Cell – one token of a flat-file row
// ---------------------------------------------------------------------------

/// One delimited field. Empty fields (two delimiters in a row, or a
/// delimiter right before the end of a line) come back as `Null` so that
/// ragged rows keep their positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Null,
}

impl Cell {
    /// The cell text, `""` for a null cell.
    pub fn as_str(&self) -> &str {
        match self {
            Cell::Text(s) => s,
            Cell::Null => "",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn into_string(self) -> String {
        match self {
            Cell::Text(s) => s,
            Cell::Null => String::new(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Null
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// The single byte the csv reader splits on, if `delimiter` is ASCII.
pub fn delimiter_byte(delimiter: char) -> Option<u8> {
    u8::try_from(delimiter).ok().filter(|b| b.is_ascii())
}

// ---------------------------------------------------------------------------
// FlatFileTokenizer
// ---------------------------------------------------------------------------

/// Streams a delimited text source as rows of [`Cell`]s.
///
/// Blank lines are skipped. Rows are not forced to a common width; callers
/// decide what a short or long row means.
pub struct FlatFileTokenizer<R: Read> {
    reader: csv::Reader<R>,
    record: ByteRecord,
}

impl FlatFileTokenizer<File> {
    /// Open `path` for a fresh pass. Every call starts at the top of the file.
    pub fn open(path: &Path, delimiter: u8, parse_quoted: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file, delimiter, parse_quoted))
    }
}

impl<R: Read> FlatFileTokenizer<R> {
    pub fn new(source: R, delimiter: u8, parse_quoted: bool) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(parse_quoted)
            .from_reader(source);
        Self {
            reader,
            record: ByteRecord::new(),
        }
    }

    /// 1-based physical line of the most recently returned row.
    pub fn line(&self) -> u64 {
        self.reader.position().line()
    }

    fn next_row(&mut self) -> io::Result<Option<Vec<Cell>>> {
        loop {
            if !self.reader.read_byte_record(&mut self.record)? {
                return Ok(None);
            }
            if is_blank(&self.record) {
                continue;
            }
            let row = self
                .record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Null
                    } else {
                        Cell::Text(String::from_utf8_lossy(field).into_owned())
                    }
                })
                .collect();
            return Ok(Some(row));
        }
    }
}

impl<R: Read> Iterator for FlatFileTokenizer<R> {
    type Item = io::Result<Vec<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

fn is_blank(record: &ByteRecord) -> bool {
    record.len() <= 1
        && record
            .iter()
            .all(|field| field.iter().all(|b| b.is_ascii_whitespace()))
}

/// Count the non-blank rows of `path`.
pub fn count_rows(path: &Path, delimiter: u8, parse_quoted: bool) -> io::Result<usize> {
    let mut count = 0;
    for row in FlatFileTokenizer::open(path, delimiter, parse_quoted)? {
        row?;
        count += 1;
    }
    Ok(count)
}

/// Read at most `limit` rows from the top of `path`.
pub fn read_rows(
    path: &Path,
    delimiter: u8,
    parse_quoted: bool,
    limit: usize,
) -> io::Result<Vec<Vec<Cell>>> {
    FlatFileTokenizer::open(path, delimiter, parse_quoted)?
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(text: &str) -> Vec<Vec<Cell>> {
        FlatFileTokenizer::new(text.as_bytes(), b'\t', false)
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn consecutive_delimiters_yield_null_cells() {
        let rows = tokenize("a\t\tb\n");
        assert_eq!(
            rows,
            vec![vec![Cell::from("a"), Cell::Null, Cell::from("b")]]
        );
    }

    #[test]
    fn trailing_delimiter_yields_null_cell() {
        let rows = tokenize("a\tb\t\n");
        assert_eq!(rows[0].len(), 3);
        assert!(rows[0][2].is_null());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let rows = tokenize("a\tb\n\n\r\nc\td\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0].as_str(), "c");
    }

    #[test]
    fn rows_may_be_ragged() {
        let rows = tokenize("a\tb\tc\nd\n");
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn custom_delimiter_and_quotes() {
        let rows: Vec<_> = FlatFileTokenizer::new("\"x,y\",2\n".as_bytes(), b',', true)
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows[0][0].as_str(), "x,y");
        assert_eq!(rows[0][1].as_str(), "2");
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        assert_eq!(delimiter_byte('\t'), Some(b'\t'));
        assert_eq!(delimiter_byte('§'), None);
    }
}
