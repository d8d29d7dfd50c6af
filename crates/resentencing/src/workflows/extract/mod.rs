//! In-memory tables loaded from CDCR data exports.
//!
//! Every export (demographics, current and prior commitments, sorting criteria) is read into
//! a [`Table`] of named string columns. Cells are kept verbatim so that rows routed to the
//! error set or selected for a report can be written back out unchanged.

mod dates;
mod parser;

pub use dates::parse_date;

use std::io::Read;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum TableLoadError {
    #[error("failed to read {table} export: {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV data in {table} export: {source}")]
    Csv {
        table: String,
        #[source]
        source: csv::Error,
    },
    #[error("{table} row {row} has {found} cells but the header declares {expected}")]
    RaggedRow {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Named-column table with string cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, TableLoadError> {
        let name = name.into();
        let headers: Vec<String> = headers
            .iter()
            .map(|header| parser::clean_header(header))
            .collect();

        for (index, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(TableLoadError::RaggedRow {
                    table: name,
                    row: index + 1,
                    expected: headers.len(),
                    found: row.len(),
                });
            }
        }

        Ok(Self {
            name,
            headers,
            rows,
        })
    }

    pub fn from_path<P: AsRef<Path>>(
        name: impl Into<String>,
        path: P,
    ) -> Result<Self, TableLoadError> {
        let name = name.into();
        let file = std::fs::File::open(path).map_err(|source| TableLoadError::Io {
            table: name.clone(),
            source,
        })?;
        Self::from_reader(name, file)
    }

    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, TableLoadError> {
        let name = name.into();
        let (headers, rows) =
            parser::read_csv(reader).map_err(|source| TableLoadError::Csv {
                table: name.clone(),
                source,
            })?;
        Self::new(name, headers, rows)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively with whitespace collapsed.
    pub fn column(&self, column: &str) -> Option<usize> {
        let wanted = parser::header_key(column);
        self.headers
            .iter()
            .position(|header| parser::header_key(header) == wanted)
    }

    /// Trimmed cell contents, `None` when blank.
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }

    /// Copy of the table holding only the rows accepted by `keep`, in original order.
    pub fn select_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[String]) -> bool,
    {
        Table {
            name: self.name.clone(),
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }

    /// Copy of the table with one extra column computed from each row.
    pub(crate) fn with_appended_column<F>(&self, header: &str, mut value: F) -> Table
    where
        F: FnMut(&[String]) -> String,
    {
        let mut headers = self.headers.clone();
        headers.push(header.to_string());

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = row.clone();
                cells.push(value(row));
                cells
            })
            .collect();

        Table {
            name: self.name.clone(),
            headers,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn from_reader_keeps_cells_and_cleans_headers() {
        let csv = "\u{feff}CDCR # ,Birthday\nA1,1970-01-02\nA2,\n";
        let table = Table::from_reader("demographics", csv.as_bytes()).expect("table loads");

        assert_eq!(table.headers(), &["CDCR #".to_string(), "Birthday".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("cdcr  #"), Some(0));
        assert_eq!(table.value(0, 1), Some("1970-01-02"));
        assert_eq!(table.value(1, 1), None);
        assert_eq!(table.column("Offense"), None);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let error = Table::new(
            "priors",
            vec!["CDCR #".to_string(), "Offense".to_string()],
            vec![vec!["A1".to_string()]],
        )
        .expect_err("ragged row rejected");

        match error {
            TableLoadError::RaggedRow {
                row,
                expected,
                found,
                ..
            } => {
                assert_eq!((row, expected, found), (1, 2, 1));
            }
            other => panic!("expected ragged row error, got {other:?}"),
        }
    }

    #[test]
    fn from_path_propagates_io_errors() {
        let error = Table::from_path("demographics", "./does-not-exist.csv")
            .expect_err("expected io error");
        assert!(matches!(error, TableLoadError::Io { .. }));
    }

    #[test]
    fn select_rows_preserves_order() {
        let csv = "CDCR #,Offense\nA1,PC187\nA2,PC459\nA1,PC211\n";
        let table = Table::from_reader("current", csv.as_bytes()).expect("table loads");

        let selected = table.select_rows(|row| row[0] == "A1");
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.rows()[1][1], "PC211");
        assert_eq!(selected.name(), "current");
    }

    #[test]
    fn parse_date_supports_export_formats() {
        let expected = NaiveDate::from_ymd_opt(1968, 3, 9).expect("valid date");
        assert_eq!(parse_date("1968-03-09"), Some(expected));
        assert_eq!(parse_date("03/09/1968"), Some(expected));
        assert_eq!(parse_date("1968-03-09 00:00:00"), Some(expected));
        assert_eq!(parse_date("1968-03-09T08:30:00Z"), Some(expected));
        assert_eq!(parse_date("  "), None);
        assert_eq!(parse_date("unknown"), None);
    }
}
