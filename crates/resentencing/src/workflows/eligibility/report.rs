//! Tabular exports of an evaluation run.
//!
//! Reports are plain [`Table`]s built from the input exports, so eligible rows and error rows
//! keep every source column. Writing is a separate step.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::workflows::extract::{Table, TableLoadError};

use super::domain::{ColumnNames, EligibilityError, ErrorRow};
use super::engine::EligibilityOutcome;
use super::normalizer::with_normalized_column;

/// Header of the column appended to exported error rows.
pub const ERROR_REASON_COLUMN: &str = "Error reason";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode report {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Schema(#[from] EligibilityError),
    #[error(transparent)]
    Table(#[from] TableLoadError),
}

/// Rows of `table` whose person id is in the eligible set, in table order.
pub fn eligible_rows(
    table: &Table,
    columns: &ColumnNames,
    outcome: &EligibilityOutcome,
) -> Result<Table, EligibilityError> {
    let id_column = table
        .column(&columns.person_id)
        .ok_or_else(|| EligibilityError::MissingColumn {
            table: table.name().to_string(),
            column: columns.person_id.clone(),
        })?;
    let eligible = outcome.eligible_set();

    Ok(table.select_rows(|row| {
        row.get(id_column)
            .is_some_and(|id| eligible.contains(id.trim()))
    }))
}

/// Error rows with their original cells plus an [`ERROR_REASON_COLUMN`].
pub fn error_table(persons: &Table, errors: &[ErrorRow]) -> Result<Table, TableLoadError> {
    let mut headers = persons.headers().to_vec();
    headers.push(ERROR_REASON_COLUMN.to_string());

    let rows = errors
        .iter()
        .map(|error| {
            let mut cells = error.cells.clone();
            cells.push(error.reason());
            cells
        })
        .collect();

    Table::new(format!("{} errors", persons.name()), headers, rows)
}

pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_file(table: &Table, path: &Path) -> Result<(), ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(table, file).map_err(|source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Paths of the files written by [`ReportAssembler::export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReports {
    pub eligible_demographics: PathBuf,
    pub eligible_current_offenses: PathBuf,
    pub errors: PathBuf,
}

/// Builds and writes the per-cohort report files.
#[derive(Debug, Clone)]
pub struct ReportAssembler<'a> {
    columns: &'a ColumnNames,
    prefix: String,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(columns: &'a ColumnNames, prefix: impl Into<String>) -> Self {
        Self {
            columns,
            prefix: prefix.into(),
        }
    }

    pub fn eligible_demographics(
        &self,
        persons: &Table,
        outcome: &EligibilityOutcome,
    ) -> Result<Table, EligibilityError> {
        eligible_rows(persons, self.columns, outcome)
    }

    /// Current commitments of eligible persons, with the normalized offense column appended.
    pub fn eligible_current_offenses(
        &self,
        current: &Table,
        outcome: &EligibilityOutcome,
    ) -> Result<Table, EligibilityError> {
        let selected = eligible_rows(current, self.columns, outcome)?;
        with_normalized_column(&selected, &self.columns.offense)
    }

    pub fn export(
        &self,
        directory: &Path,
        persons: &Table,
        current: &Table,
        outcome: &EligibilityOutcome,
    ) -> Result<ExportedReports, ReportError> {
        fs::create_dir_all(directory).map_err(|source| ReportError::Io {
            path: directory.to_path_buf(),
            source,
        })?;

        let reports = ExportedReports {
            eligible_demographics: directory
                .join(format!("{}_eligible_demographics.csv", self.prefix)),
            eligible_current_offenses: directory
                .join(format!("{}_eligible_currentcommits.csv", self.prefix)),
            errors: directory.join(format!("{}_errors.csv", self.prefix)),
        };

        let demographics = self.eligible_demographics(persons, outcome)?;
        write_csv_file(&demographics, &reports.eligible_demographics)?;

        let offenses = self.eligible_current_offenses(current, outcome)?;
        write_csv_file(&offenses, &reports.eligible_current_offenses)?;

        let errors = error_table(persons, &outcome.errors)?;
        write_csv_file(&errors, &reports.errors)?;

        info!(
            directory = %directory.display(),
            eligible_rows = demographics.len(),
            offense_rows = offenses.len(),
            error_rows = errors.len(),
            "wrote eligibility reports"
        );

        Ok(reports)
    }
}
