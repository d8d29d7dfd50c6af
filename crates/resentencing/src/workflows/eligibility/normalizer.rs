//! Canonical form for offense codes.
//!
//! Codes arrive from the commitment exports and the sorting criteria with inconsistent case,
//! spacing and stray punctuation (`"PC 187 "`, `"pc187."`, `"459 / ATT"`). Matching is exact,
//! so both sides pass through [`normalize_offense`] first. The punctuation that belongs to
//! legally meaningful modifier tokens (`/att`, `(664)`, decimal sections such as `459.5`)
//! is preserved.

use crate::workflows::extract::Table;

use super::domain::EligibilityError;

/// Header of the derived column added by [`with_normalized_column`].
pub const NORMALIZED_OFFENSE_COLUMN: &str = "Offense cleaned";

pub fn normalize_offense(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || is_modifier_punctuation(*ch))
        .map(|ch| ch.to_ascii_lowercase())
        .collect();

    kept.trim_matches('.').to_string()
}

/// Matching key for a code: normalized, or only trimmed when a rule compares codes verbatim.
pub fn offense_key(raw: &str, normalize: bool) -> String {
    if normalize {
        normalize_offense(raw)
    } else {
        raw.trim().to_string()
    }
}

fn is_modifier_punctuation(ch: char) -> bool {
    matches!(ch, '.' | '/' | '(' | ')')
}

/// Copy of an offense table with the normalized code appended as a new column.
///
/// The raw offense column is left untouched.
pub fn with_normalized_column(table: &Table, offense_column: &str) -> Result<Table, EligibilityError> {
    let column = table
        .column(offense_column)
        .ok_or_else(|| EligibilityError::MissingColumn {
            table: table.name().to_string(),
            column: offense_column.to_string(),
        })?;

    Ok(table.with_appended_column(NORMALIZED_OFFENSE_COLUMN, |row| {
        normalize_offense(&row[column])
    }))
}
