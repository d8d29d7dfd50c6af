use serde::{Deserialize, Serialize};
use std::fmt;

/// Time-based attribute derived from the raw dates of a demographics row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAttribute {
    AgeYears,
    AggregateSentenceYears,
    TimeServedYears,
    AgeAtOffenseYears,
}

impl TimeAttribute {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::AgeYears,
            Self::AggregateSentenceYears,
            Self::TimeServedYears,
            Self::AgeAtOffenseYears,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AgeYears => "Age in years",
            Self::AggregateSentenceYears => "Aggregate sentence in years",
            Self::TimeServedYears => "Time served in years",
            Self::AgeAtOffenseYears => "Age during offense",
        }
    }
}

impl fmt::Display for TimeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which commitment table an offense row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffenseSource {
    Current,
    Prior,
}

impl OffenseSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Current => "current commitments",
            Self::Prior => "prior commitments",
        }
    }
}

/// Column names the engine reads from each export. Defaults follow the CDCR layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub person_id: String,
    pub birth_date: String,
    pub aggregate_sentence_months: String,
    pub admission_date: String,
    pub offense_date: String,
    pub age_during_offense: String,
    pub controlling_offense: String,
    pub offense: String,
    pub criteria_offense: String,
    pub criteria_table: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            person_id: "CDCR #".to_string(),
            birth_date: "Birthday".to_string(),
            aggregate_sentence_months: "Aggregate Sentence in Months".to_string(),
            admission_date: "Current Admission Date".to_string(),
            offense_date: "Offense End Date".to_string(),
            age_during_offense: "Age during offense".to_string(),
            controlling_offense: "Controlling Offense".to_string(),
            offense: "Offense".to_string(),
            criteria_offense: "Offenses".to_string(),
            criteria_table: "Table".to_string(),
        }
    }
}

/// Derived attributes of one person; `None` when the source data could not produce a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedAttributes {
    pub age_years: Option<f64>,
    pub aggregate_sentence_years: Option<f64>,
    pub time_served_years: Option<f64>,
    pub age_at_offense_years: Option<f64>,
}

impl DerivedAttributes {
    pub fn get(&self, attribute: TimeAttribute) -> Option<f64> {
        match attribute {
            TimeAttribute::AgeYears => self.age_years,
            TimeAttribute::AggregateSentenceYears => self.aggregate_sentence_years,
            TimeAttribute::TimeServedYears => self.time_served_years,
            TimeAttribute::AgeAtOffenseYears => self.age_at_offense_years,
        }
    }

    pub(crate) fn set(&mut self, attribute: TimeAttribute, value: f64) {
        let slot = match attribute {
            TimeAttribute::AgeYears => &mut self.age_years,
            TimeAttribute::AggregateSentenceYears => &mut self.aggregate_sentence_years,
            TimeAttribute::TimeServedYears => &mut self.time_served_years,
            TimeAttribute::AgeAtOffenseYears => &mut self.age_at_offense_years,
        };
        *slot = Some(value);
    }
}

/// A demographics row that survived time-attribute derivation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonRecord {
    pub person_id: String,
    pub source_row: usize,
    pub attributes: DerivedAttributes,
    pub controlling_offense: Option<String>,
}

/// Why a demographics row could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum AttributeIssue {
    #[error("missing person identifier")]
    MissingPersonId,
    #[error("person identifier appears on {occurrences} rows")]
    DuplicatePersonId { occurrences: usize },
    #[error("{attribute}: '{column}' is empty")]
    Missing {
        attribute: TimeAttribute,
        column: String,
    },
    #[error("{attribute}: '{column}' value '{value}' could not be parsed")]
    Unparseable {
        attribute: TimeAttribute,
        column: String,
        value: String,
    },
    #[error("{attribute}: {detail}")]
    Inconsistent {
        attribute: TimeAttribute,
        detail: String,
    },
}

/// Demographics row routed to the error set, kept intact for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRow {
    pub source_row: usize,
    pub person_id: Option<String>,
    pub cells: Vec<String>,
    pub issues: Vec<AttributeIssue>,
}

impl ErrorRow {
    pub fn reason(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EligibilityError {
    #[error("{table} export is missing required column '{column}'")]
    MissingColumn { table: String, column: String },
    #[error("rule '{rule}' names unknown rule kind '{kind}'")]
    UnknownRuleKind { rule: String, kind: String },
    #[error("rule '{rule}' is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },
    #[error("rule configuration is not valid JSON: {0}")]
    RuleSyntax(#[from] serde_json::Error),
}
