//! Statutory eligibility screening for resentencing review.
//!
//! A population is narrowed by an ordered [`RuleChain`]: demographic thresholds on derived
//! time attributes, then exclusions or requirements over normalized offense codes expanded
//! with their implied variants. Rows that cannot be evaluated are kept aside as
//! [`ErrorRow`]s and never reach the rules.

pub mod domain;
mod engine;
pub mod expansion;
pub mod matcher;
pub mod normalizer;
pub mod report;
pub mod rules;
pub mod time_attributes;

#[cfg(test)]
mod tests;

pub use domain::{
    AttributeIssue, ColumnNames, DerivedAttributes, EligibilityError, ErrorRow, OffenseSource,
    PersonRecord, TimeAttribute,
};
pub use engine::{EligibilityEngine, EligibilityInputs, EligibilityOutcome, StepReport};
pub use expansion::{expand, ImpliedIneligibility, IneligibleSet, SortingCriteria, WILDCARD};
pub use matcher::{disqualifying_offenses, has_disqualifying_offense, OffenseIndex};
pub use normalizer::{
    normalize_offense, offense_key, with_normalized_column, NORMALIZED_OFFENSE_COLUMN,
};
pub use report::{ExportedReports, ReportAssembler, ReportError};
pub use rules::{
    Cohort, EligibilityCondition, OffenseSelection, RequiredInputs, RuleChain, RuleKind,
    DEFAULT_PERMUTATION_DEPTH, MAX_PERMUTATION_DEPTH,
};
pub use time_attributes::{DerivedPopulation, TimeAttributeDeriver};
