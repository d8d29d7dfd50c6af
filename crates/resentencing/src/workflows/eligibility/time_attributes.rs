//! Derivation of age, sentence length, time served and age at offense from a demographics
//! export.
//!
//! Rows that cannot produce an attribute the rule chain needs are routed, unchanged, to the
//! error set before any rule runs. Attributes no enabled rule reads never cause an error.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::workflows::extract::{parse_date, Table};

use super::domain::{
    AttributeIssue, ColumnNames, DerivedAttributes, EligibilityError, ErrorRow, PersonRecord,
    TimeAttribute,
};

const DAYS_PER_YEAR: f64 = 365.25;
const MONTHS_PER_YEAR: f64 = 12.0;

/// Demographics split into evaluable persons and rows routed to the error set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedPopulation {
    pub persons: Vec<PersonRecord>,
    pub errors: Vec<ErrorRow>,
}

/// Column positions resolved once per table.
struct ResolvedColumns {
    person_id: usize,
    birth_date: Option<usize>,
    sentence_months: Option<usize>,
    admission_date: Option<usize>,
    offense_date: Option<usize>,
    age_during_offense: Option<usize>,
    controlling_offense: Option<usize>,
}

pub struct TimeAttributeDeriver<'a> {
    columns: &'a ColumnNames,
    as_of: NaiveDate,
}

impl<'a> TimeAttributeDeriver<'a> {
    pub fn new(columns: &'a ColumnNames, as_of: NaiveDate) -> Self {
        Self { columns, as_of }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Fail fast when a column needed for a required attribute is absent from the export.
    pub fn validate_schema(
        &self,
        persons: &Table,
        required: &BTreeSet<TimeAttribute>,
    ) -> Result<(), EligibilityError> {
        self.resolve(persons, required).map(|_| ())
    }

    pub fn derive(
        &self,
        persons: &Table,
        required: &BTreeSet<TimeAttribute>,
    ) -> Result<DerivedPopulation, EligibilityError> {
        let resolved = self.resolve(persons, required)?;
        let mut population = DerivedPopulation::default();
        let occurrences = id_occurrences(persons, resolved.person_id);

        for (row, cells) in persons.rows().iter().enumerate() {
            let mut issues = Vec::new();

            let person_id = persons.value(row, resolved.person_id).map(str::to_string);
            match person_id.as_deref() {
                None => issues.push(AttributeIssue::MissingPersonId),
                Some(id) => {
                    let count = occurrences.get(id).copied().unwrap_or(1);
                    if count > 1 {
                        issues.push(AttributeIssue::DuplicatePersonId { occurrences: count });
                    }
                }
            }

            let mut attributes = DerivedAttributes::default();
            for attribute in TimeAttribute::ordered() {
                match self.derive_attribute(persons, row, &resolved, attribute) {
                    Ok(value) => attributes.set(attribute, value),
                    Err(issue) if required.contains(&attribute) => issues.push(issue),
                    Err(_) => {}
                }
            }

            match person_id {
                Some(person_id) if issues.is_empty() => {
                    let controlling_offense = resolved
                        .controlling_offense
                        .and_then(|column| persons.value(row, column))
                        .map(str::to_string);
                    population.persons.push(PersonRecord {
                        person_id,
                        source_row: row,
                        attributes,
                        controlling_offense,
                    });
                }
                person_id => {
                    population.errors.push(ErrorRow {
                        source_row: row,
                        person_id,
                        cells: cells.clone(),
                        issues,
                    });
                }
            }
        }

        if !population.errors.is_empty() {
            warn!(
                table = persons.name(),
                errors = population.errors.len(),
                "rows routed to the error set during time attribute derivation"
            );
        }
        debug!(
            table = persons.name(),
            persons = population.persons.len(),
            as_of = %self.as_of,
            "derived time attributes"
        );

        Ok(population)
    }

    fn resolve(
        &self,
        persons: &Table,
        required: &BTreeSet<TimeAttribute>,
    ) -> Result<ResolvedColumns, EligibilityError> {
        let missing = |column: &str| EligibilityError::MissingColumn {
            table: persons.name().to_string(),
            column: column.to_string(),
        };

        let person_id = persons
            .column(&self.columns.person_id)
            .ok_or_else(|| missing(&self.columns.person_id))?;

        let resolved = ResolvedColumns {
            person_id,
            birth_date: persons.column(&self.columns.birth_date),
            sentence_months: persons.column(&self.columns.aggregate_sentence_months),
            admission_date: persons.column(&self.columns.admission_date),
            offense_date: persons.column(&self.columns.offense_date),
            age_during_offense: persons.column(&self.columns.age_during_offense),
            controlling_offense: persons.column(&self.columns.controlling_offense),
        };

        for attribute in required {
            match attribute {
                TimeAttribute::AgeYears => {
                    resolved
                        .birth_date
                        .ok_or_else(|| missing(&self.columns.birth_date))?;
                }
                TimeAttribute::AggregateSentenceYears => {
                    resolved
                        .sentence_months
                        .ok_or_else(|| missing(&self.columns.aggregate_sentence_months))?;
                }
                TimeAttribute::TimeServedYears => {
                    resolved
                        .admission_date
                        .ok_or_else(|| missing(&self.columns.admission_date))?;
                }
                TimeAttribute::AgeAtOffenseYears => {
                    if resolved.age_during_offense.is_none() {
                        resolved
                            .birth_date
                            .ok_or_else(|| missing(&self.columns.birth_date))?;
                        resolved
                            .offense_date
                            .ok_or_else(|| missing(&self.columns.offense_date))?;
                    }
                }
            }
        }

        Ok(resolved)
    }

    fn derive_attribute(
        &self,
        persons: &Table,
        row: usize,
        resolved: &ResolvedColumns,
        attribute: TimeAttribute,
    ) -> Result<f64, AttributeIssue> {
        match attribute {
            TimeAttribute::AgeYears => {
                let birth = self.date(
                    persons,
                    row,
                    resolved.birth_date,
                    attribute,
                    &self.columns.birth_date,
                )?;
                completed_years(birth, self.as_of).ok_or_else(|| AttributeIssue::Inconsistent {
                    attribute,
                    detail: format!("birth date {birth} is after {}", self.as_of),
                })
            }
            TimeAttribute::AggregateSentenceYears => {
                let column = &self.columns.aggregate_sentence_months;
                let raw = cell(persons, row, resolved.sentence_months, attribute, column)?;
                let months = parse_number(raw).ok_or_else(|| AttributeIssue::Unparseable {
                    attribute,
                    column: column.clone(),
                    value: raw.to_string(),
                })?;
                if months < 0.0 {
                    return Err(AttributeIssue::Inconsistent {
                        attribute,
                        detail: format!("negative sentence of {months} months"),
                    });
                }
                Ok(months / MONTHS_PER_YEAR)
            }
            TimeAttribute::TimeServedYears => {
                let admitted = self.date(
                    persons,
                    row,
                    resolved.admission_date,
                    attribute,
                    &self.columns.admission_date,
                )?;
                if admitted > self.as_of {
                    return Err(AttributeIssue::Inconsistent {
                        attribute,
                        detail: format!("admission date {admitted} is after {}", self.as_of),
                    });
                }
                let days = (self.as_of - admitted).num_days() as f64;
                Ok(days / DAYS_PER_YEAR)
            }
            TimeAttribute::AgeAtOffenseYears => {
                if let Some(column) = resolved.age_during_offense {
                    if let Some(raw) = persons.value(row, column) {
                        return parse_number(raw)
                            .filter(|age| *age >= 0.0)
                            .ok_or_else(|| AttributeIssue::Unparseable {
                                attribute,
                                column: self.columns.age_during_offense.clone(),
                                value: raw.to_string(),
                            });
                    }
                }

                let birth = self.date(
                    persons,
                    row,
                    resolved.birth_date,
                    attribute,
                    &self.columns.birth_date,
                )?;
                let offense = self.date(
                    persons,
                    row,
                    resolved.offense_date,
                    attribute,
                    &self.columns.offense_date,
                )?;
                completed_years(birth, offense).ok_or_else(|| AttributeIssue::Inconsistent {
                    attribute,
                    detail: format!("offense date {offense} precedes birth date {birth}"),
                })
            }
        }
    }

    fn date(
        &self,
        persons: &Table,
        row: usize,
        column: Option<usize>,
        attribute: TimeAttribute,
        column_name: &str,
    ) -> Result<NaiveDate, AttributeIssue> {
        let raw = cell(persons, row, column, attribute, column_name)?;
        parse_date(raw).ok_or_else(|| AttributeIssue::Unparseable {
            attribute,
            column: column_name.to_string(),
            value: raw.to_string(),
        })
    }
}

/// Every row of an identifier that appears more than once is an error, the first included.
fn id_occurrences(persons: &Table, column: usize) -> HashMap<&str, usize> {
    let mut occurrences = HashMap::new();
    for row in 0..persons.len() {
        if let Some(id) = persons.value(row, column) {
            *occurrences.entry(id).or_insert(0) += 1;
        }
    }
    occurrences
}

fn cell<'t>(
    persons: &'t Table,
    row: usize,
    column: Option<usize>,
    attribute: TimeAttribute,
    column_name: &str,
) -> Result<&'t str, AttributeIssue> {
    column
        .and_then(|column| persons.value(row, column))
        .ok_or_else(|| AttributeIssue::Missing {
            attribute,
            column: column_name.to_string(),
        })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn completed_years(from: NaiveDate, to: NaiveDate) -> Option<f64> {
    to.years_since(from).map(f64::from)
}
