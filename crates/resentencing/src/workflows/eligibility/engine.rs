use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::workflows::extract::Table;

use super::domain::{ColumnNames, EligibilityError, ErrorRow, OffenseSource, PersonRecord};
use super::expansion::{IneligibleSet, SortingCriteria};
use super::matcher::{disqualifying_offenses, OffenseIndex};
use super::normalizer::offense_key;
use super::rules::{EligibilityCondition, OffenseSelection, RuleChain, RuleKind};
use super::time_attributes::TimeAttributeDeriver;

/// Source tables for one evaluation run, materialized in memory.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityInputs<'a> {
    pub persons: &'a Table,
    pub sorting_criteria: &'a Table,
    pub current_offenses: &'a Table,
    pub prior_offenses: &'a Table,
}

/// Audit entry for one rule of the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub description: String,
    pub kind: &'static str,
    pub skipped: bool,
    pub before: usize,
    pub after: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ineligible_codes: Option<usize>,
    /// Matched offense codes per person id: the removed persons of an exclusion, the kept
    /// persons of a requirement.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub matches: BTreeMap<String, Vec<String>>,
}

impl StepReport {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Result of a complete run: eligible ids, rows that could not be evaluated and the step trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EligibilityOutcome {
    pub evaluated: usize,
    pub eligible_ids: Vec<String>,
    pub errors: Vec<ErrorRow>,
    pub steps: Vec<StepReport>,
}

impl EligibilityOutcome {
    pub fn is_eligible(&self, person_id: &str) -> bool {
        self.eligible_ids.iter().any(|id| id == person_id)
    }

    pub fn eligible_set(&self) -> BTreeSet<&str> {
        self.eligible_ids.iter().map(String::as_str).collect()
    }
}

/// Stateless evaluator narrowing a population through an ordered rule chain.
#[derive(Debug, Clone)]
pub struct EligibilityEngine {
    columns: ColumnNames,
    as_of: NaiveDate,
}

struct RuleContext {
    criteria: SortingCriteria,
    current: OffenseIndex,
    prior: OffenseIndex,
}

/// What one enabled rule did to the candidate list.
struct RuleEffect<'p> {
    kept: Vec<&'p PersonRecord>,
    ineligible_codes: Option<usize>,
    matches: BTreeMap<String, Vec<String>>,
}

impl<'p> RuleEffect<'p> {
    fn filtered(kept: Vec<&'p PersonRecord>) -> Self {
        Self {
            kept,
            ineligible_codes: None,
            matches: BTreeMap::new(),
        }
    }
}

impl EligibilityEngine {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            columns: ColumnNames::default(),
            as_of,
        }
    }

    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn evaluate(
        &self,
        inputs: &EligibilityInputs<'_>,
        chain: &RuleChain,
    ) -> Result<EligibilityOutcome, EligibilityError> {
        let required = chain.required_attributes();
        let deriver = TimeAttributeDeriver::new(&self.columns, self.as_of);
        deriver.validate_schema(inputs.persons, &required)?;
        let context = self.prepare_context(inputs, chain)?;

        let population = deriver.derive(inputs.persons, &required)?;
        let mut candidates: Vec<&PersonRecord> = population.persons.iter().collect();
        let mut steps = Vec::with_capacity(chain.len());

        for condition in chain.conditions() {
            let before = candidates.len();
            if !condition.enabled {
                debug!(rule = %condition.name, "skipping disabled eligibility rule");
                steps.push(step_report(condition, true, before, before, None, BTreeMap::new()));
                continue;
            }

            let effect = apply_rule(&condition.rule, candidates, &context);
            candidates = effect.kept;

            info!(
                rule = %condition.name,
                kind = condition.rule.label(),
                before,
                after = candidates.len(),
                "applied eligibility rule"
            );
            steps.push(step_report(
                condition,
                false,
                before,
                candidates.len(),
                effect.ineligible_codes,
                effect.matches,
            ));
        }

        let eligible_ids: Vec<String> = candidates
            .iter()
            .map(|person| person.person_id.clone())
            .collect();

        info!(
            evaluated = population.persons.len(),
            eligible = eligible_ids.len(),
            errors = population.errors.len(),
            "eligibility evaluation complete"
        );

        Ok(EligibilityOutcome {
            evaluated: population.persons.len(),
            eligible_ids,
            errors: population.errors,
            steps,
        })
    }

    // Offense tables and criteria are only read when an enabled rule needs them, but their
    // schemas are checked before any person row is processed.
    fn prepare_context(
        &self,
        inputs: &EligibilityInputs<'_>,
        chain: &RuleChain,
    ) -> Result<RuleContext, EligibilityError> {
        let needs = chain.required_inputs();

        if needs.controlling_offense
            && inputs.persons.column(&self.columns.controlling_offense).is_none()
        {
            return Err(EligibilityError::MissingColumn {
                table: inputs.persons.name().to_string(),
                column: self.columns.controlling_offense.clone(),
            });
        }

        let criteria = if needs.sorting_criteria {
            SortingCriteria::from_table(inputs.sorting_criteria, &self.columns)?
        } else {
            SortingCriteria::default()
        };
        let current = if needs.current_offenses {
            OffenseIndex::from_table(inputs.current_offenses, &self.columns, OffenseSource::Current)?
        } else {
            OffenseIndex::default()
        };
        let prior = if needs.prior_offenses {
            OffenseIndex::from_table(inputs.prior_offenses, &self.columns, OffenseSource::Prior)?
        } else {
            OffenseIndex::default()
        };
        for index in [&current, &prior] {
            if let Some(source) = index.source() {
                debug!(?source, people = index.people(), "indexed offense table");
            }
        }

        Ok(RuleContext {
            criteria,
            current,
            prior,
        })
    }
}

fn apply_rule<'p>(
    rule: &RuleKind,
    mut candidates: Vec<&'p PersonRecord>,
    context: &RuleContext,
) -> RuleEffect<'p> {
    match rule {
        RuleKind::DemographicThreshold {
            attribute,
            at_least,
            below,
        } => {
            candidates.retain(|person| {
                person.attributes.get(*attribute).is_some_and(|value| {
                    value >= *at_least && below.map_or(true, |below| value < below)
                })
            });
            RuleEffect::filtered(candidates)
        }
        RuleKind::AgeRange { lower, upper } => {
            candidates.retain(|person| {
                person
                    .attributes
                    .age_at_offense_years
                    .is_some_and(|age| *lower <= age && age < *upper)
            });
            RuleEffect::filtered(candidates)
        }
        RuleKind::CurrentExclude(selection) => {
            offense_step(candidates, selection, context, &context.current, false)
        }
        RuleKind::PriorExclude(selection) => {
            offense_step(candidates, selection, context, &context.prior, false)
        }
        RuleKind::CurrentRequire(selection) => {
            offense_step(candidates, selection, context, &context.current, true)
        }
        RuleKind::ControllingRequire(selection) => {
            let ineligible = ineligible_set(selection, context);
            let mut matches = BTreeMap::new();
            candidates.retain(|person| {
                let Some(code) = person
                    .controlling_offense
                    .as_deref()
                    .map(|code| offense_key(code, selection.normalize))
                    .filter(|code| ineligible.contains(code))
                else {
                    return false;
                };
                matches.insert(person.person_id.clone(), vec![code]);
                true
            });
            RuleEffect {
                kept: candidates,
                ineligible_codes: Some(ineligible.len()),
                matches,
            }
        }
    }
}

/// Exclusion keeps persons with no match; requirement keeps persons with at least one.
fn offense_step<'p>(
    candidates: Vec<&'p PersonRecord>,
    selection: &OffenseSelection,
    context: &RuleContext,
    offenses: &OffenseIndex,
    keep_matched: bool,
) -> RuleEffect<'p> {
    let ineligible = ineligible_set(selection, context);

    let checked: Vec<(&'p PersonRecord, Vec<String>)> = candidates
        .into_par_iter()
        .map(|person| {
            let codes = offenses.keyed_codes_for(&person.person_id, selection.normalize);
            let matched: Vec<String> = disqualifying_offenses(codes, &ineligible)
                .into_iter()
                .map(str::to_string)
                .collect();
            (person, matched)
        })
        .collect();

    let mut kept = Vec::with_capacity(checked.len());
    let mut matches = BTreeMap::new();
    for (person, matched) in checked {
        let is_match = !matched.is_empty();
        if is_match {
            matches.insert(person.person_id.clone(), matched);
        }
        if is_match == keep_matched {
            kept.push(person);
        }
    }

    RuleEffect {
        kept,
        ineligible_codes: Some(ineligible.len()),
        matches,
    }
}

fn ineligible_set(selection: &OffenseSelection, context: &RuleContext) -> IneligibleSet {
    let ineligible = selection.build_ineligible_set(&context.criteria);
    debug!(
        tables = ?selection.tables,
        codes = ineligible.len(),
        depth = selection.depth(),
        "built ineligible offense set"
    );
    ineligible
}

fn step_report(
    condition: &EligibilityCondition,
    skipped: bool,
    before: usize,
    after: usize,
    ineligible_codes: Option<usize>,
    matches: BTreeMap<String, Vec<String>>,
) -> StepReport {
    StepReport {
        name: condition.name.clone(),
        description: condition.description.clone(),
        kind: condition.rule.label(),
        skipped,
        before,
        after,
        ineligible_codes,
        matches,
    }
}
