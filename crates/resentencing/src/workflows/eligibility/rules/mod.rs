//! Typed rule configuration for the eligibility engine.
//!
//! A cohort is an ordered [`RuleChain`] of named [`EligibilityCondition`]s. Rule files are
//! JSON arrays; each entry is checked for a known `kind` and a well-formed body before any
//! row is processed.

mod presets;

pub use presets::Cohort;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use super::domain::{EligibilityError, TimeAttribute};
use super::expansion::{expand, ImpliedIneligibility, IneligibleSet, SortingCriteria};
use super::normalizer::offense_key;

/// Permutation depth used when an offense rule does not set one.
pub const DEFAULT_PERMUTATION_DEPTH: usize = 1;
/// Every ordering of up to this many modifier tokens is expanded per base code.
pub const MAX_PERMUTATION_DEPTH: usize = 4;

/// One named step of a cohort definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityCondition {
    pub name: String,
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub rule: RuleKind,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Keep persons whose attribute is at least `at_least` (and below `below`, when set).
    DemographicThreshold {
        attribute: TimeAttribute,
        at_least: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        below: Option<f64>,
    },
    /// Keep persons with `lower <= age at offense < upper`.
    AgeRange { lower: f64, upper: f64 },
    /// Drop persons with any current offense in the ineligible set.
    CurrentExclude(OffenseSelection),
    /// Drop persons with any prior offense in the ineligible set.
    PriorExclude(OffenseSelection),
    /// Keep only persons with at least one current offense in the set.
    CurrentRequire(OffenseSelection),
    /// Keep only persons whose controlling offense is in the set.
    ControllingRequire(OffenseSelection),
}

impl RuleKind {
    pub const KINDS: [&'static str; 6] = [
        "demographic_threshold",
        "age_range",
        "current_exclude",
        "prior_exclude",
        "current_require",
        "controlling_require",
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::DemographicThreshold { .. } => "demographic_threshold",
            Self::AgeRange { .. } => "age_range",
            Self::CurrentExclude(_) => "current_exclude",
            Self::PriorExclude(_) => "prior_exclude",
            Self::CurrentRequire(_) => "current_require",
            Self::ControllingRequire(_) => "controlling_require",
        }
    }

    pub fn offense_selection(&self) -> Option<&OffenseSelection> {
        match self {
            Self::CurrentExclude(selection)
            | Self::PriorExclude(selection)
            | Self::CurrentRequire(selection)
            | Self::ControllingRequire(selection) => Some(selection),
            Self::DemographicThreshold { .. } | Self::AgeRange { .. } => None,
        }
    }

    pub fn required_attribute(&self) -> Option<TimeAttribute> {
        match self {
            Self::DemographicThreshold { attribute, .. } => Some(*attribute),
            Self::AgeRange { .. } => Some(TimeAttribute::AgeAtOffenseYears),
            _ => None,
        }
    }
}

/// Sorting-criteria tables and implied variants that make up an ineligible set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffenseSelection {
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtract_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "ImpliedIneligibility::is_empty")]
    pub implied: ImpliedIneligibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permutation_depth: Option<usize>,
    #[serde(default = "enabled_by_default")]
    pub normalize: bool,
}

impl OffenseSelection {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            subtract_tables: Vec::new(),
            implied: ImpliedIneligibility::new(),
            permutation_depth: None,
            normalize: true,
        }
    }

    pub fn subtracting<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subtract_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_implied(mut self, implied: ImpliedIneligibility) -> Self {
        self.implied = implied;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.permutation_depth = Some(depth);
        self
    }

    pub fn depth(&self) -> usize {
        self.permutation_depth.unwrap_or(DEFAULT_PERMUTATION_DEPTH)
    }

    /// Codes of the selected tables minus the codes of the subtracted tables, then expanded.
    pub fn build_ineligible_set(&self, criteria: &SortingCriteria) -> IneligibleSet {
        let key = |code: &str| offense_key(code, self.normalize);

        let subtracted: HashSet<String> = criteria
            .codes_in(&self.subtract_tables)
            .into_iter()
            .map(key)
            .collect();

        let base = criteria
            .codes_in(&self.tables)
            .into_iter()
            .filter(|code| !subtracted.contains(&key(code)));

        expand(base, &self.implied, self.depth(), self.normalize)
    }
}

/// Which optional inputs a chain reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiredInputs {
    pub sorting_criteria: bool,
    pub current_offenses: bool,
    pub prior_offenses: bool,
    pub controlling_offense: bool,
}

/// Ordered, validated sequence of eligibility conditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct RuleChain {
    conditions: Vec<EligibilityCondition>,
}

impl RuleChain {
    pub fn new(conditions: Vec<EligibilityCondition>) -> Result<Self, EligibilityError> {
        let mut names = HashSet::new();
        for condition in &conditions {
            if condition.name.trim().is_empty() {
                return Err(invalid(&condition.name, "rule name must not be empty"));
            }
            if !names.insert(condition.name.as_str()) {
                return Err(invalid(&condition.name, "rule name is declared more than once"));
            }
            validate_rule(condition)?;
        }

        Ok(Self { conditions })
    }

    /// Parse a JSON array of conditions, rejecting unknown rule kinds up front.
    pub fn from_json(source: &str) -> Result<Self, EligibilityError> {
        let value: Value = serde_json::from_str(source)?;
        let Value::Array(entries) = value else {
            return Err(invalid(
                "<rule chain>",
                "rule configuration must be a JSON array of rules",
            ));
        };

        let mut conditions = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index + 1));

            match entry.get("kind") {
                Some(Value::String(kind)) if RuleKind::KINDS.contains(&kind.as_str()) => {}
                Some(Value::String(kind)) => {
                    return Err(EligibilityError::UnknownRuleKind {
                        rule: name,
                        kind: kind.clone(),
                    });
                }
                _ => return Err(invalid(&name, "rule must declare a string 'kind'")),
            }

            let condition: EligibilityCondition = serde_json::from_value(entry)
                .map_err(|err| invalid(&name, &err.to_string()))?;
            conditions.push(condition);
        }

        Self::new(conditions)
    }

    pub fn to_json_pretty(&self) -> Result<String, EligibilityError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn conditions(&self) -> &[EligibilityCondition] {
        &self.conditions
    }

    pub fn enabled(&self) -> impl Iterator<Item = &EligibilityCondition> {
        self.conditions.iter().filter(|condition| condition.enabled)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Time attributes read by the enabled rules.
    pub fn required_attributes(&self) -> BTreeSet<TimeAttribute> {
        self.enabled()
            .filter_map(|condition| condition.rule.required_attribute())
            .collect()
    }

    /// Inputs beyond the demographics export that the enabled rules read.
    pub fn required_inputs(&self) -> RequiredInputs {
        let mut inputs = RequiredInputs::default();
        for condition in self.enabled() {
            match &condition.rule {
                RuleKind::CurrentExclude(_) | RuleKind::CurrentRequire(_) => {
                    inputs.sorting_criteria = true;
                    inputs.current_offenses = true;
                }
                RuleKind::PriorExclude(_) => {
                    inputs.sorting_criteria = true;
                    inputs.prior_offenses = true;
                }
                RuleKind::ControllingRequire(_) => {
                    inputs.sorting_criteria = true;
                    inputs.controlling_offense = true;
                }
                RuleKind::DemographicThreshold { .. } | RuleKind::AgeRange { .. } => {}
            }
        }
        inputs
    }

    /// Copy of the chain with one rule switched on or off.
    pub fn with_enabled(mut self, name: &str, enabled: bool) -> Result<Self, EligibilityError> {
        let condition = self
            .conditions
            .iter_mut()
            .find(|condition| condition.name == name)
            .ok_or_else(|| invalid(name, "no rule with this name in the chain"))?;
        condition.enabled = enabled;
        Ok(self)
    }
}

fn validate_rule(condition: &EligibilityCondition) -> Result<(), EligibilityError> {
    let name = &condition.name;
    match &condition.rule {
        RuleKind::DemographicThreshold {
            at_least, below, ..
        } => {
            if !at_least.is_finite() {
                return Err(invalid(name, "'at_least' must be a finite number"));
            }
            if let Some(below) = below {
                if !below.is_finite() || below <= at_least {
                    return Err(invalid(name, "'below' must be finite and above 'at_least'"));
                }
            }
        }
        RuleKind::AgeRange { lower, upper } => {
            if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                return Err(invalid(name, "age range needs finite bounds with lower < upper"));
            }
        }
        RuleKind::CurrentExclude(selection)
        | RuleKind::PriorExclude(selection)
        | RuleKind::CurrentRequire(selection)
        | RuleKind::ControllingRequire(selection) => {
            if selection.tables.iter().any(|table| table.trim().is_empty()) {
                return Err(invalid(name, "table labels must not be blank"));
            }
            if selection.depth() > MAX_PERMUTATION_DEPTH {
                return Err(invalid(
                    name,
                    &format!("'permutation_depth' must not exceed {MAX_PERMUTATION_DEPTH}"),
                ));
            }
        }
    }
    Ok(())
}

fn invalid(rule: &str, reason: &str) -> EligibilityError {
    EligibilityError::InvalidRule {
        rule: rule.to_string(),
        reason: reason.to_string(),
    }
}
