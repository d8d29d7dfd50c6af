//! Expansion of statutorily listed offenses into the full ineligible set.
//!
//! A listed code also disqualifies its implied variants: the attempt (`/att`, `(664)`), the
//! repeat conviction (`2nd`) and similar modifiers. Variants are produced by appending up to
//! `permutation_depth` distinct modifier tokens to the base code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::workflows::extract::Table;

use super::domain::{ColumnNames, EligibilityError};
use super::normalizer::{normalize_offense, offense_key};

/// Key of the implied-ineligibility entry that applies to every base code without its own entry.
pub const WILDCARD: &str = "all";

/// Modifier tokens keyed by base code or by [`WILDCARD`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImpliedIneligibility(BTreeMap<String, Vec<String>>);

impl ImpliedIneligibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, code: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(code.into(), tokens.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact-code entry first, then the wildcard.
    pub fn tokens_for(&self, code: &str) -> Option<&[String]> {
        self.0
            .get(code)
            .or_else(|| self.0.get(WILDCARD))
            .map(Vec::as_slice)
    }

    fn normalized(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(code, tokens)| {
                    let key = if code == WILDCARD {
                        WILDCARD.to_string()
                    } else {
                        normalize_offense(code)
                    };
                    let tokens = tokens.iter().map(|token| normalize_offense(token)).collect();
                    (key, tokens)
                })
                .collect(),
        )
    }
}

/// Immutable set of disqualifying codes, only ever tested for membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IneligibleSet(BTreeSet<String>);

impl IneligibleSet {
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for IneligibleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Build the ineligible set for `base_codes`.
///
/// With `normalize` set, base codes, implied keys and tokens are normalized first. Blank codes
/// are skipped; an empty base list yields an empty set.
pub fn expand<I, S>(
    base_codes: I,
    implied: &ImpliedIneligibility,
    permutation_depth: usize,
    normalize: bool,
) -> IneligibleSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let normalized_implied;
    let implied = if normalize {
        normalized_implied = implied.normalized();
        &normalized_implied
    } else {
        implied
    };

    let mut variants = BTreeSet::new();
    for code in base_codes {
        let code = offense_key(code.as_ref(), normalize);
        if code.is_empty() {
            continue;
        }

        let tokens = distinct_tokens(implied.tokens_for(&code).unwrap_or_default());
        let depth = permutation_depth.min(tokens.len());
        let mut used = vec![false; tokens.len()];
        append_variants(&code, &tokens, &mut used, depth, &mut variants);
    }

    IneligibleSet(variants)
}

fn distinct_tokens(tokens: &[String]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    tokens
        .iter()
        .map(String::as_str)
        .filter(|token| !token.is_empty() && seen.insert(*token))
        .collect()
}

// Every ordering of each token subset is emitted, so records that list modifiers in a
// different order still match.
fn append_variants(
    prefix: &str,
    tokens: &[&str],
    used: &mut [bool],
    remaining: usize,
    variants: &mut BTreeSet<String>,
) {
    variants.insert(prefix.to_string());
    if remaining == 0 {
        return;
    }

    for index in 0..tokens.len() {
        if used[index] {
            continue;
        }
        used[index] = true;
        let variant = format!("{prefix}{}", tokens[index]);
        append_variants(&variant, tokens, used, remaining - 1, variants);
        used[index] = false;
    }
}

/// Offense codes grouped by the sorting-criteria table that lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortingCriteria {
    entries: Vec<(String, String)>,
}

impl SortingCriteria {
    pub fn from_table(table: &Table, columns: &ColumnNames) -> Result<Self, EligibilityError> {
        let column = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| EligibilityError::MissingColumn {
                    table: table.name().to_string(),
                    column: name.to_string(),
                })
        };
        let offense = column(&columns.criteria_offense)?;
        let table_label = column(&columns.criteria_table)?;

        let entries = (0..table.len())
            .filter_map(|row| {
                let code = table.value(row, offense)?;
                let label = table.value(row, table_label)?;
                Some((code.to_string(), label.to_string()))
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Codes listed in any of `tables`, in criteria order. Table labels compare case-insensitively.
    pub fn codes_in<S: AsRef<str>>(&self, tables: &[S]) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, label)| {
                tables
                    .iter()
                    .any(|table| table.as_ref().trim().eq_ignore_ascii_case(label))
            })
            .map(|(code, _)| code.as_str())
            .collect()
    }
}

impl<C: Into<String>, T: Into<String>> FromIterator<(C, T)> for SortingCriteria {
    fn from_iter<I: IntoIterator<Item = (C, T)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(code, table)| (code.into(), table.into()))
                .collect(),
        }
    }
}
