use std::collections::{BTreeMap, BTreeSet};

use crate::workflows::extract::Table;

use super::domain::{ColumnNames, EligibilityError, OffenseSource};
use super::expansion::IneligibleSet;
use super::normalizer::offense_key;

/// True when any of the person's codes is in the ineligible set.
///
/// Membership is exact: `459` never matches `459.5`.
pub fn has_disqualifying_offense(offenses: &BTreeSet<String>, ineligible: &IneligibleSet) -> bool {
    offenses.iter().any(|code| ineligible.contains(code))
}

/// The person's codes that fall in the ineligible set, sorted.
pub fn disqualifying_offenses<'a>(
    offenses: &'a BTreeSet<String>,
    ineligible: &IneligibleSet,
) -> Vec<&'a str> {
    offenses
        .iter()
        .filter(|code| ineligible.contains(code))
        .map(String::as_str)
        .collect()
}

/// Deduplicated offense codes per person for one commitment table.
///
/// Codes are kept both normalized and verbatim (trimmed) so a rule compares its ineligible
/// set against person codes keyed the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffenseIndex {
    source: Option<OffenseSource>,
    normalized: BTreeMap<String, BTreeSet<String>>,
    verbatim: BTreeMap<String, BTreeSet<String>>,
    empty: BTreeSet<String>,
}

impl OffenseIndex {
    pub fn from_table(
        table: &Table,
        columns: &ColumnNames,
        source: OffenseSource,
    ) -> Result<Self, EligibilityError> {
        let column = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| EligibilityError::MissingColumn {
                    table: table.name().to_string(),
                    column: name.to_string(),
                })
        };
        let person_id = column(&columns.person_id)?;
        let offense = column(&columns.offense)?;

        let mut index = Self {
            source: Some(source),
            ..Self::default()
        };
        for row in 0..table.len() {
            let (Some(id), Some(raw)) = (table.value(row, person_id), table.value(row, offense))
            else {
                continue;
            };
            for (codes, normalize) in [(&mut index.normalized, true), (&mut index.verbatim, false)] {
                let code = offense_key(raw, normalize);
                if !code.is_empty() {
                    codes.entry(id.to_string()).or_default().insert(code);
                }
            }
        }

        Ok(index)
    }

    pub fn source(&self) -> Option<OffenseSource> {
        self.source
    }

    /// Normalized codes recorded for a person; empty when the person has no rows in this table.
    pub fn codes_for(&self, person_id: &str) -> &BTreeSet<String> {
        self.keyed_codes_for(person_id, true)
    }

    /// Codes keyed the way a rule with the given `normalize` flag keys its ineligible set.
    pub fn keyed_codes_for(&self, person_id: &str, normalize: bool) -> &BTreeSet<String> {
        let codes = if normalize {
            &self.normalized
        } else {
            &self.verbatim
        };
        codes.get(person_id).unwrap_or(&self.empty)
    }

    pub fn people(&self) -> usize {
        self.normalized.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn intersection_drives_the_match() {
        let ineligible: IneligibleSet = ["459", "459/att"].into_iter().collect();

        assert!(has_disqualifying_offense(&codes(&["187", "459/att"]), &ineligible));
        assert!(!has_disqualifying_offense(&codes(&["187"]), &ineligible));
        assert!(!has_disqualifying_offense(&codes(&[]), &ineligible));
        assert_eq!(
            disqualifying_offenses(&codes(&["459", "459/att", "211"]), &ineligible),
            vec!["459", "459/att"]
        );
    }

    #[test]
    fn no_substring_matching() {
        let ineligible: IneligibleSet = ["459"].into_iter().collect();
        assert!(!has_disqualifying_offense(&codes(&["459.5"]), &ineligible));

        let ineligible: IneligibleSet = ["459.5"].into_iter().collect();
        assert!(!has_disqualifying_offense(&codes(&["459"]), &ineligible));
    }

    #[test]
    fn empty_ineligible_set_matches_nothing() {
        let ineligible = IneligibleSet::default();
        assert!(!has_disqualifying_offense(&codes(&["187", "211"]), &ineligible));
    }

    #[test]
    fn index_normalizes_and_deduplicates() {
        let table = Table::from_reader(
            "current commitments",
            "CDCR #,Offense\nA1,PC 187\nA1,pc187.\nA1,459 /ATT\nA2,\n,211\n".as_bytes(),
        )
        .expect("table loads");

        let index = OffenseIndex::from_table(&table, &ColumnNames::default(), OffenseSource::Current)
            .expect("index builds");

        assert_eq!(index.source(), Some(OffenseSource::Current));
        assert_eq!(index.codes_for("A1"), &codes(&["pc187", "459/att"]));
        assert!(index.codes_for("A2").is_empty());
        assert!(index.codes_for("missing").is_empty());
        assert_eq!(index.people(), 1);
        assert_eq!(
            index.keyed_codes_for("A1", false),
            &codes(&["PC 187", "pc187.", "459 /ATT"])
        );
    }

    #[test]
    fn index_requires_offense_column() {
        let table = Table::from_reader("prior commitments", "CDCR #,Code\nA1,187\n".as_bytes())
            .expect("table loads");

        let error = OffenseIndex::from_table(&table, &ColumnNames::default(), OffenseSource::Prior)
            .expect_err("schema rejected");
        match error {
            EligibilityError::MissingColumn { table, column } => {
                assert_eq!(table, "prior commitments");
                assert_eq!(column, "Offense");
            }
            other => panic!("expected missing column, got {other:?}"),
        }
    }
}
