use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{EligibilityCondition, OffenseSelection, RuleChain, RuleKind};
use crate::workflows::eligibility::domain::TimeAttribute;
use crate::workflows::eligibility::expansion::{ImpliedIneligibility, WILDCARD};

const ATTEMPT: &str = "/att";
const ATTEMPT_PC664: &str = "(664)";
const SECOND_DEGREE: &str = "2nd";

/// Statutory cohorts with a built-in rule chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    /// Cohort 1: adult population.
    Adult,
    /// Cohort 2: minors tried as adults.
    Juvenile,
}

impl Cohort {
    pub const fn ordered() -> [Self; 2] {
        [Self::Adult, Self::Juvenile]
    }

    pub const fn slug(self) -> &'static str {
        match self {
            Self::Adult => "adult",
            Self::Juvenile => "juvenile",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Adult => "Cohort 1: adult population",
            Self::Juvenile => "Cohort 2: minors tried as adults",
        }
    }

    pub fn rule_chain(self) -> RuleChain {
        let conditions = match self {
            Self::Adult => adult_conditions(),
            Self::Juvenile => juvenile_conditions(),
        };
        RuleChain { conditions }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Cohort {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "adult" | "adults" | "cohort1" | "1" => Ok(Self::Adult),
            "juvenile" | "juveniles" | "minor" | "cohort2" | "2" => Ok(Self::Juvenile),
            other => Err(format!(
                "unknown cohort '{other}' (expected 'adult' or 'juvenile')"
            )),
        }
    }
}

fn adult_implied() -> ImpliedIneligibility {
    ImpliedIneligibility::new()
        .with(WILDCARD, [ATTEMPT, ATTEMPT_PC664, SECOND_DEGREE])
        .with("459", [ATTEMPT, ATTEMPT_PC664])
}

fn juvenile_implied() -> ImpliedIneligibility {
    ImpliedIneligibility::new().with("187", [SECOND_DEGREE, ATTEMPT_PC664])
}

fn condition(name: &str, description: &str, rule: RuleKind) -> EligibilityCondition {
    EligibilityCondition {
        name: name.to_string(),
        description: description.to_string(),
        enabled: true,
        rule,
    }
}

fn served_at_least_ten_years() -> EligibilityCondition {
    condition(
        "r_3",
        "Served a minimum of 10 years in custody",
        RuleKind::DemographicThreshold {
            attribute: TimeAttribute::TimeServedYears,
            at_least: 10.0,
            below: None,
        },
    )
}

fn adult_conditions() -> Vec<EligibilityCondition> {
    vec![
        condition(
            "r_1",
            "Age 50 and older",
            RuleKind::DemographicThreshold {
                attribute: TimeAttribute::AgeYears,
                at_least: 50.0,
                below: None,
            },
        ),
        condition(
            "r_2",
            "Sentenced to 20 years or more",
            RuleKind::DemographicThreshold {
                attribute: TimeAttribute::AggregateSentenceYears,
                at_least: 20.0,
                below: None,
            },
        ),
        served_at_least_ten_years(),
        condition(
            "r_4",
            "Is not serving a current sentence for any offense listed in Table A, B, C, or D and their implied offenses",
            RuleKind::CurrentExclude(
                OffenseSelection::new(["Table A", "Table B", "Table C", "Table D"])
                    .with_implied(adult_implied()),
            ),
        ),
        condition(
            "r_5",
            "Does not have a prior conviction for any offense listed in Tables C & D and their implied offenses",
            RuleKind::PriorExclude(
                OffenseSelection::new(["Table C", "Table D"]).with_implied(adult_implied()),
            ),
        ),
    ]
}

fn juvenile_conditions() -> Vec<EligibilityCondition> {
    vec![
        condition(
            "r_6",
            "Sentenced for a crime that was committed at age 14 or 15",
            RuleKind::AgeRange {
                lower: 14.0,
                upper: 16.0,
            },
        ),
        condition(
            "r_7",
            "Is not serving current sentence for any offense listed in Table D and E and their implied offenses",
            RuleKind::CurrentExclude(
                OffenseSelection::new(["Table E", "Table D"])
                    .with_implied(juvenile_implied())
                    .with_depth(2),
            ),
        ),
        served_at_least_ten_years(),
        condition(
            "r_8",
            "Does not have a prior conviction for any offense listed in Table D and its implied offenses",
            RuleKind::PriorExclude(
                OffenseSelection::new(["Table D"])
                    .with_implied(juvenile_implied())
                    .with_depth(2),
            ),
        ),
    ]
}
