use chrono::NaiveDate;
use std::collections::HashSet;

use crate::workflows::eligibility::{
    EligibilityEngine, EligibilityError, EligibilityInputs, EligibilityOutcome, RuleChain,
};
use crate::workflows::extract::Table;

pub(super) fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid as-of date")
}

pub(super) fn table(name: &str, csv: &str) -> Table {
    Table::from_reader(name, csv.as_bytes()).expect("fixture table loads")
}

pub(super) fn sorting_criteria() -> Table {
    table(
        "sorting criteria",
        "Offenses,Table\n\
         459,Table A\n\
         245,Table B\n\
         667.5,Table C\n\
         192,Table D\n\
         187,Table E\n\
         207,Table E\n\
         10851,Table F\n",
    )
}

/// P1 eligible; P2 too young; P3 missing birth date; P4 attempted burglary; P5 prior Table D;
/// P6 exactly on every threshold; P7 short sentence; P8 short time served.
pub(super) fn adult_demographics() -> Table {
    table(
        "demographics",
        "CDCR #,Birthday,Aggregate Sentence in Months,Current Admission Date,Offense End Date,Controlling Offense\n\
         P1,1969-06-01,264,2012-06-01,2011-05-01,PC 187\n\
         P2,1976-06-01,300,2010-01-01,2009-01-01,211\n\
         P3,,300,2001-01-01,2000-01-01,459\n\
         P4,1964-03-15,240,2005-01-01,2004-01-01,459 / ATT\n\
         P5,1972-01-01,360,2000-01-01,1999-01-01,211\n\
         P6,1973-12-31,240,2015-01-01,2014-01-01,10851\n\
         P7,1960-01-01,120,2000-01-01,1999-01-01,211\n\
         P8,1965-01-01,300,2020-01-01,2019-01-01,211\n",
    )
}

pub(super) fn adult_current() -> Table {
    table(
        "current commitments",
        "CDCR #,Offense\n\
         P1,187\n\
         P2,211\n\
         P3,459\n\
         P4,459 /ATT\n\
         P5,211\n\
         P6,VC 10851\n\
         P7,211\n\
         P8,211\n",
    )
}

pub(super) fn adult_prior() -> Table {
    table(
        "prior commitments",
        "CDCR #,Offense\n\
         P1,\n\
         P5,192\n\
         P6,10851\n",
    )
}

/// J1 eligible; J2 sixteen at offense; J3 and J4 second-degree or attempted 187; J5 prior
/// Table D; J6 short time served; J7 no offense date.
pub(super) fn juvenile_demographics() -> Table {
    table(
        "demographics",
        "CDCR #,Birthday,Aggregate Sentence in Months,Current Admission Date,Offense End Date,Age during offense\n\
         J1,1990-01-01,300,2010-01-01,2005-06-01,\n\
         J2,1985-01-01,300,2005-01-01,,16\n\
         J3,1990-05-01,300,2008-01-01,,14\n\
         J4,1991-01-01,300,2009-01-01,,15\n\
         J5,1991-01-01,300,2010-01-01,,15\n\
         J6,1992-01-01,300,2020-01-01,,14\n\
         J7,1992-01-01,300,2010-01-01,,\n",
    )
}

pub(super) fn juvenile_current() -> Table {
    table(
        "current commitments",
        "CDCR #,Offense\n\
         J1,211\n\
         J2,187\n\
         J3,187 2ND\n\
         J4,187 (664) 2nd\n\
         J5,211\n\
         J6,211\n",
    )
}

pub(super) fn juvenile_prior() -> Table {
    table("prior commitments", "CDCR #,Offense\nJ5,192\n")
}

pub(super) fn try_evaluate(
    persons: &Table,
    current: &Table,
    prior: &Table,
    chain: &RuleChain,
) -> Result<EligibilityOutcome, EligibilityError> {
    let criteria = sorting_criteria();
    let inputs = EligibilityInputs {
        persons,
        sorting_criteria: &criteria,
        current_offenses: current,
        prior_offenses: prior,
    };
    EligibilityEngine::new(as_of()).evaluate(&inputs, chain)
}

pub(super) fn evaluate_adult(chain: &RuleChain) -> EligibilityOutcome {
    try_evaluate(&adult_demographics(), &adult_current(), &adult_prior(), chain)
        .expect("adult evaluation succeeds")
}

pub(super) fn evaluate_juvenile(chain: &RuleChain) -> EligibilityOutcome {
    try_evaluate(
        &juvenile_demographics(),
        &juvenile_current(),
        &juvenile_prior(),
        chain,
    )
    .expect("juvenile evaluation succeeds")
}

pub(super) fn chain_from_json(json: &str) -> RuleChain {
    RuleChain::from_json(json).expect("rule chain parses")
}

pub(super) fn ids(outcome: &EligibilityOutcome) -> Vec<&str> {
    outcome.eligible_ids.iter().map(String::as_str).collect()
}

/// Ids present in both the eligible set and the error set.
pub(super) fn overlapping_ids(outcome: &EligibilityOutcome) -> Vec<&str> {
    let eligible: HashSet<&str> = outcome.eligible_ids.iter().map(String::as_str).collect();
    outcome
        .errors
        .iter()
        .filter_map(|error| error.person_id.as_deref())
        .filter(|id| eligible.contains(id))
        .collect()
}
