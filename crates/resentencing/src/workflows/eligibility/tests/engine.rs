use std::collections::BTreeMap;

use super::common::*;
use crate::workflows::eligibility::{
    AttributeIssue, Cohort, EligibilityEngine, EligibilityError, EligibilityInputs,
    EligibilityOutcome, RuleChain, TimeAttribute,
};
use crate::workflows::extract::Table;

#[test]
fn adult_cohort_selects_expected_population() {
    let outcome = evaluate_adult(&Cohort::Adult.rule_chain());

    assert_eq!(ids(&outcome), vec!["P1", "P6"]);
    assert_eq!(outcome.evaluated, 7);

    let counts: Vec<_> = outcome
        .steps
        .iter()
        .map(|step| (step.name.as_str(), step.before, step.after))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("r_1", 7, 6),
            ("r_2", 6, 5),
            ("r_3", 5, 4),
            ("r_4", 4, 3),
            ("r_5", 3, 2),
        ]
    );
    assert!(outcome.steps.iter().all(|step| !step.skipped));
}

#[test]
fn person_under_fifty_is_removed_at_age_step() {
    let outcome = evaluate_adult(&Cohort::Adult.rule_chain());

    let age_step = &outcome.steps[0];
    assert_eq!(age_step.kind, "demographic_threshold");
    assert_eq!(age_step.removed(), 1);
    assert!(!outcome.is_eligible("P2"));
}

#[test]
fn missing_birth_date_goes_to_error_set_only() {
    let outcome = evaluate_adult(&Cohort::Adult.rule_chain());

    assert_eq!(outcome.errors.len(), 1);
    let error = &outcome.errors[0];
    assert_eq!(error.person_id.as_deref(), Some("P3"));
    assert_eq!(error.source_row, 2);
    assert_eq!(
        error.issues,
        vec![AttributeIssue::Missing {
            attribute: TimeAttribute::AgeYears,
            column: "Birthday".to_string(),
        }]
    );
    assert!(!outcome.is_eligible("P3"));
    assert_eq!(outcome.steps[0].before, 7);
}

#[test]
fn attempt_variant_disqualifies_listed_offense() {
    let chain = chain_from_json(
        r#"[{"name": "burglary", "description": "No current burglary or attempt",
             "kind": "current_exclude", "tables": ["Table A"],
             "implied": {"459": ["/att"]}, "permutation_depth": 1}]"#,
    );

    let outcome = evaluate_adult(&chain);

    // No time attribute is required, so P3 is evaluated here.
    assert!(!outcome.is_eligible("P3"));
    assert!(!outcome.is_eligible("P4"));
    assert_eq!(outcome.steps[0].ineligible_codes, Some(2));
    assert_eq!(outcome.steps[0].removed(), 2);
    assert_eq!(
        outcome.steps[0].matches,
        BTreeMap::from([
            ("P3".to_string(), vec!["459".to_string()]),
            ("P4".to_string(), vec!["459/att".to_string()]),
        ])
    );
}

#[test]
fn attempt_is_not_disqualifying_without_implied_variant() {
    let chain = chain_from_json(
        r#"[{"name": "burglary", "description": "No current burglary",
             "kind": "current_exclude", "tables": ["Table A"], "permutation_depth": 0}]"#,
    );

    let outcome = evaluate_adult(&chain);

    assert!(outcome.is_eligible("P4"));
    assert_eq!(outcome.steps[0].ineligible_codes, Some(1));
}

#[test]
fn juvenile_cohort_uses_age_at_offense_and_depth_two_variants() {
    let outcome = evaluate_juvenile(&Cohort::Juvenile.rule_chain());

    assert_eq!(ids(&outcome), vec!["J1"]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].person_id.as_deref(), Some("J7"));

    let counts: Vec<_> = outcome
        .steps
        .iter()
        .map(|step| (step.name.as_str(), step.before, step.after))
        .collect();
    assert_eq!(
        counts,
        vec![("r_6", 6, 5), ("r_7", 5, 3), ("r_3", 3, 2), ("r_8", 2, 1)]
    );
}

#[test]
fn disabled_rule_is_recorded_as_skipped() {
    let chain = Cohort::Adult
        .rule_chain()
        .with_enabled("r_1", false)
        .expect("rule exists");

    let outcome = evaluate_adult(&chain);

    let skipped = &outcome.steps[0];
    assert!(skipped.skipped);
    assert_eq!(skipped.before, skipped.after);
    assert!(skipped.ineligible_codes.is_none());
    assert_eq!(ids(&outcome), vec!["P1", "P2", "P6"]);
}

#[test]
fn requirement_keeps_only_matching_persons() {
    let chain = chain_from_json(
        r#"[{"name": "burglary", "description": "Serving a burglary term",
             "kind": "current_require", "tables": ["Table A"],
             "implied": {"all": ["/att"]}}]"#,
    );

    let outcome = evaluate_adult(&chain);

    assert_eq!(ids(&outcome), vec!["P3", "P4"]);
}

#[test]
fn controlling_offense_requirement_reads_person_table() {
    let chain = chain_from_json(
        r#"[{"name": "r_10", "description": "Controlling offense is a Table A offense",
             "kind": "controlling_require", "tables": ["Table A"],
             "implied": {"all": ["/att"]}}]"#,
    );

    let outcome = evaluate_adult(&chain);

    assert_eq!(ids(&outcome), vec!["P3", "P4"]);
}

#[test]
fn controlling_requirement_needs_its_column() {
    let chain = chain_from_json(
        r#"[{"name": "r_10", "description": "", "kind": "controlling_require",
             "tables": ["Table E"]}]"#,
    );

    let error = try_evaluate(
        &juvenile_demographics(),
        &juvenile_current(),
        &juvenile_prior(),
        &chain,
    )
    .expect_err("controlling column is missing");

    match error {
        EligibilityError::MissingColumn { table, column } => {
            assert_eq!(table, "demographics");
            assert_eq!(column, "Controlling Offense");
        }
        other => panic!("expected missing column, got {other:?}"),
    }
}

#[test]
fn missing_offense_column_is_fatal() {
    let current = table("current commitments", "CDCR #,Charge\nP1,187\n");

    let error = try_evaluate(
        &adult_demographics(),
        &current,
        &adult_prior(),
        &Cohort::Adult.rule_chain(),
    )
    .expect_err("schema rejected");

    assert!(matches!(
        error,
        EligibilityError::MissingColumn { ref column, .. } if column == "Offense"
    ));
}

#[test]
fn missing_birthday_column_is_fatal_for_age_rules() {
    let persons = table(
        "demographics",
        "CDCR #,Aggregate Sentence in Months,Current Admission Date\nP1,300,2000-01-01\n",
    );

    let error = try_evaluate(
        &persons,
        &adult_current(),
        &adult_prior(),
        &Cohort::Adult.rule_chain(),
    )
    .expect_err("schema rejected");

    assert!(matches!(
        error,
        EligibilityError::MissingColumn { ref column, .. } if column == "Birthday"
    ));
}

#[test]
fn offense_tables_are_not_read_by_threshold_only_chains() {
    let chain = chain_from_json(
        r#"[{"name": "r_1", "description": "Age 50 and older",
             "kind": "demographic_threshold", "attribute": "age_years", "at_least": 50}]"#,
    );

    let outcome = try_evaluate(
        &adult_demographics(),
        &Table::default(),
        &Table::default(),
        &chain,
    )
    .expect("offense tables unused");

    assert_eq!(ids(&outcome), vec!["P1", "P4", "P5", "P6", "P7", "P8"]);
}

#[test]
fn bounded_threshold_is_half_open() {
    let chain = chain_from_json(
        r#"[{"name": "sentence", "description": "Sentence of 20 to under 25 years",
             "kind": "demographic_threshold", "attribute": "aggregate_sentence_years",
             "at_least": 20, "below": 25}]"#,
    );

    let outcome = evaluate_adult(&chain);

    assert_eq!(ids(&outcome), vec!["P1", "P4", "P6"]);
}

#[test]
fn empty_ineligible_set_removes_nobody() {
    let chain = chain_from_json(
        r#"[{"name": "none", "description": "Unknown table", "kind": "prior_exclude",
             "tables": ["Table Z"]}]"#,
    );

    let outcome = evaluate_adult(&chain);

    assert_eq!(outcome.steps[0].ineligible_codes, Some(0));
    assert_eq!(outcome.steps[0].removed(), 0);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.eligible_ids.len(), 8);
}

#[test]
fn every_row_of_a_duplicated_id_is_an_error() {
    let persons = table(
        "demographics",
        "CDCR #,Birthday,Aggregate Sentence in Months,Current Admission Date\n\
         P1,1960-01-01,300,2000-01-01\n\
         P1,,300,2000-01-01\n\
         P9,1960-01-01,300,2000-01-01\n",
    );

    let outcome = try_evaluate(
        &persons,
        &adult_current(),
        &adult_prior(),
        &Cohort::Adult.rule_chain(),
    )
    .expect("evaluation succeeds");

    assert!(overlapping_ids(&outcome).is_empty());
    assert_eq!(ids(&outcome), vec!["P9"]);
    let errored: Vec<_> = outcome.errors.iter().map(|error| error.source_row).collect();
    assert_eq!(errored, vec![0, 1]);
    assert!(outcome.errors[0]
        .issues
        .contains(&AttributeIssue::DuplicatePersonId { occurrences: 2 }));
}

fn evaluate_verbatim(chain: &RuleChain) -> EligibilityOutcome {
    let persons = table("demographics", "CDCR #,Controlling Offense\nP1,PC187\nP2,pc 187\n");
    let criteria = table("sorting criteria", "Offenses,Table\nPC187,Table A\n");
    let current = table("current commitments", "CDCR #,Offense\nP1,PC187\nP2,pc 187\n");
    let prior = table("prior commitments", "CDCR #,Offense\n");
    let inputs = EligibilityInputs {
        persons: &persons,
        sorting_criteria: &criteria,
        current_offenses: &current,
        prior_offenses: &prior,
    };
    EligibilityEngine::new(as_of())
        .evaluate(&inputs, chain)
        .expect("evaluation succeeds")
}

#[test]
fn verbatim_rules_compare_codes_as_written() {
    let rule = |kind: &str, normalize: bool| {
        chain_from_json(&format!(
            r#"[{{"name": "x", "description": "", "kind": "{kind}",
                  "tables": ["Table A"], "normalize": {normalize}}}]"#
        ))
    };

    let excluded = evaluate_verbatim(&rule("current_exclude", false));
    let controlling = evaluate_verbatim(&rule("controlling_require", false));
    let required = evaluate_verbatim(&rule("current_require", false));

    assert_eq!(ids(&excluded), vec!["P2"]);
    assert_eq!(ids(&controlling), vec!["P1"]);
    assert_eq!(ids(&required), vec!["P1"]);
    assert_eq!(
        excluded.steps[0].matches,
        BTreeMap::from([("P1".to_string(), vec!["PC187".to_string()])])
    );

    assert!(ids(&evaluate_verbatim(&rule("current_exclude", true))).is_empty());
    assert_eq!(
        ids(&evaluate_verbatim(&rule("controlling_require", true))),
        vec!["P1", "P2"]
    );
}
