use chrono::NaiveDate;
use clap::{ArgGroup, Args};
use resentencing::config::{parse_as_of, AppConfig};
use resentencing::error::AppError;
use resentencing::workflows::eligibility::{
    Cohort, ColumnNames, EligibilityEngine, EligibilityInputs, EligibilityOutcome,
    ReportAssembler, RuleChain, StepReport,
};
use resentencing::workflows::extract::Table;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("chain").required(true).args(["cohort", "rules"])))]
pub(crate) struct EvaluateArgs {
    /// Built-in cohort to evaluate (adult or juvenile)
    #[arg(long, value_parser = parse_cohort)]
    pub(crate) cohort: Option<Cohort>,
    /// JSON rule file to evaluate instead of a built-in cohort
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Disable a rule of the chain by name (repeatable)
    #[arg(long, value_name = "RULE")]
    pub(crate) disable: Vec<String>,
    /// County directory under the data path
    #[arg(long)]
    pub(crate) county: Option<String>,
    /// Month directory under the county
    #[arg(long)]
    pub(crate) month: Option<String>,
    /// Demographics export (defaults to <county>/<month>/demographics.csv)
    #[arg(long)]
    pub(crate) demographics: Option<PathBuf>,
    /// Current commitments export
    #[arg(long)]
    pub(crate) current: Option<PathBuf>,
    /// Prior commitments export
    #[arg(long)]
    pub(crate) prior: Option<PathBuf>,
    /// Sorting criteria (defaults to <county>/Criteria/sorting_criteria.csv)
    #[arg(long)]
    pub(crate) criteria: Option<PathBuf>,
    /// JSON file overriding the export column names
    #[arg(long)]
    pub(crate) columns: Option<PathBuf>,
    /// Evaluation date (YYYY-MM-DD), defaults to RESENTENCING_AS_OF or today
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Directory for exported reports
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Write eligible and error rows as CSV reports
    #[arg(long)]
    pub(crate) export: bool,
    /// Print the outcome as JSON instead of a text summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RulesArgs {
    /// Cohort whose rule chain is printed
    #[arg(long, value_parser = parse_cohort)]
    pub(crate) cohort: Cohort,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    chain: &'a str,
    as_of: NaiveDate,
    eligible: usize,
    errors: usize,
    #[serde(flatten)]
    outcome: &'a EligibilityOutcome,
}

fn parse_cohort(raw: &str) -> Result<Cohort, String> {
    raw.parse()
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_as_of(raw).map_err(|err| err.to_string())
}

pub(crate) fn print_rules(args: RulesArgs) -> Result<(), AppError> {
    println!("{}", args.cohort.rule_chain().to_json_pretty()?);
    Ok(())
}

pub(crate) fn run(args: EvaluateArgs, config: &AppConfig) -> Result<(), AppError> {
    let mut data = config.data.clone();
    if let Some(county) = args.county.clone() {
        data.county = Some(county);
    }
    if let Some(month) = args.month.clone() {
        data.month = Some(month);
    }
    let location = data.location();
    let as_of = args.as_of.unwrap_or_else(|| config.as_of_or_today());

    let (label, chain) = resolve_chain(&args)?;
    let columns = match &args.columns {
        Some(path) => serde_json::from_str::<ColumnNames>(&fs::read_to_string(path)?)?,
        None => ColumnNames::default(),
    };

    let persons = load(
        "demographics",
        args.demographics.clone(),
        location.demographics_path(),
    )?;
    let needs = chain.required_inputs();
    let current = load_if(
        needs.current_offenses || args.export,
        "current commitments",
        args.current.clone(),
        location.current_commitments_path(),
    )?;
    let prior = load_if(
        needs.prior_offenses,
        "prior commitments",
        args.prior.clone(),
        location.prior_commitments_path(),
    )?;
    let criteria = load_if(
        needs.sorting_criteria,
        "sorting criteria",
        args.criteria.clone(),
        location.criteria_path().to_path_buf(),
    )?;

    info!(
        chain = %label,
        %as_of,
        persons = persons.len(),
        input_dir = %location.input_dir().display(),
        "evaluating eligibility"
    );

    let engine = EligibilityEngine::new(as_of).with_columns(columns);
    let inputs = EligibilityInputs {
        persons: &persons,
        sorting_criteria: &criteria,
        current_offenses: &current,
        prior_offenses: &prior,
    };
    let outcome = engine.evaluate(&inputs, &chain)?;

    if args.json {
        let summary = RunSummary {
            chain: &label,
            as_of,
            eligible: outcome.eligible_ids.len(),
            errors: outcome.errors.len(),
            outcome: &outcome,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_summary(&label, as_of, &outcome));
    }

    if args.export {
        let directory = args
            .output
            .clone()
            .unwrap_or_else(|| location.output_dir().to_path_buf());
        let reports = ReportAssembler::new(engine.columns(), label.as_str()).export(
            &directory,
            &persons,
            &current,
            &outcome,
        )?;
        if !args.json {
            println!("Reports written:");
            for path in [
                &reports.eligible_demographics,
                &reports.eligible_current_offenses,
                &reports.errors,
            ] {
                println!("  - {}", path.display());
            }
        }
    }

    Ok(())
}

fn load(name: &str, explicit: Option<PathBuf>, default: PathBuf) -> Result<Table, AppError> {
    let path = explicit.unwrap_or(default);
    Ok(Table::from_path(name, &path)?)
}

/// Exports no enabled rule reads are not opened; an empty table stands in for them.
fn load_if(
    needed: bool,
    name: &str,
    explicit: Option<PathBuf>,
    default: PathBuf,
) -> Result<Table, AppError> {
    if needed {
        load(name, explicit, default)
    } else {
        debug!(table = name, "export not read by any enabled rule");
        Ok(Table::new(name, Vec::new(), Vec::new())?)
    }
}

/// Rule chain and the label used for report file names.
fn resolve_chain(args: &EvaluateArgs) -> Result<(String, RuleChain), AppError> {
    let (label, mut chain) = match &args.rules {
        Some(path) => (
            rules_label(path),
            RuleChain::from_json(&fs::read_to_string(path)?)?,
        ),
        None => {
            let cohort = args.cohort.unwrap_or(Cohort::Adult);
            (cohort.slug().to_string(), cohort.rule_chain())
        }
    };

    for name in &args.disable {
        chain = chain.with_enabled(name, false)?;
    }

    Ok((label, chain))
}

fn rules_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("custom")
        .to_string()
}

fn render_summary(label: &str, as_of: NaiveDate, outcome: &EligibilityOutcome) -> String {
    let mut lines = vec![
        format!("Eligibility screening: {label} (as of {as_of})"),
        format!(
            "- {} persons evaluated | {} rows routed to errors",
            outcome.evaluated,
            outcome.errors.len()
        ),
        "Rule steps:".to_string(),
    ];
    lines.extend(outcome.steps.iter().map(render_step));
    lines.push(format!("Eligible: {}", outcome.eligible_ids.len()));
    if !outcome.errors.is_empty() {
        lines.push("Errors:".to_string());
        lines.extend(outcome.errors.iter().map(|error| {
            format!(
                "  - row {} ({}): {}",
                error.source_row + 1,
                error.person_id.as_deref().unwrap_or("no id"),
                error.reason()
            )
        }));
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

fn render_step(step: &StepReport) -> String {
    if step.skipped {
        return format!("  - {} {} (disabled)", step.name, step.description);
    }
    let codes = step
        .ineligible_codes
        .map(|codes| format!(" | {codes} ineligible codes"))
        .unwrap_or_default();
    format!(
        "  - {} {}: {} -> {}{}",
        step.name, step.description, step.before, step.after, codes
    )
}
