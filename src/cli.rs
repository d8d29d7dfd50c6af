use crate::evaluate::{self, EvaluateArgs, RulesArgs};
use clap::{Parser, Subcommand};
use resentencing::config::AppConfig;
use resentencing::error::AppError;
use resentencing::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "resentencing",
    about = "Screen CDCR population exports for statutory resentencing eligibility",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a cohort against one county's exports
    Evaluate(EvaluateArgs),
    /// Print a built-in cohort rule chain as JSON
    Rules(RulesArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate(args) => {
            let config = AppConfig::load()?;
            telemetry::init(&config.telemetry)?;
            evaluate::run(args, &config)
        }
        Command::Rules(args) => evaluate::print_rules(args),
    }
}
