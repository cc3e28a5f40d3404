use std::process::ExitCode;

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info};

use grubcheck::{
    cli::{Cli, Commands},
    Verdict,
};

fn run_grubcheck(args: &Cli) -> Result<Verdict, Error> {
    info!("grubcheck version: {}", grubcheck::GRUBCHECK_VERSION);

    let res = match &args.command {
        Commands::Scan { files, rules } => grubcheck::scan_files(files.as_slice(), &rules.rules()),
        Commands::Diff {
            baseline,
            candidate,
            profile,
        } => grubcheck::diff_files(baseline, candidate, (*profile).into()),
        Commands::Normalize { file, profile } => {
            grubcheck::normalize_file(file, (*profile).into()).map(|()| Verdict::Passed)
        }
        Commands::Check { plan, report } => grubcheck::check(plan, report.as_deref()),
        Commands::Plan { image } => {
            grubcheck::print_default_plan(image.as_deref()).map(|()| Verdict::Passed)
        }
    };

    res.with_context(|| format!("Failed to execute '{}' command", args.command))
}

fn setup_logging(args: &Cli) -> Result<(), Error> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbosity)
        .try_init()
        .context("Logger already registered")
}

fn main() -> ExitCode {
    // Parse args
    let args = Cli::parse();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    match run_grubcheck(&args) {
        Ok(Verdict::Passed) => ExitCode::SUCCESS,
        Ok(Verdict::Failed) => ExitCode::from(2),
        Err(e) => {
            error!("grubcheck failed: {e:?}");
            ExitCode::from(3)
        }
    }
}
