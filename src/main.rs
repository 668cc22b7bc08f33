use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use logsift::args::{Args, ModeArg};
use logsift::geo::{self, CountryLookup};
use logsift::session::Session;
use logsift::utils;

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);
    utils::validate_args(&args)?;

    match run(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if let Some(master) = &args.build_tables {
        let written = geo::build_reference_tables(master, &args.geo_dir)?;
        println!(
            "Wrote {} range rows under {}",
            utils::format_count(written as u64),
            args.geo_dir.display()
        );
        return Ok(());
    }

    let input = args.input.as_ref().context("an input log is required")?;
    let fields = if args.fields.is_empty() {
        None
    } else {
        Some(args.fields.clone())
    };
    let mut session = Session::new(
        input,
        args.log_type.dialect(),
        CountryLookup::from_dir(&args.geo_dir),
    )
    .with_fields(fields);

    let rendered = match args.mode {
        ModeArg::Hourly => {
            let report = session.connections_per_hour()?;
            if args.json {
                report.to_json()?
            } else {
                report.to_text()
            }
        }
        ModeArg::Country => {
            let report = session.connections_by_country()?;
            if args.json {
                report.to_json()?
            } else {
                report.to_text()
            }
        }
        ModeArg::Activity => {
            let report = session.malicious_activity()?;
            if report.is_empty() {
                "No suspicious activity found.\n".to_string()
            } else {
                report.to_string()
            }
        }
        ModeArg::Csv => {
            let output = args
                .output
                .as_ref()
                .context("--output is required with --mode csv")?;
            let lines = session.convert_to_csv(output)?;
            println!(
                "Wrote {} lines to {}",
                utils::format_count(lines as u64),
                output.display()
            );
            return Ok(());
        }
    };

    match &args.output {
        Some(path) => fs::write(path, &rendered)
            .with_context(|| format!("could not write {}", path.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}
