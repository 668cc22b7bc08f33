use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use time::macros::format_description;
use tracing::info;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

use crate::args::ModeArg;
use crate::error::LogError;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// `verbose` flag when it is set.
pub fn setup_logging(verbose: bool) {
    let fallback = if verbose { "info" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(LocalTime::new(format_description!(
            "[hour]:[minute]:[second]"
        )))
        .with_target(false)
        .init();
}

/// One log line as a CSV row: every run of whitespace becomes one comma.
/// Trailing whitespace, the carriage return of CRLF logs included, is
/// dropped rather than turned into a trailing comma.
pub fn csv_line(line: &str) -> String {
    WHITESPACE_RUN
        .replace_all(line.trim_end(), ",")
        .into_owned()
}

/// Rewrite log lines from `reader` as comma-separated values. Line order
/// and count are preserved. Returns the number of lines written.
pub fn lines_to_csv<R: BufRead, W: Write>(reader: R, mut out: W) -> io::Result<usize> {
    let mut count = 0usize;
    for line in reader.lines() {
        writeln!(out, "{}", csv_line(&line?))?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

/// CSV-convert the log at `input` into a new file at `output`.
pub fn convert_file_to_csv(input: &Path, output: &Path) -> Result<usize, LogError> {
    let reader = BufReader::new(File::open(input).map_err(|e| LogError::io("open", input, e))?);
    let mut writer =
        BufWriter::new(File::create(output).map_err(|e| LogError::io("create", output, e))?);
    let mut count = 0usize;
    for line in reader.lines() {
        let line = line.map_err(|e| LogError::io("read", input, e))?;
        writeln!(writer, "{}", csv_line(&line)).map_err(|e| LogError::io("write", output, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| LogError::io("write", output, e))?;
    info!(
        action = "complete",
        component = "csv_convert",
        line_count = count,
        output = %output.display(),
        "Converted log to comma-separated values"
    );
    Ok(count)
}

pub fn format_count(num: u64) -> String {
    num.to_string()
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn validate_args(args: &crate::args::Args) -> anyhow::Result<()> {
    if args.input.is_none() && args.build_tables.is_none() {
        anyhow::bail!("an input log is required unless --build-tables is used");
    }

    if args.mode == ModeArg::Csv && args.output.is_none() {
        anyhow::bail!("--output is required with --mode csv");
    }

    if args.json && !matches!(args.mode, ModeArg::Hourly | ModeArg::Country) {
        anyhow::bail!("--json applies only to the graph reports");
    }

    Ok(())
}
