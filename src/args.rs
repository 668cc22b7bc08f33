use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::dialect::LogDialect;

#[derive(Parser, Debug)]
#[command(
    name = "logsift",
    about = "Parse web server access logs and report on the traffic in them",
    version,
    long_about = None
)]
pub struct Args {
    /// Access log to analyze
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Format of the input log
    #[arg(short = 't', long, value_enum, default_value = "apache")]
    pub log_type: LogTypeArg,

    /// What to produce from the log
    #[arg(short, long, value_enum, default_value = "hourly")]
    pub mode: ModeArg,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit graph reports as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Directory holding the per-octet country range tables
    #[arg(long, default_value = "ips")]
    pub geo_dir: PathBuf,

    /// Keep only this field while parsing (repeat for several)
    #[arg(long = "field", value_name = "NAME")]
    pub fields: Vec<String>,

    /// Split a start_ip,end_ip,country CSV into range tables under --geo-dir
    #[arg(long, value_name = "MASTER_CSV")]
    pub build_tables: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Log formats the parser accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTypeArg {
    /// Apache common log format
    Apache,
    /// IIS W3C extended format
    Iis,
}

impl LogTypeArg {
    pub fn dialect(self) -> LogDialect {
        match self {
            LogTypeArg::Apache => LogDialect::Apache,
            LogTypeArg::Iis => LogDialect::W3c,
        }
    }
}

/// Things the tool can produce from one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Unique client addresses per hour of day
    Hourly,
    /// Connection counts per country
    Country,
    /// Repeated-access activity report
    Activity,
    /// Convert the raw log to comma-separated values
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_with_defaults() {
        let args = Args::try_parse_from(["logsift", "--input", "access.log"]).unwrap();
        assert_eq!(args.log_type, LogTypeArg::Apache);
        assert_eq!(args.mode, ModeArg::Hourly);
        assert_eq!(args.geo_dir, PathBuf::from("ips"));
        assert!(!args.json);
        assert!(args.fields.is_empty());
    }

    #[test]
    fn test_args_parse_full_invocation() {
        let args = Args::try_parse_from([
            "logsift",
            "--input",
            "u_ex160516.log",
            "--log-type",
            "iis",
            "--mode",
            "country",
            "--field",
            "time",
            "--field",
            "c-ip",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.log_type.dialect(), LogDialect::W3c);
        assert_eq!(args.mode, ModeArg::Country);
        assert_eq!(args.fields, vec!["time".to_string(), "c-ip".to_string()]);
        assert!(args.json);
    }
}
