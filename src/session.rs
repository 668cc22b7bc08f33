use std::path::{Path, PathBuf};

use tracing::debug;

use crate::analyzer::LogAnalyzer;
use crate::dialect::LogDialect;
use crate::error::LogError;
use crate::geo::CountryLookup;
use crate::parser;
use crate::records::RecordSet;
use crate::reports::{ActivityReport, GraphReport};
use crate::utils;

/// One analysis session over one input log.
///
/// The log is parsed at most once; the parse result is cached until the
/// input path or the dialect changes. The analyzer, and with it the
/// country-lookup caches, lives as long as the session.
pub struct Session {
    input: PathBuf,
    dialect: LogDialect,
    fields: Option<Vec<String>>,
    parsed: Option<RecordSet>,
    analyzer: LogAnalyzer,
}

impl Session {
    pub fn new(input: impl Into<PathBuf>, dialect: LogDialect, countries: CountryLookup) -> Self {
        Session {
            input: input.into(),
            dialect,
            fields: None,
            parsed: None,
            analyzer: LogAnalyzer::new(countries),
        }
    }

    /// Restrict parsing to the named fields. Clears any cached parse.
    pub fn with_fields(mut self, fields: Option<Vec<String>>) -> Self {
        self.fields = fields;
        self.parsed = None;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn dialect(&self) -> LogDialect {
        self.dialect
    }

    /// Point the session at another log. Clears the cached parse when the
    /// path actually changes.
    pub fn set_input(&mut self, input: impl Into<PathBuf>) {
        let input = input.into();
        if input != self.input {
            debug!(
                action = "invalidate",
                component = "session",
                input = %input.display(),
                "Input changed, dropping cached parse"
            );
            self.input = input;
            self.parsed = None;
        }
    }

    /// Switch the expected dialect. Clears the cached parse when the
    /// dialect actually changes.
    pub fn set_dialect(&mut self, dialect: LogDialect) {
        if dialect != self.dialect {
            debug!(
                action = "invalidate",
                component = "session",
                dialect = %dialect,
                "Dialect changed, dropping cached parse"
            );
            self.dialect = dialect;
            self.parsed = None;
        }
    }

    /// The parsed records, parsing the input first if no cached set exists.
    pub fn records(&mut self) -> Result<&RecordSet, LogError> {
        self.ensure_parsed()?;
        match &self.parsed {
            Some(set) => Ok(set),
            None => Err(LogError::EmptyOrUnparsable),
        }
    }

    pub fn connections_per_hour(&mut self) -> Result<GraphReport, LogError> {
        self.ensure_parsed()?;
        match &self.parsed {
            Some(set) => Ok(self.analyzer.connections_per_hour(set)),
            None => Err(LogError::EmptyOrUnparsable),
        }
    }

    pub fn connections_by_country(&mut self) -> Result<GraphReport, LogError> {
        self.ensure_parsed()?;
        match &self.parsed {
            Some(set) => Ok(self.analyzer.connections_by_country(set)),
            None => Err(LogError::EmptyOrUnparsable),
        }
    }

    pub fn malicious_activity(&mut self) -> Result<ActivityReport, LogError> {
        self.ensure_parsed()?;
        match &self.parsed {
            Some(set) => Ok(self.analyzer.malicious_activity_report(set)),
            None => Err(LogError::EmptyOrUnparsable),
        }
    }

    /// Rewrite the raw input as comma-separated values at `output`. Works
    /// on the raw lines and leaves the cached parse alone.
    pub fn convert_to_csv(&self, output: &Path) -> Result<usize, LogError> {
        utils::convert_file_to_csv(&self.input, output)
    }

    fn ensure_parsed(&mut self) -> Result<(), LogError> {
        if self.parsed.is_some() {
            return Ok(());
        }
        let set = match &self.fields {
            Some(fields) => {
                let names: Vec<&str> = fields.iter().map(String::as_str).collect();
                parser::parse_file_projected(self.dialect, &self.input, &names)?
            }
            None => parser::parse_file(self.dialect, &self.input)?,
        };
        self.parsed = Some(set);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{IpRangeEntry, RangeSource};
    use crate::reports::ReportSeries;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    struct NoTables;

    impl RangeSource for NoTables {
        fn load(&self, _first_octet: u8) -> Option<Vec<IpRangeEntry>> {
            None
        }
    }

    fn session_for(path: &Path) -> Session {
        Session::new(path, LogDialect::Apache, CountryLookup::new(Box::new(NoTables)))
    }

    const LOG: &str = concat!(
        r#"73.83.18.52 - - [04/Apr/2018:19:30:50 +0000] "GET / HTTP/1.1" 200 1108 "-" "UA""#,
        "\n",
        r#"26.25.144.84 - - [04/Apr/2018:20:31:02 +0000] "GET /a HTTP/1.1" 200 90 "-" "UA""#,
        "\n",
    );

    #[test]
    fn test_session_parses_once_and_caches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        fs::write(&path, LOG).unwrap();
        let mut session = session_for(&path);
        assert_eq!(session.records().unwrap().len(), 2);
        // The cached set answers even after the file is gone.
        fs::remove_file(&path).unwrap();
        assert_eq!(session.records().unwrap().len(), 2);
    }

    #[test]
    fn test_changing_the_input_drops_the_cache() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.log");
        let second = dir.path().join("b.log");
        fs::write(&first, LOG).unwrap();
        fs::write(&second, LOG.lines().next().unwrap()).unwrap();
        let mut session = session_for(&first);
        assert_eq!(session.records().unwrap().len(), 2);
        session.set_input(&second);
        assert_eq!(session.records().unwrap().len(), 1);
        // Setting the same path again keeps the cache.
        fs::remove_file(&second).unwrap();
        session.set_input(&second);
        assert_eq!(session.records().unwrap().len(), 1);
    }

    #[test]
    fn test_changing_the_dialect_drops_the_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        fs::write(&path, LOG).unwrap();
        let mut session = session_for(&path);
        assert!(session.records().is_ok());
        session.set_dialect(LogDialect::W3c);
        // The same bytes are not W3C data.
        assert!(matches!(
            session.records(),
            Err(LogError::DialectMismatch { .. })
        ));
    }

    #[test]
    fn test_session_reports_run_against_the_cached_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        fs::write(&path, LOG).unwrap();
        let mut session = session_for(&path);
        let report = session.connections_per_hour().unwrap();
        match report.series {
            ReportSeries::Flat(buckets) => {
                assert_eq!(buckets["19"], 1);
                assert_eq!(buckets["20"], 1);
            }
            other => panic!("expected a flat series, got {other:?}"),
        }
        assert!(session.malicious_activity().unwrap().is_empty());
        let countries = session.connections_by_country().unwrap();
        match countries.series {
            ReportSeries::Flat(buckets) => assert_eq!(buckets["INV"], 2),
            other => panic!("expected a flat series, got {other:?}"),
        }
    }

    #[test]
    fn test_session_honors_field_projection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        fs::write(&path, LOG).unwrap();
        let mut session = session_for(&path)
            .with_fields(Some(vec!["time".to_string(), "client-ip".to_string()]));
        let records = session.records().unwrap();
        assert_eq!(records.record(0).unwrap().len(), 2);
        assert_eq!(records.field_index("uri-stem"), crate::records::FIELD_ABSENT);
    }
}
