use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::dialect::LogDialect;
use crate::error::LogError;
use crate::records::{LogRecord, RecordSet, FIELD_ABSENT};

/// Value stored in columns the Apache schema refuses to read off a line.
const PLACEHOLDER: &str = "-";

// <client> <identd> <userid> [<date>:<time> <zone>] "<request>" <status> <bytes> ...
static COMMON_LOG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+) \S+ \S+ \[(?P<date>[^:\]]+):(?P<time>[^ \]]+) [^\]]+\] "(?P<request>[^"]*)" (?P<status>\S+) (?P<bytes>\S+)"#,
    )
    .unwrap()
});

/// Parse the log file at `path` into a [`RecordSet`].
pub fn parse_file(dialect: LogDialect, path: &Path) -> Result<RecordSet, LogError> {
    let file = File::open(path).map_err(|e| LogError::io("open", path, e))?;
    parse(dialect, BufReader::new(file), None, path)
}

/// Like [`parse_file`], but keeps only the named fields (native or
/// universal names), in the order given. A requested field the log does
/// not carry contributes no column and stays mapped to [`FIELD_ABSENT`].
pub fn parse_file_projected(
    dialect: LogDialect,
    path: &Path,
    fields: &[&str],
) -> Result<RecordSet, LogError> {
    let file = File::open(path).map_err(|e| LogError::io("open", path, e))?;
    parse(dialect, BufReader::new(file), Some(fields), path)
}

/// Parse log lines from any buffered reader. Read failures are reported
/// against the pseudo path `-`.
pub fn parse_reader<R: BufRead>(dialect: LogDialect, reader: R) -> Result<RecordSet, LogError> {
    parse(dialect, reader, None, Path::new("-"))
}

/// Projected variant of [`parse_reader`].
pub fn parse_reader_projected<R: BufRead>(
    dialect: LogDialect,
    reader: R,
    fields: &[&str],
) -> Result<RecordSet, LogError> {
    parse(dialect, reader, Some(fields), Path::new("-"))
}

fn parse<R: BufRead>(
    dialect: LogDialect,
    reader: R,
    requested: Option<&[&str]>,
    origin: &Path,
) -> Result<RecordSet, LogError> {
    let start = Instant::now();
    let set = match dialect {
        LogDialect::Apache => parse_apache(reader, requested, origin),
        LogDialect::W3c => parse_w3c(reader, requested, origin),
    }?;
    info!(
        action = "complete",
        component = "parser",
        dialect = %dialect,
        record_count = set.len(),
        duration_ms = start.elapsed().as_millis(),
        "Parsed log input"
    );
    Ok(set)
}

fn parse_apache<R: BufRead>(
    reader: R,
    requested: Option<&[&str]>,
    origin: &Path,
) -> Result<RecordSet, LogError> {
    let table = LogDialect::Apache.field_table();
    let projection = requested.map(|fields| resolve_fixed_projection(table, fields));
    let mut records: Vec<LogRecord> = Vec::new();
    let mut saw_content = false;
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line.map_err(|e| LogError::io("read", origin, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        saw_content = true;
        let Some(record) = apache_record(line) else {
            skipped += 1;
            continue;
        };
        match &projection {
            Some((sources, _)) => records.push(project(&record, sources)),
            None => records.push(record),
        }
    }

    if skipped > 0 {
        warn!(
            action = "skip",
            component = "parser",
            skipped_lines = skipped,
            "Lines did not match the common log shape"
        );
    }
    if records.is_empty() {
        return Err(if saw_content {
            LogError::DialectMismatch {
                dialect: LogDialect::Apache,
            }
        } else {
            LogError::EmptyOrUnparsable
        });
    }

    let field_index = match projection {
        Some((_, index)) => index,
        None => full_index(table),
    };
    Ok(RecordSet::new(LogDialect::Apache, field_index, records, None))
}

/// Break one common-log line into the fixed eight-column record. `None`
/// when the line does not have the expected shape. Only GET requests carry
/// their target and result through; other methods keep placeholders in the
/// uri-stem, status and bytes columns.
fn apache_record(line: &str) -> Option<LogRecord> {
    let caps = COMMON_LOG_REGEX.captures(line)?;
    let request = &caps["request"];
    let method = match request.split_once('/') {
        Some((before, _)) => before.to_string(),
        None => request.to_string(),
    };
    let (uri_stem, status, bytes) = if method.contains("GET") {
        let stem = request.split_whitespace().nth(1)?;
        (
            stem.to_string(),
            caps["status"].to_string(),
            caps["bytes"].to_string(),
        )
    } else {
        (
            PLACEHOLDER.to_string(),
            PLACEHOLDER.to_string(),
            PLACEHOLDER.to_string(),
        )
    };
    Some(vec![
        caps["date"].to_string(),
        caps["time"].to_string(),
        caps["ip"].to_string(),
        method,
        uri_stem,
        status,
        bytes,
        PLACEHOLDER.to_string(),
    ])
}

fn parse_w3c<R: BufRead>(
    reader: R,
    requested: Option<&[&str]>,
    origin: &Path,
) -> Result<RecordSet, LogError> {
    let table = LogDialect::W3c.field_table();
    // Native-name column positions discovered from #Fields: directives.
    let mut columns: Vec<i32> = vec![FIELD_ABSENT; table.len()];
    let mut sources: Vec<i32> = Vec::new();
    let mut fields_seen = false;
    let mut log_date: Option<String> = None;
    let mut records: Vec<LogRecord> = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(|e| LogError::io("read", origin, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(directive) = line.strip_prefix('#') {
            if directive.starts_with("Date") {
                // Only the first #Date: directive is recorded.
                if log_date.is_none() {
                    log_date = directive.split_whitespace().nth(1).map(str::to_string);
                }
            } else if directive.starts_with("Fields") {
                fields_seen = true;
                // The directive token occupies position zero, so a field
                // named at token position p lives at data column p - 1.
                for (position, token) in line.split_whitespace().enumerate().skip(1) {
                    if let Some(slot) = table_slot(table, token) {
                        columns[slot] = (position - 1) as i32;
                    }
                }
                if let Some(fields) = requested {
                    sources = resolve_w3c_sources(table, &columns, fields);
                }
            }
            continue;
        }
        if !fields_seen {
            // Data ahead of any #Fields: directive is not W3C data.
            return Err(LogError::DialectMismatch {
                dialect: LogDialect::W3c,
            });
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        let record: LogRecord = match requested {
            Some(_) => sources
                .iter()
                .map(|&source| {
                    values
                        .get(source as usize)
                        .map(|value| (*value).to_string())
                        .unwrap_or_else(|| PLACEHOLDER.to_string())
                })
                .collect(),
            None => values.iter().map(|value| (*value).to_string()).collect(),
        };
        records.push(record);
    }

    if records.is_empty() {
        return Err(LogError::EmptyOrUnparsable);
    }

    let field_index = match requested {
        Some(fields) => w3c_projected_index(table, &columns, fields),
        None => {
            let mut index = HashMap::new();
            for (slot, (native, universal)) in table.iter().enumerate() {
                index.insert((*native).to_string(), columns[slot]);
                index.insert((*universal).to_string(), columns[slot]);
            }
            index
        }
    };
    Ok(RecordSet::new(LogDialect::W3c, field_index, records, log_date))
}

/// Position of `name` in the alias table, matched against either the
/// native or the universal spelling. Matching is exact.
fn table_slot(table: &[(&str, &str)], name: &str) -> Option<usize> {
    table
        .iter()
        .position(|(native, universal)| *native == name || *universal == name)
}

fn resolve_fixed_projection(
    table: &'static [(&'static str, &'static str)],
    fields: &[&str],
) -> (Vec<usize>, HashMap<String, i32>) {
    let mut sources = Vec::new();
    let mut index = absent_index(table);
    for name in fields {
        if let Some(slot) = table_slot(table, name) {
            index.insert(table[slot].0.to_string(), sources.len() as i32);
            index.insert(table[slot].1.to_string(), sources.len() as i32);
            sources.push(slot);
        }
    }
    (sources, index)
}

fn resolve_w3c_sources(table: &[(&str, &str)], columns: &[i32], fields: &[&str]) -> Vec<i32> {
    fields
        .iter()
        .filter_map(|name| {
            table_slot(table, name)
                .map(|slot| columns[slot])
                .filter(|&column| column >= 0)
        })
        .collect()
}

fn w3c_projected_index(
    table: &[(&str, &str)],
    columns: &[i32],
    fields: &[&str],
) -> HashMap<String, i32> {
    let mut index = absent_index(table);
    let mut kept = 0i32;
    for name in fields {
        if let Some(slot) = table_slot(table, name) {
            if columns[slot] >= 0 {
                index.insert(table[slot].0.to_string(), kept);
                index.insert(table[slot].1.to_string(), kept);
                kept += 1;
            }
        }
    }
    index
}

fn absent_index(table: &[(&str, &str)]) -> HashMap<String, i32> {
    let mut index = HashMap::new();
    for (native, universal) in table {
        index.insert((*native).to_string(), FIELD_ABSENT);
        index.insert((*universal).to_string(), FIELD_ABSENT);
    }
    index
}

fn full_index(table: &[(&str, &str)]) -> HashMap<String, i32> {
    let mut index = HashMap::new();
    for (column, (native, universal)) in table.iter().enumerate() {
        index.insert((*native).to_string(), column as i32);
        index.insert((*universal).to_string(), column as i32);
    }
    index
}

fn project(record: &LogRecord, sources: &[usize]) -> LogRecord {
    sources.iter().map(|&source| record[source].clone()).collect()
}
