use std::collections::HashMap;

use crate::dialect::LogDialect;

/// One parsed log line, its field values in column order.
pub type LogRecord = Vec<String>;

/// Sentinel column index for a field the parsed log does not carry.
pub const FIELD_ABSENT: i32 = -1;

/// The columnar result of parsing one log.
///
/// All records in a set have the same number of columns. `field_index`
/// maps every known field name, native and universal alike, to its column
/// or to [`FIELD_ABSENT`], so report code can address fields without
/// knowing which dialect produced the set. A set is immutable once the
/// parser hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    dialect: LogDialect,
    field_index: HashMap<String, i32>,
    records: Vec<LogRecord>,
    log_date: Option<String>,
}

impl RecordSet {
    pub(crate) fn new(
        dialect: LogDialect,
        field_index: HashMap<String, i32>,
        records: Vec<LogRecord>,
        log_date: Option<String>,
    ) -> Self {
        RecordSet {
            dialect,
            field_index,
            records,
            log_date,
        }
    }

    pub fn dialect(&self) -> LogDialect {
        self.dialect
    }

    /// Number of data records. Directive and blank lines are never counted.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&LogRecord> {
        self.records.get(row)
    }

    /// Column index of `name`, which may be a native or a universal field
    /// name. [`FIELD_ABSENT`] when the log does not carry the field or the
    /// name is unknown.
    pub fn field_index(&self, name: &str) -> i32 {
        self.field_index
            .get(name)
            .copied()
            .unwrap_or(FIELD_ABSENT)
    }

    /// Value of field `name` in record `row`. `None` when the field is
    /// absent or the row does not have that column.
    pub fn field(&self, row: usize, name: &str) -> Option<&str> {
        let index = self.field_index(name);
        if index < 0 {
            return None;
        }
        self.records
            .get(row)
            .and_then(|record| record.get(index as usize))
            .map(String::as_str)
    }

    /// The date recorded by the log's own `#Date:` directive, if it had one.
    pub fn log_date(&self) -> Option<&str> {
        self.log_date.as_deref()
    }
}
