use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::utils::format_count;

/// Counts per bucket, grouped per date when the source records span more
/// than one date. Buckets and dates stay in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReportSeries {
    Flat(BTreeMap<String, u64>),
    ByDate(BTreeMap<String, BTreeMap<String, u64>>),
}

impl ReportSeries {
    /// Total number of buckets across all groups.
    pub fn bucket_count(&self) -> usize {
        match self {
            ReportSeries::Flat(buckets) => buckets.len(),
            ReportSeries::ByDate(groups) => groups.values().map(BTreeMap::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bucket_count() == 0
    }
}

/// A graphable histogram and the labels a front end needs to draw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphReport {
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub series: ReportSeries,
}

impl GraphReport {
    /// Plain text rendering, one `bucket: count` line per bucket.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("--- {} ---\n", self.title));
        out.push_str(&format!("{} by {}\n\n", self.y_label, self.x_label));
        match &self.series {
            ReportSeries::Flat(buckets) => {
                for (bucket, count) in buckets {
                    out.push_str(&format!("{bucket}: {}\n", format_count(*count)));
                }
            }
            ReportSeries::ByDate(groups) => {
                for (date, buckets) in groups {
                    out.push_str(&format!("{date}:\n"));
                    for (bucket, count) in buckets {
                        out.push_str(&format!("  {bucket}: {}\n", format_count(*count)));
                    }
                }
            }
        }
        out
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        Ok(rendered)
    }
}

/// The repeated-access text report. Empty when nothing was flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityReport {
    text: String,
}

impl ActivityReport {
    pub(crate) fn new(text: String) -> Self {
        ActivityReport { text }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ActivityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
