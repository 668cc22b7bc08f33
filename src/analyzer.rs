use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use tracing::info;

use crate::dialect::{FIELD_CLIENT_IP, FIELD_DATE, FIELD_TIMESTAMP, FIELD_URI_STEM};
use crate::geo::CountryLookup;
use crate::records::RecordSet;
use crate::reports::{ActivityReport, GraphReport, ReportSeries};

/// Two digit-concatenated timestamps belong to the same burst when they
/// differ by less than this.
const BURST_GAP: i64 = 11;
/// How many prior entries the walk re-inspects after moving its anchor.
const BURST_LOOKBACK: usize = 9;
/// More than this many hits inside one window marks traffic as dense.
const BURST_LIMIT: u32 = 3;
/// A URL repeated more than this many times in a row is a repeat target.
const REPEAT_LIMIT: usize = 3;

/// Derives reports from a parsed [`RecordSet`]. Keeps the country lookup,
/// and with it the per-octet table cache, alive across reports.
pub struct LogAnalyzer {
    countries: CountryLookup,
}

impl LogAnalyzer {
    pub fn new(countries: CountryLookup) -> Self {
        LogAnalyzer { countries }
    }

    /// Unique client addresses per hour of day. Grouped per date when the
    /// records span more than one date.
    pub fn connections_per_hour(&self, log: &RecordSet) -> GraphReport {
        let start = Instant::now();
        let mut groups: BTreeMap<String, BTreeMap<String, HashSet<String>>> = BTreeMap::new();
        for row in 0..log.len() {
            let Some(timestamp) = log.field(row, FIELD_TIMESTAMP) else {
                continue;
            };
            let Some(ip) = log.field(row, FIELD_CLIENT_IP) else {
                continue;
            };
            let hour = timestamp.get(..2).unwrap_or(timestamp).to_string();
            groups
                .entry(row_date(log, row))
                .or_default()
                .entry(hour)
                .or_default()
                .insert(ip.to_string());
        }
        let counted = groups
            .into_iter()
            .map(|(date, hours)| {
                let hours = hours
                    .into_iter()
                    .map(|(hour, ips)| (hour, ips.len() as u64))
                    .collect();
                (date, hours)
            })
            .collect();
        let series = to_series(counted);
        info!(
            action = "complete",
            component = "analyzer",
            report = "connections_per_hour",
            bucket_count = series.bucket_count(),
            duration_ms = start.elapsed().as_millis(),
            "Built hourly connection report"
        );
        GraphReport {
            title: "Connections Per Hour",
            x_label: "Hour of Day",
            y_label: "Unique IPs Recorded",
            series,
        }
    }

    /// Connection counts per country of the client address. Grouped per
    /// date when the records span more than one date.
    pub fn connections_by_country(&mut self, log: &RecordSet) -> GraphReport {
        let start = Instant::now();
        let mut groups: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for row in 0..log.len() {
            let Some(ip) = log.field(row, FIELD_CLIENT_IP) else {
                continue;
            };
            let country = self.countries.lookup(ip);
            *groups
                .entry(row_date(log, row))
                .or_default()
                .entry(country)
                .or_insert(0) += 1;
        }
        let series = to_series(groups);
        info!(
            action = "complete",
            component = "analyzer",
            report = "connections_by_country",
            bucket_count = series.bucket_count(),
            duration_ms = start.elapsed().as_millis(),
            "Built country connection report"
        );
        GraphReport {
            title: "Connections by Country",
            x_label: "Country Code",
            y_label: "Unique Connections",
            series,
        }
    }

    /// Repeated-access report: addresses that fetched the same URL more
    /// than three times and whose request timing shows a dense burst.
    /// Addresses are reported in the order they first appear in the log.
    pub fn malicious_activity_report(&self, log: &RecordSet) -> ActivityReport {
        let start = Instant::now();
        let mut order: Vec<String> = Vec::new();
        let mut visits: HashMap<String, (Vec<i64>, Vec<String>)> = HashMap::new();
        for row in 0..log.len() {
            let Some(ip) = log.field(row, FIELD_CLIENT_IP) else {
                continue;
            };
            let Some(timestamp) = log.field(row, FIELD_TIMESTAMP) else {
                continue;
            };
            let Some(url) = log.field(row, FIELD_URI_STEM) else {
                continue;
            };
            let digits: String = timestamp.chars().filter(|c| c.is_ascii_digit()).collect();
            let Ok(stamp) = digits.parse::<i64>() else {
                continue;
            };
            let (stamps, urls) = visits.entry(ip.to_string()).or_insert_with(|| {
                order.push(ip.to_string());
                (Vec::new(), Vec::new())
            });
            stamps.push(stamp);
            urls.push(url.to_string());
        }

        let mut text = String::new();
        let mut suspects = 0usize;
        for ip in &order {
            let Some((mut stamps, mut urls)) = visits.remove(ip) else {
                continue;
            };
            stamps.sort_unstable();
            urls.sort_unstable();
            let repeated = repeated_urls(&urls);
            if repeated.is_empty() || !has_burst(&stamps) {
                continue;
            }
            suspects += 1;
            text.push_str(&format!("Malicious activity detected from {ip}\n"));
            for url in repeated {
                text.push_str(&format!(
                    "{url} was accessed more than three times within ten seconds by {ip}\n"
                ));
            }
        }
        info!(
            action = "complete",
            component = "analyzer",
            report = "malicious_activity",
            suspect_count = suspects,
            duration_ms = start.elapsed().as_millis(),
            "Built repeated-access report"
        );
        ActivityReport::new(text)
    }
}

/// Date bucket for one record: the record's own date field when it has
/// one, the log-wide directive date otherwise, a blank bucket failing both.
fn row_date(log: &RecordSet, row: usize) -> String {
    log.field(row, FIELD_DATE)
        .or_else(|| log.log_date())
        .unwrap_or_default()
        .to_string()
}

/// Collapse the per-date grouping to a flat series when everything sits
/// under a single date.
fn to_series(groups: BTreeMap<String, BTreeMap<String, u64>>) -> ReportSeries {
    if groups.len() > 1 {
        ReportSeries::ByDate(groups)
    } else {
        ReportSeries::Flat(groups.into_values().next().unwrap_or_default())
    }
}

/// URLs appearing more than [`REPEAT_LIMIT`] times in a row in one
/// address's sorted request list, in the order they cross the limit.
fn repeated_urls(urls: &[String]) -> Vec<String> {
    let mut repeated: Vec<String> = Vec::new();
    let mut run = 1usize;
    for pair in urls.windows(2) {
        if pair[1] == pair[0] {
            run += 1;
            if run > REPEAT_LIMIT && !repeated.contains(&pair[1]) {
                repeated.push(pair[1].clone());
            }
        } else {
            run = 1;
        }
    }
    repeated
}

/// Anchored-window walk over one address's sorted timestamps. Values
/// within [`BURST_GAP`] of the anchor bump a counter. A wider gap moves
/// the anchor to the first occurrence of the offending value, clears the
/// counter and re-seeds it from up to [`BURST_LOOKBACK`] entries behind
/// the new anchor, stopping at the head of the list. Once the counter
/// exceeds [`BURST_LIMIT`] the address stays marked dense.
fn has_burst(stamps: &[i64]) -> bool {
    let mut dense = false;
    let mut counter = 0u32;
    let mut anchor = 0usize;
    for (position, stamp) in stamps.iter().enumerate() {
        if stamp - stamps[anchor] < BURST_GAP {
            counter += 1;
        } else {
            anchor = stamps
                .iter()
                .position(|other| other == stamp)
                .unwrap_or(position);
            counter = 0;
            for back in 1..=BURST_LOOKBACK {
                if back > anchor {
                    break;
                }
                if stamps[anchor] - stamps[anchor - back] < BURST_GAP {
                    counter += 1;
                }
            }
        }
        if counter > BURST_LIMIT {
            dense = true;
        }
    }
    dense
}
