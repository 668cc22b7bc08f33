use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::LogError;

/// Country code returned for addresses that cannot be resolved.
pub const UNRESOLVED: &str = "INV";
/// Country code for high reserved space that ships without a table.
pub const RESERVED: &str = "ZZ";
/// First octet at or above which a missing table means reserved space.
const RESERVED_FIRST_OCTET: u8 = 225;
/// File name prefix of the per-octet tables. `ipv473.csv` holds 73.x.x.x.
const TABLE_PREFIX: &str = "ipv4";

/// One row of a per-octet range table: bounds for octets two through four
/// and the country owning that slice of the first octet's space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRangeEntry {
    pub start: [u8; 3],
    pub end: [u8; 3],
    pub country: String,
}

impl IpRangeEntry {
    /// Whether each of octets two through four falls inside this row's
    /// bounds. Octets are tested independently, not lexicographically; the
    /// reference tables are written with that box shape in mind.
    fn contains(&self, octets: [u8; 3]) -> bool {
        self.start
            .iter()
            .zip(self.end.iter())
            .zip(octets.iter())
            .all(|((start, end), octet)| start <= octet && octet <= end)
    }
}

/// Where [`CountryLookup`] gets its range rows from. `None` means no table
/// exists for that first octet.
pub trait RangeSource {
    fn load(&self, first_octet: u8) -> Option<Vec<IpRangeEntry>>;
}

/// Reads `<dir>/ipv4<octet>.csv` files holding
/// `start2,start3,start4,end2,end3,end4,country` rows.
pub struct CsvRangeSource {
    dir: PathBuf,
}

impl CsvRangeSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvRangeSource { dir: dir.into() }
    }
}

impl RangeSource for CsvRangeSource {
    fn load(&self, first_octet: u8) -> Option<Vec<IpRangeEntry>> {
        let path = self.dir.join(format!("{TABLE_PREFIX}{first_octet}.csv"));
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) => {
                debug!(
                    action = "miss",
                    component = "country_lookup",
                    octet = first_octet,
                    error = %error,
                    "No range table for first octet"
                );
                return None;
            }
        };
        let mut rows = Vec::new();
        let mut malformed = 0usize;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_range_row(line) {
                Some(row) => rows.push(row),
                None => malformed += 1,
            }
        }
        if malformed > 0 {
            warn!(
                action = "skip",
                component = "country_lookup",
                path = %path.display(),
                malformed_rows = malformed,
                "Range table rows could not be read"
            );
        }
        Some(rows)
    }
}

fn parse_range_row(line: &str) -> Option<IpRangeEntry> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 7 {
        return None;
    }
    let mut octets = [0u8; 6];
    for (slot, raw) in octets.iter_mut().zip(&parts[..6]) {
        *slot = raw.trim().parse().ok()?;
    }
    Some(IpRangeEntry {
        start: [octets[0], octets[1], octets[2]],
        end: [octets[3], octets[4], octets[5]],
        country: parts[6].trim().to_string(),
    })
}

/// Country resolution over per-first-octet range tables.
///
/// Tables are loaded through the [`RangeSource`] at most once per first
/// octet, and every address resolves to the same code for the lifetime of
/// the lookup because results are memoized.
pub struct CountryLookup {
    source: Box<dyn RangeSource>,
    cache: HashMap<String, String>,
    tables: HashMap<u8, Option<Vec<IpRangeEntry>>>,
}

impl CountryLookup {
    pub fn new(source: Box<dyn RangeSource>) -> Self {
        CountryLookup {
            source,
            cache: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    /// Lookup backed by CSV tables under `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        CountryLookup::new(Box::new(CsvRangeSource::new(dir)))
    }

    /// Resolve a dotted-quad address to a two-letter country code,
    /// [`RESERVED`] for high space without a table, or [`UNRESOLVED`] when
    /// the address is invalid or no range matches.
    pub fn lookup(&mut self, ip: &str) -> String {
        let Some(octets) = split_octets(ip) else {
            self.cache
                .insert(ip.to_string(), UNRESOLVED.to_string());
            return UNRESOLVED.to_string();
        };
        if let Some(code) = self.cache.get(ip) {
            return code.clone();
        }
        let code = self.resolve(octets);
        self.cache.insert(ip.to_string(), code.clone());
        code
    }

    fn resolve(&mut self, octets: [u8; 4]) -> String {
        let first = octets[0];
        let table = self
            .tables
            .entry(first)
            .or_insert_with(|| self.source.load(first));
        let Some(rows) = table else {
            return if first >= RESERVED_FIRST_OCTET {
                RESERVED.to_string()
            } else {
                UNRESOLVED.to_string()
            };
        };
        let rest = [octets[1], octets[2], octets[3]];
        match rows.iter().find(|row| row.contains(rest)) {
            Some(row) => row.country.clone(),
            None => UNRESOLVED.to_string(),
        }
    }
}

/// Split a dotted-quad string into its four octets. `None` when any part
/// is missing, out of range or not a number.
fn split_octets(ip: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = ip.split('.');
    for slot in &mut octets {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

/// Split a `start_ip,end_ip,country` master CSV into per-first-octet table
/// files under `out_dir`. Rows whose addresses are not dotted quads, IPv6
/// ranges included, are skipped. Returns the number of rows written.
pub fn build_reference_tables(master: &Path, out_dir: &Path) -> Result<usize, LogError> {
    let content = fs::read_to_string(master).map_err(|e| LogError::io("read", master, e))?;
    fs::create_dir_all(out_dir).map_err(|e| LogError::io("create", out_dir, e))?;

    let mut buckets: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    let mut skipped = 0usize;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 3 {
            skipped += 1;
            continue;
        }
        let (Some(start), Some(end)) = (
            split_octets(parts[0].trim()),
            split_octets(parts[1].trim()),
        ) else {
            skipped += 1;
            continue;
        };
        buckets.entry(start[0]).or_default().push(format!(
            "{},{},{},{},{},{},{}",
            start[1],
            start[2],
            start[3],
            end[1],
            end[2],
            end[3],
            parts[2].trim()
        ));
    }

    let mut written = 0usize;
    for (octet, rows) in &buckets {
        let path = out_dir.join(format!("{TABLE_PREFIX}{octet}.csv"));
        let file = File::create(&path).map_err(|e| LogError::io("create", &path, e))?;
        let mut out = BufWriter::new(file);
        for row in rows {
            writeln!(out, "{row}").map_err(|e| LogError::io("write", &path, e))?;
        }
        out.flush().map_err(|e| LogError::io("write", &path, e))?;
        written += rows.len();
    }
    info!(
        action = "complete",
        component = "table_builder",
        table_count = buckets.len(),
        row_count = written,
        skipped_rows = skipped,
        "Built country range tables"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct StubSource {
        rows: Vec<IpRangeEntry>,
        loads: Rc<Cell<usize>>,
    }

    impl RangeSource for StubSource {
        fn load(&self, first_octet: u8) -> Option<Vec<IpRangeEntry>> {
            self.loads.set(self.loads.get() + 1);
            if first_octet == 73 {
                Some(self.rows.clone())
            } else {
                None
            }
        }
    }

    fn entry(start: [u8; 3], end: [u8; 3], country: &str) -> IpRangeEntry {
        IpRangeEntry {
            start,
            end,
            country: country.to_string(),
        }
    }

    fn stub_lookup(rows: Vec<IpRangeEntry>) -> (CountryLookup, Rc<Cell<usize>>) {
        let loads = Rc::new(Cell::new(0));
        let lookup = CountryLookup::new(Box::new(StubSource {
            rows,
            loads: Rc::clone(&loads),
        }));
        (lookup, loads)
    }

    #[test]
    fn test_invalid_addresses_resolve_to_inv() {
        let (mut lookup, loads) = stub_lookup(vec![]);
        for ip in ["256.1.1.1", "1.-1.2.3", "a.b.c.d", "1.2.3", "1.2.3.4.5", ""] {
            assert_eq!(lookup.lookup(ip), UNRESOLVED, "ip {ip:?}");
        }
        // Octet validation happens before any table is consulted.
        assert_eq!(loads.get(), 0);
    }

    #[test]
    fn test_missing_table_splits_reserved_from_unresolved() {
        let (mut lookup, _) = stub_lookup(vec![]);
        assert_eq!(lookup.lookup("230.1.2.3"), RESERVED);
        assert_eq!(lookup.lookup("225.0.0.0"), RESERVED);
        assert_eq!(lookup.lookup("224.0.0.0"), UNRESOLVED);
        assert_eq!(lookup.lookup("10.1.2.3"), UNRESOLVED);
    }

    #[test]
    fn test_first_matching_range_wins() {
        let (mut lookup, _) = stub_lookup(vec![
            entry([0, 0, 0], [255, 255, 255], "US"),
            entry([83, 0, 0], [83, 255, 255], "CA"),
        ]);
        assert_eq!(lookup.lookup("73.83.18.52"), "US");
    }

    #[test]
    fn test_containment_checks_each_octet_independently() {
        let (mut lookup, _) = stub_lookup(vec![entry([83, 10, 0], [83, 20, 255], "SE")]);
        assert_eq!(lookup.lookup("73.83.15.200"), "SE");
        // Octet three sits outside its bounds even though the address is
        // lexicographically between start and end.
        assert_eq!(lookup.lookup("73.83.25.0"), UNRESOLVED);
    }

    #[test]
    fn test_tables_load_once_and_results_are_memoized() {
        let (mut lookup, loads) = stub_lookup(vec![entry([83, 0, 0], [83, 255, 255], "US")]);
        assert_eq!(lookup.lookup("73.83.18.52"), "US");
        assert_eq!(lookup.lookup("73.83.18.52"), "US");
        assert_eq!(lookup.lookup("73.83.99.1"), "US");
        assert_eq!(lookup.lookup("73.200.0.1"), UNRESOLVED);
        assert_eq!(loads.get(), 1);
        // A different first octet triggers exactly one more load.
        assert_eq!(lookup.lookup("74.83.18.52"), UNRESOLVED);
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn test_csv_source_reads_table_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("ipv473.csv"),
            "0,0,0,82,255,255,US\n83,0,0,83,255,255,CA\nnot,a,valid,row\n",
        )
        .unwrap();
        let mut lookup = CountryLookup::from_dir(dir.path());
        assert_eq!(lookup.lookup("73.83.18.52"), "CA");
        assert_eq!(lookup.lookup("73.10.0.1"), "US");
        assert_eq!(lookup.lookup("90.10.0.1"), UNRESOLVED);
    }

    #[test]
    fn test_build_reference_tables_splits_by_first_octet() {
        let dir = tempdir().unwrap();
        let master = dir.path().join("country-ranges.csv");
        fs::write(
            &master,
            concat!(
                "73.0.0.0,73.91.255.255,US\n",
                "73.92.0.0,73.255.255.255,CA\n",
                "90.0.0.0,90.127.255.255,FR\n",
                "2600::,2600:ffff:ffff:ffff:ffff:ffff:ffff:ffff,US\n",
                "garbage line\n",
            ),
        )
        .unwrap();
        let out = dir.path().join("tables");
        let written = build_reference_tables(&master, &out).unwrap();
        assert_eq!(written, 3);

        let table73 = fs::read_to_string(out.join("ipv473.csv")).unwrap();
        assert_eq!(table73, "0,0,0,91,255,255,US\n92,0,0,255,255,255,CA\n");
        let table90 = fs::read_to_string(out.join("ipv490.csv")).unwrap();
        assert_eq!(table90, "0,0,0,127,255,255,FR\n");

        // The built tables feed the lookup directly.
        let mut lookup = CountryLookup::from_dir(&out);
        assert_eq!(lookup.lookup("73.83.18.52"), "US");
        assert_eq!(lookup.lookup("73.200.0.1"), "CA");
        assert_eq!(lookup.lookup("90.4.18.2"), "FR");
    }
}
