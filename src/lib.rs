pub mod analyzer;
pub mod args;
pub mod dialect;
pub mod error;
pub mod geo;
pub mod parser;
pub mod records;
pub mod reports;
pub mod session;
pub mod utils;

pub use analyzer::LogAnalyzer;
pub use args::Args;
pub use dialect::LogDialect;
pub use error::LogError;
pub use geo::{CountryLookup, RangeSource};
pub use parser::{parse_file, parse_file_projected, parse_reader, parse_reader_projected};
pub use records::{LogRecord, RecordSet, FIELD_ABSENT};
pub use reports::{ActivityReport, GraphReport, ReportSeries};
pub use session::Session;
