use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dialect::LogDialect;

/// Failures surfaced by parsing, conversion and table building. Every
/// variant is recoverable at the caller: report it, abandon the operation,
/// keep the process alive.
#[derive(Debug, Error)]
pub enum LogError {
    /// A filesystem operation failed. Carries the operation name and the
    /// path it was attempted on.
    #[error("could not {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input had content, but none of it matched the selected dialect.
    #[error("log does not look like {dialect} data, did you select the correct log type?")]
    DialectMismatch { dialect: LogDialect },

    /// The input produced no records at all.
    #[error("no log records found in the input")]
    EmptyOrUnparsable,
}

impl LogError {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        LogError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_mismatch_message_suggests_log_type() {
        let err = LogError::DialectMismatch {
            dialect: LogDialect::Apache,
        };
        let text = err.to_string();
        assert!(text.contains("Apache"));
        assert!(text.contains("did you select the correct log type?"));
    }

    #[test]
    fn test_io_error_reports_operation_and_path() {
        let err = LogError::io(
            "open",
            Path::new("/var/log/access.log"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        let text = err.to_string();
        assert!(text.contains("open"));
        assert!(text.contains("/var/log/access.log"));
    }
}
