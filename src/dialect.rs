use std::fmt;

/// The log line grammars the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDialect {
    /// Apache common log format, the `access.log` family.
    Apache,
    /// IIS W3C extended format with `#Fields:` directives, the `u_ex*.log` family.
    W3c,
}

impl fmt::Display for LogDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogDialect::Apache => write!(f, "Apache"),
            LogDialect::W3c => write!(f, "IIS/W3C"),
        }
    }
}

/// Dialect-independent field names used by the report layer. Both the
/// native name and one of these resolve to the same column of a record set.
pub const FIELD_DATE: &str = "date";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_CLIENT_IP: &str = "client-ip";
pub const FIELD_URI_STEM: &str = "uri-stem";

/// `(native, universal)` names of the fixed Apache columns, in column order.
/// A parsed Apache record always has exactly this many values.
pub(crate) const APACHE_FIELDS: &[(&str, &str)] = &[
    ("date", FIELD_DATE),
    ("time", FIELD_TIMESTAMP),
    ("c-ip", FIELD_CLIENT_IP),
    ("cs-method", "method"),
    ("cs-uri-stem", FIELD_URI_STEM),
    ("sc-status", "http-status"),
    ("cs-bytes", "bytes-received"),
    ("cs(Referrer)", "referrer"),
];

/// `(native, universal)` names of every W3C field the parser recognizes.
/// Which of them exist in a given log, and at which columns, is discovered
/// from that log's `#Fields:` directive. Directive tokens are matched
/// against the native names exactly, with no normalization.
pub(crate) const W3C_FIELDS: &[(&str, &str)] = &[
    ("date", FIELD_DATE),
    ("time", FIELD_TIMESTAMP),
    ("s-sitename", "service-name"),
    ("s-computername", "server-name"),
    ("s-ip", "server-ip"),
    ("cs-method", "method"),
    ("cs-uri-stem", FIELD_URI_STEM),
    ("cs-uri-query", "uri-query"),
    ("s-port", "server-port"),
    ("cs-username", "username"),
    ("c-ip", FIELD_CLIENT_IP),
    ("cs(UserAgent)", "user-agent"),
    ("cs(Cookie)", "cookie"),
    ("cs(Referrer)", "referrer"),
    ("cs-host", "host"),
    ("sc-status", "http-status"),
    ("sc-substatus", "protocol-substatus"),
    ("sc-win32-status", "win32-status"),
    ("sc-bytes", "bytes-sent"),
    ("cs-bytes", "bytes-received"),
    ("time-taken", "time-taken"),
];

impl LogDialect {
    /// The alias table for this dialect.
    pub(crate) fn field_table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            LogDialect::Apache => APACHE_FIELDS,
            LogDialect::W3c => W3C_FIELDS,
        }
    }
}
