//! Value Objects - Immutable replication primitives
//!
//! Value objects are identified by their value rather than identity. The
//! connection-info builder is the single place where libpq key/value
//! escaping happens; the subscription reconciler compares its output
//! byte-for-byte against the catalog's stored `subconninfo`.

use std::fmt;
use std::str::FromStr;

/// Connection info embedded into a subscription.
///
/// Serialized in the canonical `key=value` libpq form. The builder is
/// deterministic: identical inputs produce an identical string across
/// runs, which is what makes the stored-vs-desired diff meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnInfo {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub application_name: String,
    pub user: String,
    pub password: String,
}

impl ConnInfo {
    /// Render the libpq connection string.
    pub fn to_conninfo(&self) -> String {
        format!(
            "host={} port={} dbname={} application_name={} user={} password={}",
            escape_conninfo_value(&self.host),
            self.port,
            escape_conninfo_value(&self.dbname),
            escape_conninfo_value(&self.application_name),
            escape_conninfo_value(&self.user),
            escape_conninfo_value(&self.password),
        )
    }
}

/// Escape one libpq connection-string value.
///
/// Values without spaces, quotes or backslashes pass through untouched;
/// everything else is wrapped in single quotes with `\` and `'` escaped.
/// Empty values must be quoted to survive the round trip.
pub fn escape_conninfo_value(value: &str) -> String {
    let needs_quoting =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quoting {
        return value.to_string();
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('\'');
    escaped
}

/// A write-ahead-log position in the `X/Y` form reported by the server.
///
/// Stored as the flat 64-bit byte offset so positions can be compared and
/// differenced numerically for lag reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Absolute byte distance between two positions.
    pub fn distance(self, other: Lsn) -> u64 {
        self.0.abs_diff(other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid LSN `{0}`")]
pub struct ParseLsnError(String);

impl FromStr for Lsn {
    type Err = ParseLsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (high, low) = s.split_once('/').ok_or_else(|| ParseLsnError(s.to_string()))?;
        let high = u64::from_str_radix(high, 16).map_err(|_| ParseLsnError(s.to_string()))?;
        let low = u64::from_str_radix(low, 16).map_err(|_| ParseLsnError(s.to_string()))?;
        if high > u64::from(u32::MAX) || low > u64::from(u32::MAX) {
            return Err(ParseLsnError(s.to_string()));
        }
        Ok(Lsn((high << 32) | low))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}
