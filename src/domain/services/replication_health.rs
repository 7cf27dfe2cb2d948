//! Replication Health Service
//!
//! Pure lag and progress arithmetic for the status operation. Everything
//! here takes catalog snapshots and returns numbers; the application layer
//! decides how to report them.

use crate::domain::entities::{Capabilities, ReplicationStats};
use chrono::{DateTime, Duration, Utc};

/// A standby reply older than this is reported as unhealthy.
pub const MAX_REPLY_LAG_SECS: i64 = 5 * 60;

/// Observed replication lag for one standby.
///
/// Prefers the server-reported replay lag when the connection advertises
/// the capability; otherwise falls back to the wall-clock delta since the
/// standby's last acknowledged reply. Returns `None` when the server
/// reports neither signal.
pub fn observed_lag(
    stats: &ReplicationStats,
    capabilities: Capabilities,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if capabilities.replay_lag {
        if let Some(secs) = stats.replay_lag_secs {
            return Some(Duration::milliseconds((secs * 1000.0) as i64));
        }
    }
    stats.reply_time.map(|reply_time| now - reply_time)
}

pub fn lag_is_stale(lag: Duration) -> bool {
    lag > Duration::seconds(MAX_REPLY_LAG_SECS)
}

/// Copy progress of an in-flight table sync, in percent.
///
/// Sizes are total relation sizes on each side; a zero-sized source counts
/// as fully copied.
pub fn copy_progress_percent(source_bytes: i64, target_bytes: i64) -> f64 {
    if source_bytes <= 0 {
        return 100.0;
    }
    let ratio = target_bytes.max(0) as f64 / source_bytes as f64;
    (ratio * 100.0).min(100.0)
}
