use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a lock file.
///
/// Zero-byte lock files written by older tools have no record; they are
/// still honored as locks but their age is unknown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Per-process identity, fresh for each invocation.
    pub owner: Uuid,
    pub process_name: String,
    pub pid: u32,
    pub host: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(owner: Uuid, process_name: &str, acquired_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            process_name: process_name.to_string(),
            pid: std::process::id(),
            host: hostname(),
            acquired_at,
        }
    }

    /// Parse a lock file body. Empty or foreign content yields `None`.
    pub fn parse(content: &[u8]) -> Option<Self> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        serde_json::from_slice(content).ok()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.acquired_at)
    }

    /// Whether the lock has been held for longer than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now) > threshold
    }

    pub fn describe(&self) -> String {
        format!(
            "{} (pid {} on {}, since {})",
            self.process_name,
            self.pid,
            self.host,
            self.acquired_at.to_rfc3339()
        )
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .or_else(|_| std::fs::read_to_string("/etc/hostname").map(|s| s.trim().to_string()))
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".into())
}
