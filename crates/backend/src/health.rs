//! Backend reachability tracking
//!
//! Records the last time each functional area of the backend answered a call
//! successfully. Failed calls never touch the record.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Path prefix of generic remote commands
pub const COMMAND_PATH_PREFIX: &str = "/cmd/";

/// Functional area of the backend, named by its endpoint path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthBucket {
    /// Relay startup announcement
    Startup,
    /// Topic lifecycle notices
    AddTopic,
    /// Aggregated statistics submission
    AggStats,
    /// Any remote command
    OtherCommand,
    /// One specific remote command
    Command(String),
}

impl HealthBucket {
    /// Endpoint path relative to the backend base URL
    pub fn path(&self) -> String {
        match self {
            Self::Startup => "/startup".to_string(),
            Self::AddTopic => "/topics".to_string(),
            Self::AggStats => "/stats".to_string(),
            Self::OtherCommand => COMMAND_PATH_PREFIX.to_string(),
            Self::Command(command) => format!("{}{}", COMMAND_PATH_PREFIX, command),
        }
    }

    /// Buckets that are reported even before their first success
    pub fn fixed() -> [HealthBucket; 4] {
        [
            Self::Startup,
            Self::AddTopic,
            Self::AggStats,
            Self::OtherCommand,
        ]
    }
}

impl fmt::Display for HealthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Point-in-time copy of the health record, keyed by bucket path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub last_success: BTreeMap<String, DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn get(&self, bucket: &HealthBucket) -> Option<DateTime<Utc>> {
        self.last_success.get(&bucket.path()).copied()
    }
}

/// Last-success timestamps per bucket
pub struct HealthTracker {
    last_success: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl HealthTracker {
    /// Create a tracker with every fixed bucket at the Unix epoch
    pub fn new() -> Self {
        let epoch = DateTime::<Utc>::default();
        let last_success = HealthBucket::fixed()
            .iter()
            .map(|bucket| (bucket.path(), epoch))
            .collect();
        Self {
            last_success: Mutex::new(last_success),
        }
    }

    /// Record a success now
    pub fn record_success(&self, bucket: &HealthBucket) -> DateTime<Utc> {
        self.record_all(std::slice::from_ref(bucket))
    }

    /// Record a success for several buckets with one timestamp
    pub fn record_all(&self, buckets: &[HealthBucket]) -> DateTime<Utc> {
        let now = Utc::now();
        let mut last_success = self.last_success.lock();
        for bucket in buckets {
            advance(&mut last_success, bucket, now);
        }
        now
    }

    /// Record a success at a given time. Timestamps never move backwards.
    pub fn record_success_at(&self, bucket: &HealthBucket, at: DateTime<Utc>) {
        advance(&mut self.last_success.lock(), bucket, at);
    }

    pub fn last_success(&self, bucket: &HealthBucket) -> Option<DateTime<Utc>> {
        self.last_success.lock().get(&bucket.path()).copied()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_success = self.last_success.lock().clone();
        HealthSnapshot {
            last_success: last_success.into_iter().collect(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn advance(map: &mut HashMap<String, DateTime<Utc>>, bucket: &HealthBucket, at: DateTime<Utc>) {
    map.entry(bucket.path())
        .and_modify(|last| {
            if at > *last {
                *last = at;
            }
        })
        .or_insert(at);
}
