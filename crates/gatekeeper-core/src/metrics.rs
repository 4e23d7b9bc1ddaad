//! Publish metrics
//!
//! A [`MetricsCollector`] is created by the caller and handed to whatever
//! records into it. It is internally synchronised, so a shared reference is
//! enough for recording.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::config::StoreKind;
use crate::error::{ErrorKind, PublishError};

/// Failure counters bucketed by error kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCounts {
    pub validation_failures: u64,
    pub api_errors: u64,
    pub network_errors: u64,
    pub quota_errors: u64,
    pub authentication_errors: u64,
}

impl FailureCounts {
    fn record(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::Validation => self.validation_failures += 1,
            ErrorKind::Api => self.api_errors += 1,
            ErrorKind::Network => self.network_errors += 1,
            ErrorKind::QuotaExceeded => self.quota_errors += 1,
            ErrorKind::Authentication => self.authentication_errors += 1,
            ErrorKind::Packaging | ErrorKind::Unknown => {}
        }
    }
}

#[derive(Debug, Default)]
struct StoreBucket {
    attempts: u64,
    successes: u64,
    failures: u64,
    retries: u64,
    failure_kinds: FailureCounts,
    durations: Vec<Duration>,
}

#[derive(Debug, Default)]
struct Counters {
    publish_attempts: u64,
    publish_successes: u64,
    publish_failures: u64,
    upload_failures: u64,
    retries: u64,
    failure_kinds: FailureCounts,
    durations: Vec<Duration>,
    per_store: BTreeMap<StoreKind, StoreBucket>,
}

/// Counts publish attempts, outcomes and retries
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: Mutex<Counters>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish_attempt(&self, store: StoreKind) {
        let mut c = self.lock();
        c.publish_attempts += 1;
        c.per_store.entry(store).or_default().attempts += 1;
    }

    pub fn record_publish_success(&self, store: StoreKind, duration: Duration) {
        let mut c = self.lock();
        c.publish_successes += 1;
        c.durations.push(duration);
        let bucket = c.per_store.entry(store).or_default();
        bucket.successes += 1;
        bucket.durations.push(duration);
    }

    pub fn record_publish_failure(&self, store: StoreKind, error: &PublishError) {
        let mut c = self.lock();
        Self::count_failure(&mut c, store, error.kind());
    }

    /// Upload failures also count as publish failures
    pub fn record_upload_failure(&self, store: StoreKind, error: &PublishError) {
        let mut c = self.lock();
        c.upload_failures += 1;
        Self::count_failure(&mut c, store, error.kind());
    }

    pub fn record_retry(&self, store: StoreKind) {
        let mut c = self.lock();
        c.retries += 1;
        c.per_store.entry(store).or_default().retries += 1;
    }

    /// Point-in-time copy with derived rates and averages
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.lock();

        let per_store = c
            .per_store
            .iter()
            .map(|(store, bucket)| {
                (
                    store.as_str().to_string(),
                    StoreSnapshot {
                        attempts: bucket.attempts,
                        successes: bucket.successes,
                        failures: bucket.failures,
                        retries: bucket.retries,
                        failures_by_kind: bucket.failure_kinds.clone(),
                        success_rate: rate(bucket.successes, bucket.attempts),
                        avg_duration_ms: average_ms(&bucket.durations),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            publish_attempts: c.publish_attempts,
            publish_successes: c.publish_successes,
            publish_failures: c.publish_failures,
            upload_failures: c.upload_failures,
            retries: c.retries,
            failures_by_kind: c.failure_kinds.clone(),
            success_rate: rate(c.publish_successes, c.publish_attempts),
            avg_duration_ms: average_ms(&c.durations),
            per_store,
        }
    }

    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }

    fn count_failure(c: &mut Counters, store: StoreKind, kind: ErrorKind) {
        c.publish_failures += 1;
        c.failure_kinds.record(kind);
        let bucket = c.per_store.entry(store).or_default();
        bucket.failures += 1;
        bucket.failure_kinds.record(kind);
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Serialisable view of the collected metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub publish_attempts: u64,
    pub publish_successes: u64,
    pub publish_failures: u64,
    pub upload_failures: u64,
    pub retries: u64,
    #[serde(flatten)]
    pub failures_by_kind: FailureCounts,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub per_store: BTreeMap<String, StoreSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    #[serde(flatten)]
    pub failures_by_kind: FailureCounts,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn average_ms(durations: &[Duration]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    let total: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
    total / durations.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.publish_attempts, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.avg_duration_ms, 0.0);
        assert!(snapshot.per_store.is_empty());
    }

    #[test]
    fn test_success_rate_and_average_duration() {
        let metrics = MetricsCollector::new();
        metrics.record_publish_attempt(StoreKind::Chrome);
        metrics.record_publish_attempt(StoreKind::Chrome);
        metrics.record_publish_success(StoreKind::Chrome, Duration::from_millis(100));
        metrics.record_publish_failure(StoreKind::Chrome, &PublishError::network("offline"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.success_rate, 0.5);
        assert_eq!(snapshot.avg_duration_ms, 100.0);
        assert_eq!(snapshot.failures_by_kind.network_errors, 1);

        let chrome = &snapshot.per_store["chrome"];
        assert_eq!(chrome.attempts, 2);
        assert_eq!(chrome.successes, 1);
        assert_eq!(chrome.failures, 1);
    }

    #[test]
    fn test_failures_bucketed_by_kind() {
        let metrics = MetricsCollector::new();
        metrics.record_publish_failure(StoreKind::Edge, &PublishError::validation("x"));
        metrics.record_publish_failure(StoreKind::Edge, &PublishError::api("x"));
        metrics.record_publish_failure(StoreKind::Edge, &PublishError::quota_exceeded("x"));
        metrics.record_publish_failure(StoreKind::Edge, &PublishError::authentication("x"));
        metrics.record_publish_failure(StoreKind::Edge, &PublishError::unknown("x"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.publish_failures, 5);
        assert_eq!(
            snapshot.per_store["edge"].failures_by_kind,
            FailureCounts {
                validation_failures: 1,
                api_errors: 1,
                network_errors: 0,
                quota_errors: 1,
                authentication_errors: 1,
            }
        );
    }

    #[test]
    fn test_upload_failure_counts_as_publish_failure() {
        let metrics = MetricsCollector::new();
        metrics.record_upload_failure(StoreKind::Firefox, &PublishError::api("x"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.upload_failures, 1);
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.failures_by_kind.api_errors, 1);
    }

    #[test]
    fn test_retries_and_reset() {
        let metrics = MetricsCollector::new();
        metrics.record_retry(StoreKind::Chrome);
        metrics.record_retry(StoreKind::Chrome);
        assert_eq!(metrics.snapshot().retries, 2);
        assert_eq!(metrics.snapshot().per_store["chrome"].retries, 2);

        metrics.reset();
        assert_eq!(metrics.snapshot().retries, 0);
    }

    #[test]
    fn test_snapshot_serialises_camel_case() {
        let metrics = MetricsCollector::new();
        metrics.record_publish_attempt(StoreKind::Firefox);

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["publishAttempts"], 1);
        assert_eq!(json["validationFailures"], 0);
        assert_eq!(json["perStore"]["firefox"]["attempts"], 1);
    }
}
