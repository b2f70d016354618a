//! Debug-gated metrics for the `SQLite` adapter.
//!
//! All arithmetic happens under a single write lock; [`DbMetrics`] snapshots
//! are taken under the read lock and returned by value. When the adapter is
//! opened without `debug`, recording is a no-op and every counter stays zero.

use super::connection::{read_lock, write_lock};
use crate::Error;
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Kind of statement being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A statement run through `exec` (counts as a write).
    Exec,
    /// A statement run through `query`.
    Query,
}

impl Operation {
    /// Label used for exported series.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::Query => "query",
        }
    }
}

/// Point-in-time copy of the adapter metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbMetrics {
    /// Completed `exec` and `query` calls.
    pub query_count: u64,
    /// Completed `exec` calls.
    pub write_count: u64,
    /// Calls that returned an error.
    pub error_count: u64,
    /// Extra attempts made by `query_with_retry` and `exec_with_retry`.
    pub retry_count: u64,
    /// Transactions committed by `with_transaction`.
    pub commit_count: u64,
    /// Transactions rolled back by `with_transaction`, including failed
    /// commits.
    pub rollback_count: u64,
    /// Cumulative moving average latency.
    pub avg_query_time: Duration,
    /// Largest latency observed.
    pub max_query_time: Duration,
    /// Display form of the most recent error.
    pub last_error: Option<String>,
    /// Wall time of the most recent error.
    pub last_error_time: Option<DateTime<Utc>>,
    /// Connections checked out of the pool at the last sample.
    pub connections_in_use: u32,
}

/// Lock-protected metrics record owned by the adapter.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    enabled: bool,
    inner: RwLock<DbMetrics>,
}

impl MetricsRecorder {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: RwLock::new(DbMetrics::default()),
        }
    }

    /// Records one completed statement.
    pub(crate) fn record(&self, operation: Operation, start: Instant, err: Option<&Error>) {
        if !self.enabled {
            return;
        }
        let elapsed = start.elapsed();
        {
            let mut m = write_lock(&self.inner);
            m.query_count += 1;
            if operation == Operation::Exec {
                m.write_count += 1;
            }
            m.avg_query_time = cumulative_average(m.avg_query_time, elapsed, m.query_count);
            if elapsed > m.max_query_time {
                m.max_query_time = elapsed;
            }
            if let Some(err) = err {
                m.error_count += 1;
                m.last_error = Some(err.to_string());
                m.last_error_time = Some(Utc::now());
            }
        }

        let status = if err.is_some() { "error" } else { "success" };
        record_operation_metrics(operation.as_str(), start, status);
    }

    pub(crate) fn record_retry(&self) {
        if !self.enabled {
            return;
        }
        write_lock(&self.inner).retry_count += 1;
        metrics::counter!("db_retries_total").increment(1);
    }

    pub(crate) fn record_commit(&self) {
        if self.enabled {
            write_lock(&self.inner).commit_count += 1;
        }
    }

    pub(crate) fn record_rollback(&self) {
        if self.enabled {
            write_lock(&self.inner).rollback_count += 1;
        }
    }

    /// Publishes the sampled in-use connection gauge.
    pub(crate) fn set_connections_in_use(&self, in_use: u32) {
        if !self.enabled {
            return;
        }
        write_lock(&self.inner).connections_in_use = in_use;
        metrics::gauge!("db_connections_in_use").set(f64::from(in_use));
    }

    pub(crate) fn snapshot(&self) -> DbMetrics {
        read_lock(&self.inner).clone()
    }
}

/// `new = (old * (n - 1) + x) / n`, computed in nanoseconds.
fn cumulative_average(old: Duration, observation: Duration, n: u64) -> Duration {
    if n <= 1 {
        return observation;
    }
    let n = u128::from(n);
    let total = old.as_nanos() * (n - 1) + observation.as_nanos();
    Duration::from_nanos(u64::try_from(total / n).unwrap_or(u64::MAX))
}

/// Records operation metrics for adapter statements.
///
/// This function records two metrics for each operation:
/// 1. `db_operations_total` - Counter for operation count by status
/// 2. `db_operation_duration_ms` - Histogram for operation latency
///
/// # Arguments
///
/// * `operation` - Operation name (`exec` or `query`)
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - Operation status ("success" or "error")
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "db_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "db_operation_duration_ms",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
