//! Call accounting for the bridge
//!
//! Every remote invocation attempt produces exactly one [`CallRecord`],
//! retained in a bounded ring buffer (success and error kept separately), and
//! is folded into per-slot [`MethodMetrics`]. Consumers only ever see cloned
//! snapshots; the bridge client is the sole writer.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Default retention per ring buffer.
pub const LOG_CAPACITY: usize = 100;

/// Outcome of a single remote invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CallOutcome {
    Success,
    Error,
}

/// One remote invocation attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Slot name the call targeted.
    pub slot: String,

    /// Arguments passed to the slot.
    pub args: Vec<JsonValue>,

    /// When the call completed.
    pub timestamp: DateTime<Utc>,

    pub outcome: CallOutcome,

    /// Wall-clock duration of the attempt.
    pub duration: Duration,

    /// Error message when the outcome is [`CallOutcome::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated statistics for one slot name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_time: Duration,
    pub avg_time: Duration,
    /// `None` until the first call completes.
    pub min_time: Option<Duration>,
    pub max_time: Duration,
    pub last_call: DateTime<Utc>,
}

impl MethodMetrics {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            total_time: Duration::ZERO,
            avg_time: Duration::ZERO,
            min_time: None,
            max_time: Duration::ZERO,
            last_call: now,
        }
    }

    fn record(&mut self, duration: Duration, success: bool, now: DateTime<Utc>) {
        self.total_calls += 1;
        self.total_time += duration;
        self.avg_time = self.total_time / self.total_calls as u32;
        self.min_time = Some(self.min_time.map_or(duration, |m| m.min(duration)));
        self.max_time = self.max_time.max(duration);
        self.last_call = now;

        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
        }
    }
}

/// Bounded success/error logs plus per-slot metrics.
///
/// Not synchronized itself; the client guards it with a lock.
#[derive(Debug)]
pub struct CallLog {
    success: VecDeque<CallRecord>,
    error: VecDeque<CallRecord>,
    metrics: HashMap<String, MethodMetrics>,
    capacity: usize,
}

impl Default for CallLog {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl CallLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            success: VecDeque::with_capacity(capacity),
            error: VecDeque::with_capacity(capacity),
            metrics: HashMap::new(),
            capacity,
        }
    }

    /// Record a successful invocation.
    pub fn record_success(&mut self, slot: &str, args: Vec<JsonValue>, duration: Duration) {
        let now = Utc::now();
        push_bounded(
            &mut self.success,
            CallRecord {
                slot: slot.to_string(),
                args,
                timestamp: now,
                outcome: CallOutcome::Success,
                duration,
                error: None,
            },
            self.capacity,
        );
        self.update_metrics(slot, duration, true, now);
    }

    /// Record a failed invocation.
    pub fn record_error(
        &mut self,
        slot: &str,
        args: Vec<JsonValue>,
        duration: Duration,
        error: &crate::Error,
    ) {
        let now = Utc::now();
        push_bounded(
            &mut self.error,
            CallRecord {
                slot: slot.to_string(),
                args,
                timestamp: now,
                outcome: CallOutcome::Error,
                duration,
                error: Some(error.to_string()),
            },
            self.capacity,
        );
        self.update_metrics(slot, duration, false, now);
    }

    fn update_metrics(&mut self, slot: &str, duration: Duration, success: bool, now: DateTime<Utc>) {
        self.metrics
            .entry(slot.to_string())
            .or_insert_with(|| MethodMetrics::new(now))
            .record(duration, success, now);
    }

    pub fn success_log(&self) -> Vec<CallRecord> {
        self.success.iter().cloned().collect()
    }

    pub fn error_log(&self) -> Vec<CallRecord> {
        self.error.iter().cloned().collect()
    }

    pub fn metrics(&self) -> HashMap<String, MethodMetrics> {
        self.metrics.clone()
    }

    /// Drop all records and metrics.
    pub fn clear(&mut self) {
        self.success.clear();
        self.error.clear();
        self.metrics.clear();
    }

    /// Emit WARN logs for slots that look degraded: average over one second,
    /// or more failures than successes.
    pub fn warn_degraded(&self) {
        for (slot, metrics) in &self.metrics {
            if metrics.avg_time > Duration::from_secs(1) {
                tracing::warn!(
                    slot = %slot,
                    avg_ms = metrics.avg_time.as_millis() as u64,
                    "slow slot detected"
                );
            }

            if metrics.failed_calls > metrics.successful_calls {
                tracing::warn!(
                    slot = %slot,
                    failed = metrics.failed_calls,
                    total = metrics.total_calls,
                    "high failure rate for slot"
                );
            }
        }
    }
}

fn push_bounded(buffer: &mut VecDeque<CallRecord>, record: CallRecord, capacity: usize) {
    if buffer.len() == capacity {
        buffer.pop_front();
    }
    buffer.push_back(record);
}

/// In-memory tracing sink so tests can assert on emitted diagnostics.
#[cfg(test)]
pub(crate) mod test_log {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_one_record_per_call() {
        let mut log = CallLog::default();
        log.record_success("openMenu", vec![], Duration::from_millis(5));
        assert_eq!(log.success_log().len(), 1);
        assert_eq!(log.error_log().len(), 0);

        log.record_error(
            "openMenu",
            vec![],
            Duration::from_millis(7),
            &Error::SlotNotFound("openMenu".into()),
        );
        assert_eq!(log.success_log().len(), 1);
        assert_eq!(log.error_log().len(), 1);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut log = CallLog::default();
        for i in 0..150u32 {
            log.record_success("updateProgress", vec![serde_json::json!(i)], Duration::ZERO);
        }

        let entries = log.success_log();
        assert_eq!(entries.len(), LOG_CAPACITY);
        // The buffer holds entries 50..150, oldest first.
        assert_eq!(entries[0].args, vec![serde_json::json!(50)]);
        assert_eq!(entries[99].args, vec![serde_json::json!(149)]);
    }

    #[test]
    fn test_metrics_aggregation() {
        let mut log = CallLog::default();
        log.record_success("ping", vec![], Duration::from_millis(10));
        log.record_success("ping", vec![], Duration::from_millis(30));
        log.record_error(
            "ping",
            vec![],
            Duration::from_millis(20),
            &Error::Transport("gone".into()),
        );

        let metrics = log.metrics();
        let m = &metrics["ping"];
        assert_eq!(m.total_calls, 3);
        assert_eq!(m.successful_calls, 2);
        assert_eq!(m.failed_calls, 1);
        assert_eq!(m.total_time, Duration::from_millis(60));
        assert_eq!(m.avg_time, Duration::from_millis(20));
        assert_eq!(m.min_time, Some(Duration::from_millis(10)));
        assert_eq!(m.max_time, Duration::from_millis(30));
    }

    #[test]
    fn test_warn_degraded_flags_slow_and_failing_slots() {
        let mut log = CallLog::default();
        log.record_success("openArchives", vec![], Duration::from_secs(2));
        log.record_error(
            "shutdown",
            vec![],
            Duration::from_millis(1),
            &Error::Transport("gone".into()),
        );

        let writer = test_log::CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(writer.clone())
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || log.warn_degraded());

        let output = writer.contents();
        assert!(output.contains("slow slot detected"));
        assert!(output.contains("openArchives"));
        assert!(output.contains("high failure rate"));
        assert!(output.contains("shutdown"));
    }

    #[test]
    fn test_clear() {
        let mut log = CallLog::default();
        log.record_success("ping", vec![], Duration::ZERO);
        log.clear();
        assert!(log.success_log().is_empty());
        assert!(log.error_log().is_empty());
        assert!(log.metrics().is_empty());
    }
}
