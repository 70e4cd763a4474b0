//! Metrics definitions for Bastion
//!
//! All metrics follow Prometheus naming conventions:
//! - `bastion_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: bounded by the gRPC methods the server registers (5 values)
//! - `outcome`: `allowed`, `denied`
//! - `reason`: bounded by deny reasons (4 values)
//!
//! Consumer identities are never used as labels.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Call Metrics (Counters)
// ============================================================================

/// Record an intercepted call that was allowed through.
///
/// Metric: `bastion_calls_total`
/// Labels: `method`, `outcome=allowed`
pub fn record_call_allowed(method: &str) {
    counter!(
        "bastion_calls_total",
        "method" => method.to_string(),
        "outcome" => "allowed"
    )
    .increment(1);
}

/// Record an intercepted call that was refused.
///
/// Metric: `bastion_calls_total`
/// Labels: `method`, `outcome=denied`
///
/// Metric: `bastion_calls_denied_total`
/// Labels: `reason`
pub fn record_call_denied(method: &str, reason: &'static str) {
    counter!(
        "bastion_calls_total",
        "method" => method.to_string(),
        "outcome" => "denied"
    )
    .increment(1);
    counter!("bastion_calls_denied_total", "reason" => reason).increment(1);
}

// ============================================================================
// Event Bus Metrics
// ============================================================================

/// Record an audit event dropped because a subscriber's buffer was full.
///
/// Metric: `bastion_events_dropped_total`
/// Labels: none
///
/// Non-zero rate means a Logging client is not keeping up.
pub fn record_event_dropped() {
    counter!("bastion_events_dropped_total").increment(1);
}

/// Set the number of open Logging subscriptions.
///
/// Metric: `bastion_event_subscribers_active`
pub fn set_event_subscribers_active(count: usize) {
    // usize to f64 conversion is safe for realistic subscriber counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("bastion_event_subscribers_active").set(count as f64);
}

// ============================================================================
// Statistics Metrics
// ============================================================================

/// Set the number of open statistics windows.
///
/// Metric: `bastion_stat_windows_active`
pub fn set_stat_windows_active(count: usize) {
    // usize to f64 conversion is safe for realistic window counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("bastion_stat_windows_active").set(count as f64);
}

/// Record a statistics snapshot emitted to a subscriber.
///
/// Metric: `bastion_stat_snapshots_total`
pub fn record_stat_snapshot() {
    counter!("bastion_stat_snapshots_total").increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
        label: Option<(&str, &str)>,
    ) -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .filter(|(key, _, _, _)| match label {
                Some((k, v)) => key.key().labels().any(|l| l.key() == k && l.value() == v),
                None => true,
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(c) => *c,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_call_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_call_allowed("/bastion.Biz/Add");
            record_call_allowed("/bastion.Biz/Add");
            record_call_denied("/bastion.Admin/Logging", "method not permitted");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "bastion_calls_total", Some(("outcome", "allowed"))),
            2
        );
        assert_eq!(
            counter_value(&snapshot, "bastion_calls_total", Some(("outcome", "denied"))),
            1
        );
        assert_eq!(
            counter_value(
                &snapshot,
                "bastion_calls_denied_total",
                Some(("reason", "method not permitted"))
            ),
            1
        );
    }

    #[test]
    fn test_event_and_stat_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_event_dropped();
            record_stat_snapshot();
            record_stat_snapshot();
            set_event_subscribers_active(3);
            set_stat_windows_active(1);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "bastion_events_dropped_total", None),
            1
        );
        assert_eq!(
            counter_value(&snapshot, "bastion_stat_snapshots_total", None),
            2
        );
    }
}
