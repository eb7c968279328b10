//! In-memory outcome counters and confidence statistics.
//!
//! One `Telemetry` instance is owned by each engine behind an `Arc`. Every
//! `record_*` call takes the lock once and releases it before returning, so
//! the lock is never held across an `.await`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::FallbackReason;
use crate::types::{CommandOutcome, ParseQuality};

/// Incrementally updated mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningStats {
    pub count: u64,
    pub mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Population variance; zero until two samples were seen.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[derive(Debug, Default)]
struct TelemetryState {
    total_requests: u64,
    clean_parses: u64,
    recovered_parses: u64,
    unparsable: u64,
    clarifications: u64,
    suggestions: u64,
    auto_executions: u64,
    rejections: u64,
    fallbacks: u64,
    fallback_reasons: BTreeMap<FallbackReason, u64>,
    provider_requests: BTreeMap<String, u64>,
    provider_failures: u64,
    content_rejections: u64,
    dropped_actions: u64,
    actions_executed: u64,
    actions_failed: u64,
    executions_abandoned: u64,
    confidence: RunningStats,
}

/// Point-in-time copy of the telemetry counters with derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub total_requests: u64,
    pub successful_parses: u64,
    pub clean_parses: u64,
    pub recovered_parses: u64,
    pub unparsable_responses: u64,
    pub clarifications_requested: u64,
    pub suggestions_provided: u64,
    pub auto_executions: u64,
    pub rejections: u64,
    pub fallbacks: u64,
    pub fallback_reasons: BTreeMap<FallbackReason, u64>,
    pub provider_requests: BTreeMap<String, u64>,
    pub provider_failures: u64,
    pub content_rejections: u64,
    pub dropped_actions: u64,
    pub actions_executed: u64,
    pub actions_failed: u64,
    pub executions_abandoned: u64,
    pub confidence_samples: u64,
    pub average_confidence: f64,
    pub confidence_stddev: f64,
    pub parse_success_rate: f64,
    pub auto_execution_rate: f64,
    pub fallback_rate: f64,
}

impl TelemetrySnapshot {
    /// Multi-line human-readable rendering for logs.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Command engine telemetry");
        let _ = writeln!(out, "  requests:        {}", self.total_requests);
        let _ = writeln!(
            out,
            "  parses:          {} ok ({} clean, {} recovered), {} unparsable ({:.1}% success)",
            self.successful_parses,
            self.clean_parses,
            self.recovered_parses,
            self.unparsable_responses,
            self.parse_success_rate * 100.0
        );
        let _ = writeln!(
            out,
            "  outcomes:        {} auto-executed ({:.1}%), {} suggested, {} clarified, {} rejected",
            self.auto_executions,
            self.auto_execution_rate * 100.0,
            self.suggestions_provided,
            self.clarifications_requested,
            self.rejections
        );
        let _ = writeln!(
            out,
            "  confidence:      avg {:.3} (sd {:.3}, n={})",
            self.average_confidence, self.confidence_stddev, self.confidence_samples
        );
        let reasons = self
            .fallback_reasons
            .iter()
            .map(|(reason, n)| format!("{}={}", reason, n))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "  fallbacks:       {} ({:.1}%) [{}]",
            self.fallbacks,
            self.fallback_rate * 100.0,
            reasons
        );
        let providers = self
            .provider_requests
            .iter()
            .map(|(name, n)| format!("{}={}", name, n))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "  provider calls:  [{}]", providers);
        let _ = writeln!(
            out,
            "  failures:        {} all-providers-down, {} content rejections",
            self.provider_failures, self.content_rejections
        );
        let _ = write!(
            out,
            "  execution:       {} ok, {} failed, {} abandoned, {} dropped actions",
            self.actions_executed,
            self.actions_failed,
            self.executions_abandoned,
            self.dropped_actions
        );
        out
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Process-local telemetry recorder.
#[derive(Debug, Default)]
pub struct Telemetry {
    state: Mutex<TelemetryState>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_request(&self) {
        self.lock().total_requests += 1;
    }

    pub fn record_parse(&self, quality: ParseQuality) {
        let mut state = self.lock();
        match quality {
            ParseQuality::Clean => state.clean_parses += 1,
            ParseQuality::Recovered => state.recovered_parses += 1,
            ParseQuality::Unparsable => state.unparsable += 1,
        }
    }

    pub fn record_outcome(&self, outcome: CommandOutcome) {
        let mut state = self.lock();
        match outcome {
            CommandOutcome::AutoExecute => state.auto_executions += 1,
            CommandOutcome::Suggest => state.suggestions += 1,
            CommandOutcome::Clarify => state.clarifications += 1,
            CommandOutcome::Reject => state.rejections += 1,
        }
    }

    pub fn record_clarification(&self) {
        self.record_outcome(CommandOutcome::Clarify);
    }

    pub fn record_suggestion(&self) {
        self.record_outcome(CommandOutcome::Suggest);
    }

    pub fn record_auto_execution(&self) {
        self.record_outcome(CommandOutcome::AutoExecute);
    }

    pub fn record_fallback(&self, reason: FallbackReason) {
        let mut state = self.lock();
        state.fallbacks += 1;
        *state.fallback_reasons.entry(reason).or_insert(0) += 1;
    }

    pub fn record_provider_request(&self, provider: &str) {
        *self
            .lock()
            .provider_requests
            .entry(provider.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_provider_failure(&self) {
        self.lock().provider_failures += 1;
    }

    pub fn record_content_rejection(&self) {
        self.lock().content_rejections += 1;
    }

    pub fn record_confidence(&self, confidence: f64) {
        if confidence.is_finite() {
            self.lock().confidence.push(confidence);
        }
    }

    pub fn record_dropped(&self, count: usize) {
        self.lock().dropped_actions += count as u64;
    }

    pub fn record_execution(&self, ok: bool) {
        let mut state = self.lock();
        if ok {
            state.actions_executed += 1;
        } else {
            state.actions_failed += 1;
        }
    }

    pub fn record_abandoned(&self) {
        self.lock().executions_abandoned += 1;
    }

    /// Read the current counters. Has no side effects.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let state = self.lock();
        let successful = state.clean_parses + state.recovered_parses;
        TelemetrySnapshot {
            total_requests: state.total_requests,
            successful_parses: successful,
            clean_parses: state.clean_parses,
            recovered_parses: state.recovered_parses,
            unparsable_responses: state.unparsable,
            clarifications_requested: state.clarifications,
            suggestions_provided: state.suggestions,
            auto_executions: state.auto_executions,
            rejections: state.rejections,
            fallbacks: state.fallbacks,
            fallback_reasons: state.fallback_reasons.clone(),
            provider_requests: state.provider_requests.clone(),
            provider_failures: state.provider_failures,
            content_rejections: state.content_rejections,
            dropped_actions: state.dropped_actions,
            actions_executed: state.actions_executed,
            actions_failed: state.actions_failed,
            executions_abandoned: state.executions_abandoned,
            confidence_samples: state.confidence.count,
            average_confidence: state.confidence.mean,
            confidence_stddev: state.confidence.stddev(),
            parse_success_rate: ratio(successful, successful + state.unparsable),
            auto_execution_rate: ratio(state.auto_executions, state.total_requests),
            fallback_rate: ratio(state.fallbacks, state.total_requests),
        }
    }

    pub fn reset(&self) {
        *self.lock() = TelemetryState::default();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_running_mean_matches_arithmetic_mean() {
        let sequences: Vec<Vec<f64>> = vec![
            vec![0.5],
            vec![0.9, 0.1],
            vec![0.95, 0.87, 0.42, 0.66, 0.71, 0.99, 0.01],
            (0..1000).map(|i| ((i * 37) % 101) as f64 / 100.0).collect(),
            vec![1e-9, 1.0 - 1e-9, 0.5, 0.5, 0.5],
        ];
        for seq in sequences {
            let telemetry = Telemetry::new();
            for v in &seq {
                telemetry.record_confidence(*v);
            }
            let mean = seq.iter().sum::<f64>() / seq.len() as f64;
            let snapshot = telemetry.snapshot();
            assert!((snapshot.average_confidence - mean).abs() < 1e-9);
            assert_eq!(snapshot.confidence_samples, seq.len() as u64);
        }
    }

    #[test]
    fn test_running_variance() {
        let mut stats = RunningStats::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.variance() - 4.0).abs() < 1e-12);
        assert!((stats.stddev() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_confidence_ignored() {
        let telemetry = Telemetry::new();
        telemetry.record_confidence(f64::NAN);
        telemetry.record_confidence(0.8);
        assert_eq!(telemetry.snapshot().confidence_samples, 1);
    }

    #[test]
    fn test_counters_and_rates() {
        let telemetry = Telemetry::new();
        for _ in 0..4 {
            telemetry.record_request();
        }
        telemetry.record_parse(ParseQuality::Clean);
        telemetry.record_parse(ParseQuality::Recovered);
        telemetry.record_parse(ParseQuality::Clean);
        telemetry.record_parse(ParseQuality::Unparsable);
        telemetry.record_auto_execution();
        telemetry.record_auto_execution();
        telemetry.record_suggestion();
        telemetry.record_clarification();
        telemetry.record_outcome(CommandOutcome::Reject);
        telemetry.record_fallback(FallbackReason::Timeout);
        telemetry.record_provider_request("fast");
        telemetry.record_provider_request("fast");
        telemetry.record_provider_request("smart");

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.successful_parses, 3);
        assert_eq!(snapshot.unparsable_responses, 1);
        assert_eq!(snapshot.auto_executions, 2);
        assert_eq!(snapshot.suggestions_provided, 1);
        assert_eq!(snapshot.clarifications_requested, 1);
        assert_eq!(snapshot.rejections, 1);
        assert_eq!(snapshot.fallback_reasons[&FallbackReason::Timeout], 1);
        assert_eq!(snapshot.provider_requests["fast"], 2);
        assert!((snapshot.parse_success_rate - 0.75).abs() < 1e-12);
        assert!((snapshot.auto_execution_rate - 0.5).abs() < 1e-12);
        assert!((snapshot.fallback_rate - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_has_no_side_effects() {
        let telemetry = Telemetry::new();
        telemetry.record_request();
        telemetry.record_confidence(0.7);
        let first = telemetry.snapshot();
        let second = telemetry.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_snapshot_rates_are_zero() {
        let snapshot = Telemetry::new().snapshot();
        assert_eq!(snapshot.parse_success_rate, 0.0);
        assert_eq!(snapshot.auto_execution_rate, 0.0);
        assert_eq!(snapshot.average_confidence, 0.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let telemetry = Telemetry::new();
        telemetry.record_request();
        telemetry.record_fallback(FallbackReason::Auth);
        telemetry.record_confidence(0.3);
        telemetry.reset();
        assert_eq!(telemetry.snapshot(), Telemetry::new().snapshot());
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = Telemetry::new();
        let b = Telemetry::new();
        a.record_request();
        assert_eq!(a.snapshot().total_requests, 1);
        assert_eq!(b.snapshot().total_requests, 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let telemetry = Arc::new(Telemetry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&telemetry);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        t.record_request();
                        t.record_confidence(0.5);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.total_requests, 4000);
        assert_eq!(snapshot.confidence_samples, 4000);
    }

    #[test]
    fn test_summary_mentions_key_figures() {
        let telemetry = Telemetry::new();
        telemetry.record_request();
        telemetry.record_parse(ParseQuality::Clean);
        telemetry.record_confidence(0.9);
        telemetry.record_fallback(FallbackReason::Timeout);
        let summary = telemetry.snapshot().summary();
        assert!(summary.contains("requests:        1"));
        assert!(summary.contains("avg 0.900"));
        assert!(summary.contains("timeout=1"));
    }
}
