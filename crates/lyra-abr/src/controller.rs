use std::sync::Arc;

use lyra_manifest::Representation;
use tracing::debug;
use web_time::Instant;

use crate::{AbrMode, AbrOptions, Estimator, ThroughputEstimator, ThroughputSample};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbrReason {
    Initial,
    ManualOverride,
    UpSwitch,
    DownSwitch,
    MinInterval,
    NoEstimate,
    BufferTooLowForUpSwitch,
    AlreadyOptimal,
}

#[derive(Clone, Debug)]
pub struct AbrDecision {
    pub target: Arc<Representation>,
    pub reason: AbrReason,
    pub changed: bool,
    /// A down-switch while the buffer is about to run dry.
    pub urgent: bool,
}

/// Picks a Representation from throughput estimates and the buffer gap.
pub struct AbrController<E: Estimator = ThroughputEstimator> {
    cfg: AbrOptions,
    current: Option<String>,
    estimator: E,
    last_switch_at: Option<Instant>,
}

impl AbrController<ThroughputEstimator> {
    #[must_use]
    pub fn new(cfg: AbrOptions) -> Self {
        Self::with_estimator(cfg, ThroughputEstimator::new())
    }
}

impl<E: Estimator> AbrController<E> {
    pub fn with_estimator(cfg: AbrOptions, estimator: E) -> Self {
        Self {
            cfg,
            current: None,
            estimator,
            last_switch_at: None,
        }
    }

    pub fn options(&self) -> &AbrOptions {
        &self.cfg
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn push_throughput_sample(&mut self, sample: ThroughputSample) {
        self.estimator.push_sample(sample);
    }

    pub fn estimate_bps(&self) -> Option<u64> {
        self.estimator.estimate_bps()
    }

    pub fn stable_bps(&self) -> Option<u64> {
        self.estimator.stable_bps()
    }

    pub fn reset_estimator(&mut self) {
        self.estimator.reset();
    }

    /// Decide among `representations` (the playable ones).
    ///
    /// Returns `None` when there is nothing to choose from.
    pub fn decide(
        &self,
        representations: &[Arc<Representation>],
        buffer_gap: f64,
        now: Instant,
    ) -> Option<AbrDecision> {
        let mut sorted: Vec<_> = representations.to_vec();
        sorted.sort_by_key(|r| r.bitrate);
        let lowest = Arc::clone(sorted.first()?);

        if let AbrMode::Manual(bitrate) = self.cfg.mode {
            let target = best_under(&sorted, bitrate).unwrap_or(lowest);
            let changed = self.current.as_deref() != Some(target.id.as_str());
            return Some(AbrDecision {
                target,
                reason: AbrReason::ManualOverride,
                changed,
                urgent: false,
            });
        }

        let current = self
            .current
            .as_deref()
            .and_then(|id| sorted.iter().find(|r| r.id == id))
            .cloned();

        let Some(current) = current else {
            let target = match self.cfg.mode {
                AbrMode::Auto(Some(initial)) => best_under(&sorted, initial).unwrap_or(lowest),
                _ => lowest,
            };
            debug!(target = %target.id, bitrate = target.bitrate, "ABR decide: initial");
            return Some(AbrDecision {
                target,
                reason: AbrReason::Initial,
                changed: true,
                urgent: false,
            });
        };

        if !self.can_switch_now(now) {
            debug!(current = %current.id, buffer_gap, "ABR decide: MinInterval not elapsed");
            return Some(AbrDecision {
                target: current,
                reason: AbrReason::MinInterval,
                changed: false,
                urgent: false,
            });
        }

        let Some(estimate_bps) = self.estimator.estimate_bps() else {
            debug!(current = %current.id, buffer_gap, "ABR decide: NoEstimate");
            return Some(AbrDecision {
                target: current,
                reason: AbrReason::NoEstimate,
                changed: false,
                urgent: false,
            });
        };

        // Divide, not multiply: the safety factor lowers the usable throughput.
        #[expect(clippy::cast_precision_loss)]
        let adjusted_bps = (estimate_bps as f64 / self.cfg.throughput_safety_factor).max(0.0);
        #[expect(clippy::cast_possible_truncation)]
        let candidate = best_under(&sorted, adjusted_bps as u64).unwrap_or(lowest);

        debug!(
            current = %current.id,
            current_bw = current.bitrate,
            candidate = %candidate.id,
            candidate_bw = candidate.bitrate,
            estimate_bps,
            adjusted_bps,
            buffer_gap,
            "ABR decide: evaluating"
        );

        if candidate.bitrate > current.bitrate {
            let buffer_ok = self.cfg.min_buffer_for_up_switch_secs <= 0.0
                || buffer_gap >= self.cfg.min_buffer_for_up_switch_secs;
            #[expect(clippy::cast_precision_loss)]
            let required_bps = (candidate.bitrate as f64) * self.cfg.up_hysteresis_ratio;
            let headroom_ok = adjusted_bps >= required_bps;
            debug!(buffer_ok, headroom_ok, required_bps, "ABR decide: up-switch check");
            if buffer_ok && headroom_ok {
                return Some(AbrDecision {
                    target: candidate,
                    reason: AbrReason::UpSwitch,
                    changed: true,
                    urgent: false,
                });
            }
            return Some(AbrDecision {
                target: current,
                reason: AbrReason::BufferTooLowForUpSwitch,
                changed: false,
                urgent: false,
            });
        }

        if candidate.bitrate < current.bitrate {
            let urgent = buffer_gap <= self.cfg.down_switch_buffer_secs;
            #[expect(clippy::cast_precision_loss)]
            let margin_ok = adjusted_bps <= (current.bitrate as f64) * self.cfg.down_hysteresis_ratio;
            if urgent || margin_ok {
                return Some(AbrDecision {
                    target: candidate,
                    reason: AbrReason::DownSwitch,
                    changed: true,
                    urgent,
                });
            }
        }

        Some(AbrDecision {
            target: current,
            reason: AbrReason::AlreadyOptimal,
            changed: false,
            urgent: false,
        })
    }

    /// Record `decision` as the current choice.
    pub fn apply(&mut self, decision: &AbrDecision, now: Instant) {
        if self.current.as_deref() == Some(decision.target.id.as_str()) {
            return;
        }
        let initial = self.current.is_none();
        self.current = Some(decision.target.id.clone());
        if !initial {
            self.last_switch_at = Some(now);
        }
    }

    fn can_switch_now(&self, now: Instant) -> bool {
        self.last_switch_at
            .is_none_or(|t| now.duration_since(t) >= self.cfg.min_switch_interval)
    }
}

/// Highest-bitrate Representation not above `bitrate`, from a sorted list.
fn best_under(sorted: &[Arc<Representation>], bitrate: u64) -> Option<Arc<Representation>> {
    sorted.iter().rev().find(|r| r.bitrate <= bitrate).cloned()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lyra_manifest::fixture;
    use rstest::rstest;
    use unimock::{MockFn, Unimock, matching};

    use super::*;
    use crate::{ThroughputSampleSource, estimator::EstimatorMock};

    fn representations() -> Vec<Arc<Representation>> {
        vec![
            fixture::representation("r256", 256_000, 4, 2.0),
            fixture::representation("r1024", 1_024_000, 4, 2.0),
            fixture::representation("r512", 512_000, 4, 2.0),
        ]
    }

    fn started(cfg: AbrOptions, current: &str, estimate: u64) -> AbrController<Unimock> {
        let mock = Unimock::new(
            EstimatorMock::estimate_bps
                .each_call(matching!())
                .returns(Some(estimate)),
        );
        let mut c = AbrController::with_estimator(cfg, mock);
        c.current = Some(current.to_string());
        c
    }

    fn no_interval() -> AbrOptions {
        AbrOptions::default()
            .with_min_switch_interval(Duration::ZERO)
            .with_min_buffer_for_up_switch(0.0)
            .with_down_switch_buffer(0.0)
    }

    #[rstest]
    #[case::down_low_throughput("r1024", 450_000, 10.0, "r256", AbrReason::DownSwitch, false)]
    #[case::up_high_throughput("r256", 2_000_000, 10.0, "r1024", AbrReason::UpSwitch, false)]
    #[case::optimal("r512", 900_000, 10.0, "r512", AbrReason::AlreadyOptimal, false)]
    fn test_throughput_based_switching(
        #[case] current: &str,
        #[case] estimate: u64,
        #[case] buffer_gap: f64,
        #[case] expected: &str,
        #[case] expected_reason: AbrReason,
        #[case] expected_urgent: bool,
    ) {
        let c = started(no_interval(), current, estimate);
        let d = c.decide(&representations(), buffer_gap, Instant::now()).unwrap();
        assert_eq!(d.target.id, expected);
        assert_eq!(d.reason, expected_reason);
        assert_eq!(d.urgent, expected_urgent);
    }

    #[test]
    fn down_switch_is_urgent_with_low_buffer() {
        let c = started(no_interval().with_down_switch_buffer(5.0), "r1024", 450_000);
        let d = c.decide(&representations(), 1.0, Instant::now()).unwrap();
        assert_eq!(d.target.id, "r256");
        assert!(d.urgent);
    }

    #[test]
    fn upswitch_requires_buffer() {
        let cfg = no_interval().with_min_buffer_for_up_switch(10.0);
        let c = started(cfg, "r256", 2_000_000);
        let d = c.decide(&representations(), 2.0, Instant::now()).unwrap();
        assert_eq!(d.target.id, "r256");
        assert_eq!(d.reason, AbrReason::BufferTooLowForUpSwitch);
    }

    #[test]
    fn initial_decision_uses_configured_bitrate() {
        let cfg = AbrOptions::default().with_mode(AbrMode::Auto(Some(600_000)));
        let c = AbrController::new(cfg);
        let d = c.decide(&representations(), 0.0, Instant::now()).unwrap();
        assert_eq!(d.target.id, "r512");
        assert_eq!(d.reason, AbrReason::Initial);
        assert!(d.changed);
    }

    #[test]
    fn manual_mode_ignores_estimates() {
        let cfg = AbrOptions::default().with_mode(AbrMode::Manual(1_024_000));
        let c = AbrController::with_estimator(cfg, Unimock::new(()));
        let d = c.decide(&representations(), 0.0, Instant::now()).unwrap();
        assert_eq!(d.target.id, "r1024");
        assert_eq!(d.reason, AbrReason::ManualOverride);
    }

    #[test]
    fn min_switch_interval_prevents_oscillation() {
        let cfg = no_interval().with_min_switch_interval(Duration::from_secs(30));
        let mut c = AbrController::new(cfg);
        let now = Instant::now();
        let reps = representations();

        let initial = c.decide(&reps, 0.0, now).unwrap();
        c.apply(&initial, now);
        c.push_throughput_sample(ThroughputSample {
            bytes: 2_000_000 / 8 * 2,
            duration: Duration::from_secs(1),
            at: now,
            source: ThroughputSampleSource::Network,
        });

        let d1 = c.decide(&reps, 20.0, now).unwrap();
        assert_eq!(d1.target.id, "r1024");
        c.apply(&d1, now);

        let d2 = c.decide(&reps, 20.0, now).unwrap();
        assert!(!d2.changed);
        assert_eq!(d2.reason, AbrReason::MinInterval);
    }

    #[test]
    fn no_change_without_estimate() {
        let mock = Unimock::new(
            EstimatorMock::estimate_bps
                .each_call(matching!())
                .returns(None),
        );
        let mut c = AbrController::with_estimator(no_interval(), mock);
        c.current = Some("r512".into());
        let d = c.decide(&representations(), 10.0, Instant::now()).unwrap();
        assert_eq!(d.target.id, "r512");
        assert_eq!(d.reason, AbrReason::NoEstimate);
    }

    #[test]
    fn nothing_to_choose_from() {
        let c = AbrController::new(AbrOptions::default());
        assert!(c.decide(&[], 0.0, Instant::now()).is_none());
    }
}
