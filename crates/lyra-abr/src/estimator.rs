use crate::{ThroughputSample, ThroughputSampleSource};

/// Throughput estimation strategy.
#[cfg_attr(test, unimock::unimock(api = EstimatorMock))]
pub trait Estimator: Send {
    /// Estimated throughput in bits per second.
    fn estimate_bps(&self) -> Option<u64>;

    /// Throughput sustained over the long window, bits per second.
    fn stable_bps(&self) -> Option<u64>;

    fn push_sample(&mut self, sample: ThroughputSample);

    /// Forget every sample (e.g. after a long pause).
    fn reset(&mut self);
}

/// Fast/slow EWMA throughput estimator.
///
/// The estimate is the minimum of both averages, so it drops quickly and
/// rises slowly.
#[derive(Clone, Debug)]
pub struct ThroughputEstimator {
    fast: Ewma,
    slow: Ewma,
    bytes_sampled: u64,
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputEstimator {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;
    const MIN_CHUNK_BYTES: u64 = 16_000;
    const MIN_DURATION_MS: f64 = 0.5;

    pub fn new() -> Self {
        Self {
            fast: Ewma::new(Self::FAST_HALF_LIFE_SECS),
            slow: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
            bytes_sampled: 0,
        }
    }

    pub fn bytes_sampled(&self) -> u64 {
        self.bytes_sampled
    }
}

#[expect(clippy::cast_possible_truncation)]
fn to_bps(value: f64) -> Option<u64> {
    (value > 0.0).then(|| value.round() as u64)
}

impl Estimator for ThroughputEstimator {
    fn estimate_bps(&self) -> Option<u64> {
        to_bps(
            self.fast
                .value()
                .min(self.slow.value()),
        )
    }

    fn stable_bps(&self) -> Option<u64> {
        to_bps(self.slow.value())
    }

    fn push_sample(&mut self, sample: ThroughputSample) {
        if !matches!(sample.source, ThroughputSampleSource::Network) {
            return;
        }
        if sample.bytes < Self::MIN_CHUNK_BYTES {
            return;
        }

        let dur_ms = (sample.duration.as_secs_f64() * 1000.0).max(Self::MIN_DURATION_MS);
        #[expect(clippy::cast_precision_loss)]
        let bps = (sample.bytes as f64) * 8000.0 / dur_ms;
        let weight_secs = dur_ms / 1000.0;

        self.fast.push(weight_secs, bps);
        self.slow.push(weight_secs, bps);
        self.bytes_sampled = self.bytes_sampled.saturating_add(sample.bytes);
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Exponentially weighted moving average, weighted by sample duration and
/// corrected for its zero start.
#[derive(Clone, Debug)]
struct Ewma {
    /// Decay per second of sample weight.
    decay: f64,
    raw: f64,
    weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            decay: 0.5_f64.powf(1.0 / half_life_secs.max(0.001)),
            raw: 0.0,
            weight: 0.0,
        }
    }

    fn push(&mut self, weight: f64, value: f64) {
        let weight = weight.max(0.0);
        let kept = self.decay.powf(weight);
        self.raw = kept * self.raw + (1.0 - kept) * value;
        self.weight += weight;
    }

    fn value(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let bias = 1.0 - self.decay.powf(self.weight);
        self.raw / bias.max(1e-6)
    }
}
