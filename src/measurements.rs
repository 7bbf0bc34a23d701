use crate::stats::{jitter, mean, round_to};
use crate::transport::Sample;
use std::time::Duration;

/// Round-trip latency estimate derived from one probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyResult {
    pub average_ms: u64,
    pub jitter_ms: u64,
}

impl LatencyResult {
    /// Reduce a run of samples to an average and a jitter.
    ///
    /// A failed sample counts as `penalty` instead of being dropped, so the
    /// sample count stays fixed and an unreachable target reads as slow.
    /// Samples must be in the order they were taken.
    pub fn from_samples(samples: &[Sample], penalty: Duration) -> Self {
        let penalty_ms = penalty.as_millis() as u64;
        let values: Vec<u64> = samples
            .iter()
            .map(|sample| {
                if sample.succeeded {
                    sample.duration_ms
                } else {
                    penalty_ms
                }
            })
            .collect();

        Self { average_ms: mean(&values), jitter_ms: jitter(&values) }
    }
}

/// Throughput of one transfer in megabits per second, rounded to two
/// decimals. `0.0` means the transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThroughputResult {
    pub mbps: f64,
}

impl ThroughputResult {
    pub const FAILED: ThroughputResult = ThroughputResult { mbps: 0.0 };

    pub fn from_transfer(bytes: u64, elapsed: Duration) -> Self {
        Self { mbps: calculate_speed_mbps(bytes, elapsed.as_secs_f64()) }
    }
}

/// Convert a transfer of `bytes` over `elapsed_secs` into Mbps.
///
/// `(bytes * 8) / seconds / 1_000_000`, rounded to two decimals. A
/// non-positive elapsed time means the transfer never completed and
/// yields `0.0`.
pub fn calculate_speed_mbps(bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || !elapsed_secs.is_finite() {
        return 0.0;
    }

    let bits = bytes as f64 * 8.0;

    round_to(bits / elapsed_secs / 1_000_000.0, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PENALTY: Duration = Duration::from_millis(1000);

    fn ok(ms: u64) -> Sample {
        Sample { duration_ms: ms, succeeded: true }
    }

    fn failed(ms: u64) -> Sample {
        Sample { duration_ms: ms, succeeded: false }
    }

    #[test]
    fn test_latency_flat_samples() {
        let result = LatencyResult::from_samples(&[ok(100), ok(100), ok(100), ok(100)], PENALTY);
        assert_eq!(result, LatencyResult { average_ms: 100, jitter_ms: 0 });
    }

    #[test]
    fn test_latency_alternating_samples() {
        let result = LatencyResult::from_samples(&[ok(50), ok(150), ok(50), ok(150)], PENALTY);
        assert_eq!(result, LatencyResult { average_ms: 100, jitter_ms: 100 });
    }

    #[test]
    fn test_latency_all_failed() {
        let result = LatencyResult::from_samples(
            &[failed(5000), failed(5000), failed(12), failed(0)],
            PENALTY,
        );
        assert_eq!(result, LatencyResult { average_ms: 1000, jitter_ms: 0 });
    }

    #[test]
    fn test_latency_failure_is_penalised_not_dropped() {
        // [100, 1000, 100, 100]: mean 325, jitter (900 + 900 + 0) / 3
        let result = LatencyResult::from_samples(&[ok(100), failed(30), ok(100), ok(100)], PENALTY);
        assert_eq!(result, LatencyResult { average_ms: 325, jitter_ms: 600 });
    }

    #[test]
    fn test_latency_single_sample_has_no_jitter() {
        let result = LatencyResult::from_samples(&[ok(42)], PENALTY);
        assert_eq!(result, LatencyResult { average_ms: 42, jitter_ms: 0 });
    }

    #[test]
    fn test_speed_ten_megabytes_in_one_second() {
        assert_eq!(calculate_speed_mbps(10_000_000, 1.0), 80.0);
    }

    #[test]
    fn test_speed_non_positive_elapsed() {
        assert_eq!(calculate_speed_mbps(10_000_000, 0.0), 0.0);
        assert_eq!(calculate_speed_mbps(10_000_000, -1.0), 0.0);
        assert_eq!(calculate_speed_mbps(10_000_000, f64::NAN), 0.0);
    }

    #[test]
    fn test_speed_rounds_to_two_decimals() {
        // 1 MB in 3 s = 2.6666... Mbps
        assert_eq!(calculate_speed_mbps(1_000_000, 3.0), 2.67);
    }

    #[test]
    fn test_throughput_from_transfer() {
        let result = ThroughputResult::from_transfer(1_000_000, Duration::from_millis(500));
        assert_eq!(result.mbps, 16.0);

        let result = ThroughputResult::from_transfer(1_000_000, Duration::ZERO);
        assert_eq!(result, ThroughputResult::FAILED);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Speeds are never negative and carry at most two decimals.
        #[test]
        fn speed_is_non_negative_and_rounded(
            bytes in 0u64..1_000_000_000,
            elapsed_secs in 0.01f64..100.0,
        ) {
            let mbps = calculate_speed_mbps(bytes, elapsed_secs);

            prop_assert!(mbps >= 0.0);
            prop_assert!(((mbps * 100.0).round() - mbps * 100.0).abs() < 1e-6);
        }

        /// Average latency never drops below the fastest sample, even with
        /// penalty substitution.
        #[test]
        fn latency_average_at_least_fastest_sample(
            durations in prop::collection::vec(0u64..5_000, 4),
            outcomes in prop::collection::vec(any::<bool>(), 4),
        ) {
            let samples: Vec<Sample> = durations
                .iter()
                .zip(&outcomes)
                .map(|(&duration_ms, &succeeded)| Sample { duration_ms, succeeded })
                .collect();
            let result = LatencyResult::from_samples(&samples, PENALTY);
            let fastest = samples
                .iter()
                .map(|s| if s.succeeded { s.duration_ms } else { 1000 })
                .min()
                .unwrap();

            prop_assert!(result.average_ms >= fastest);
        }
    }
}
