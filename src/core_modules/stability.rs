// THEORY:
// The stability classifier turns a pixel's running statistics into the value the
// rest of the system sees. It is a pure per-pixel function: statistics and the
// previously reported stable value go in, the output value and the updated
// stable value come out.
//
// Key principles:
// 1.  **Exact variance test**: `variance <= max_variance` is rearranged to
//     `sum_squares * n <= max_variance * n^2 + sum^2`, evaluated in unsigned
//     integers. No division happens until the pixel is known to be stable, and
//     the boundary is exact.
// 2.  **Hysteresis dead band**: a stable pixel whose mean stays within
//     `hysteresis` of its last reported value keeps reporting the old value.
//     The stored value only moves once the mean leaves the band. This is what
//     stops contour lines from shimmering.
// 3.  **Holes**: an unstable pixel either keeps its last stable value
//     (`retain_valids`) or reports a fixed sentinel. In neither case is the
//     stored stable value touched, so hysteresis resumes correctly once the
//     pixel settles.

use crate::core_modules::ring_statistics::PixelStatistics;

/// Thresholds and hole policy for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCriteria {
    pub min_num_samples: u32,
    pub max_variance: u32,
    pub hysteresis: f32,
    pub retain_valids: bool,
    pub instable_value: f32,
}

/// What happened to a pixel this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelState {
    /// Stable, and the mean moved outside the dead band.
    Updated,
    /// Stable, but the mean stayed inside the dead band.
    Held,
    /// Unstable; the last stable value is reported.
    Retained,
    /// Unstable; the sentinel is reported.
    Instable,
}

impl PixelState {
    pub fn is_stable(&self) -> bool {
        matches!(self, PixelState::Updated | PixelState::Held)
    }
}

/// The exact integer form of `count >= min && variance <= max_variance`.
#[inline]
pub fn is_stable(stats: &PixelStatistics, min_num_samples: u32, max_variance: u32) -> bool {
    if stats.valid_count < min_num_samples {
        return false;
    }
    let n = stats.valid_count as u64;
    stats.sum_squares * n <= max_variance as u64 * n * n + stats.sum * stats.sum
}

/// Classifies one pixel and returns its output value.
#[inline]
pub fn classify(
    stats: &PixelStatistics,
    stable_value: &mut f32,
    criteria: &StabilityCriteria,
) -> (f32, PixelState) {
    if is_stable(stats, criteria.min_num_samples, criteria.max_variance) {
        // With a zero minimum an empty ring passes the test but has no mean.
        let Some(candidate) = stats.mean() else {
            return (*stable_value, PixelState::Held);
        };
        if (candidate - *stable_value).abs() >= criteria.hysteresis {
            *stable_value = candidate;
            (candidate, PixelState::Updated)
        } else {
            (*stable_value, PixelState::Held)
        }
    } else if criteria.retain_valids {
        (*stable_value, PixelState::Retained)
    } else {
        (criteria.instable_value, PixelState::Instable)
    }
}

/// The last confidently assigned value of every pixel.
pub struct StableValueBuffer {
    values: Vec<f32>,
}

impl StableValueBuffer {
    pub fn new(pixel_count: usize) -> Self {
        Self {
            values: vec![0.0; pixel_count],
        }
    }

    #[inline]
    pub fn get(&self, pixel_index: usize) -> f32 {
        self.values[pixel_index]
    }

    #[inline]
    pub fn get_mut(&mut self, pixel_index: usize) -> &mut f32 {
        &mut self.values[pixel_index]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_of(samples: &[u64]) -> PixelStatistics {
        PixelStatistics {
            valid_count: samples.len() as u32,
            sum: samples.iter().sum(),
            sum_squares: samples.iter().map(|s| s * s).sum(),
        }
    }

    fn criteria(min: u32, variance: u32, hysteresis: f32, retain: bool) -> StabilityCriteria {
        StabilityCriteria {
            min_num_samples: min,
            max_variance: variance,
            hysteresis,
            retain_valids: retain,
            instable_value: -1.0,
        }
    }

    fn float_variance(samples: &[u64]) -> f64 {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<u64>() as f64 / n;
        samples.iter().map(|&s| s as f64 * s as f64).sum::<f64>() / n - mean * mean
    }

    #[test]
    fn integer_test_agrees_with_float_variance() {
        let histories: [&[u64]; 6] = [
            &[100, 100, 100, 100, 100],
            &[100, 102, 100, 102],
            &[1, 254],
            &[50, 51, 52, 53, 54, 55, 56],
            &[200],
            &[10, 10, 10, 13],
        ];
        for history in histories {
            for max_variance in 0..12u32 {
                let exact = is_stable(&stats_of(history), 1, max_variance);
                let float = float_variance(history) <= max_variance as f64 + 1e-9;
                assert_eq!(exact, float, "history {history:?}, max variance {max_variance}");
            }
        }
    }

    #[test]
    fn variance_boundary_is_inclusive() {
        // Variance of [98, 102] is exactly 4.
        let stats = stats_of(&[98, 102]);
        assert!(is_stable(&stats, 2, 4));
        assert!(!is_stable(&stats, 2, 3));
    }

    #[test]
    fn sample_count_boundary_is_inclusive() {
        let stats = stats_of(&[100; 5]);
        assert!(is_stable(&stats, 5, 0));
        assert!(!is_stable(&stats, 6, 0));
    }

    #[test]
    fn empty_pixel_needs_a_zero_minimum_to_pass() {
        assert!(is_stable(&PixelStatistics::default(), 0, 0));
        assert!(!is_stable(&PixelStatistics::default(), 1, 100));
    }

    #[test]
    fn empty_pixel_with_zero_minimum_holds_previous_value() {
        let mut stable = 42.0;
        let empty = PixelStatistics::default();
        let (value, state) = classify(&empty, &mut stable, &criteria(0, 0, 0.0, false));
        assert_eq!(state, PixelState::Held);
        assert_eq!(value, 42.0);
        assert_eq!(stable, 42.0);
    }

    #[test]
    fn stable_pixel_outside_band_updates() {
        let mut stable = 0.0;
        let (value, state) = classify(&stats_of(&[100; 5]), &mut stable, &criteria(5, 0, 0.5, true));
        assert_eq!(value, 100.0);
        assert_eq!(state, PixelState::Updated);
        assert_eq!(stable, 100.0);
    }

    #[test]
    fn dead_band_reports_previous_value() {
        let mut stable = 100.0;
        let stats = stats_of(&[100, 100, 101]);
        let (value, state) = classify(&stats, &mut stable, &criteria(3, 1, 1.0, true));
        assert_eq!(state, PixelState::Held);
        assert_eq!(value, 100.0);
        assert_eq!(stable, 100.0);
    }

    #[test]
    fn unstable_pixel_retains_last_value() {
        let mut stable = 87.5;
        let (value, state) = classify(&stats_of(&[10, 200]), &mut stable, &criteria(2, 4, 0.1, true));
        assert_eq!(state, PixelState::Retained);
        assert_eq!(value, 87.5);
        assert_eq!(stable, 87.5);
    }

    #[test]
    fn unstable_pixel_reports_sentinel_and_keeps_state() {
        let mut stable = 87.5;
        let (value, state) = classify(&stats_of(&[10]), &mut stable, &criteria(2, 4, 0.1, false));
        assert_eq!(state, PixelState::Instable);
        assert_eq!(value, -1.0);
        assert_eq!(stable, 87.5);
        assert!(!state.is_stable());
    }
}
