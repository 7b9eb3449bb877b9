use std::f64::consts::PI;

use num_complex::Complex64;

const TAU: f64 = 2.0 * PI;

/// One complex VNA sweep: a frequency axis and the matching S-parameter
/// samples. The axis is uniformly spaced by construction (the instrument
/// sweeps linearly between its start and stop frequencies).
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub frequencies_hz: Vec<f64>,
    pub samples: Vec<Complex64>,
}

impl Trace {
    pub fn new(frequencies_hz: Vec<f64>, samples: Vec<Complex64>) -> Self {
        debug_assert_eq!(frequencies_hz.len(), samples.len());
        Self {
            frequencies_hz,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frequency spacing between adjacent samples.
    pub fn spacing_hz(&self) -> f64 {
        let n = self.frequencies_hz.len();
        if n < 2 {
            return 0.0;
        }
        (self.frequencies_hz[n - 1] - self.frequencies_hz[0]) / (n - 1) as f64
    }

    /// Magnitude-squared response, |s|².
    pub fn amplitude(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.norm_sqr()).collect()
    }

    /// Phase wrapped to (−π, π].
    pub fn phase(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.arg()).collect()
    }

    /// Continuity-preserving unwrapped phase.
    pub fn unwrapped_phase(&self) -> Vec<f64> {
        unwrap_phase(&self.phase())
    }

    /// Index of the sample closest to `frequency_hz`.
    pub fn nearest_index(&self, frequency_hz: f64) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (i, &f) in self.frequencies_hz.iter().enumerate() {
            let distance = (f - frequency_hz).abs();
            if distance < best_distance {
                best_distance = distance;
                best = i;
            }
        }
        best
    }

    /// Index of the minimum of |s|².
    pub fn amplitude_min_index(&self) -> usize {
        let amps = self.amplitude();
        let mut best = 0;
        for (i, &a) in amps.iter().enumerate() {
            if a < amps[best] {
                best = i;
            }
        }
        best
    }
}

/// Unwrap a wrapped phase sequence by removing 2π jumps between neighbours.
///
/// After unwrapping, successive differences lie in (−π, π] — any larger jump
/// in the input is folded back by the appropriate multiple of 2π.
pub fn unwrap_phase(wrapped: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(wrapped.len());
    let Some(&first) = wrapped.first() else {
        return out;
    };
    out.push(first);
    for i in 1..wrapped.len() {
        let mut delta = (wrapped[i] - wrapped[i - 1]) % TAU;
        if delta > PI {
            delta -= TAU;
        } else if delta <= -PI {
            delta += TAU;
        }
        out.push(out[i - 1] + delta);
    }
    out
}

/// |d(values)/df| with uniform sample spacing: centered differences in the
/// interior, one-sided at the ends.
pub fn gradient_abs(values: &[f64], spacing: f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![0.0; n];
    if n < 2 || spacing == 0.0 {
        return out;
    }
    out[0] = ((values[1] - values[0]) / spacing).abs();
    out[n - 1] = ((values[n - 1] - values[n - 2]) / spacing).abs();
    for i in 1..n - 1 {
        out[i] = ((values[i + 1] - values[i - 1]) / (2.0 * spacing)).abs();
    }
    out
}

/// A uniformly spaced frequency axis from `start_hz` to `stop_hz` inclusive.
pub fn frequency_axis(start_hz: f64, stop_hz: f64, points: usize) -> Vec<f64> {
    if points < 2 {
        return vec![start_hz];
    }
    let step = (stop_hz - start_hz) / (points - 1) as f64;
    (0..points).map(|i| start_hz + step * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_spacing_is_uniform() {
        let axis = frequency_axis(5.0e9, 5.2e9, 2001);
        let trace = Trace::new(axis, vec![Complex64::new(1.0, 0.0); 2001]);
        assert!((trace.spacing_hz() - 1.0e5).abs() < 1e-6);
        for pair in trace.frequencies_hz.windows(2) {
            assert!((pair[1] - pair[0] - 1.0e5).abs() < 1e-4);
        }
    }

    #[test]
    fn unwrap_removes_two_pi_jumps() {
        // A steadily decreasing phase that wraps once.
        let true_phase: Vec<f64> = (0..100).map(|i| -0.1 * i as f64).collect();
        let wrapped: Vec<f64> = true_phase
            .iter()
            .map(|p| {
                let mut w = p % TAU;
                if w <= -PI {
                    w += TAU;
                } else if w > PI {
                    w -= TAU;
                }
                w
            })
            .collect();
        let unwrapped = unwrap_phase(&wrapped);
        for (u, t) in unwrapped.iter().zip(&true_phase) {
            assert!((u - t).abs() < 1e-9);
        }
    }

    #[test]
    fn unwrapped_differences_stay_within_pi() {
        let wrapped: Vec<f64> = (0..500)
            .map(|i| {
                let x = (i as f64 - 250.0) / 20.0;
                -(x.atan()) * 2.0
            })
            .collect();
        let unwrapped = unwrap_phase(&wrapped);
        for pair in unwrapped.windows(2) {
            let d = pair[1] - pair[0];
            assert!(d > -PI && d <= PI, "difference {} out of (-pi, pi]", d);
        }
    }

    #[test]
    fn gradient_of_linear_ramp_is_constant() {
        let values: Vec<f64> = (0..50).map(|i| 3.0 * i as f64).collect();
        let grad = gradient_abs(&values, 0.5);
        for g in grad {
            assert!((g - 6.0).abs() < 1e-9);
        }
    }

    #[test]
    fn nearest_index_and_min_index() {
        let axis = frequency_axis(0.0, 10.0, 11);
        let samples: Vec<Complex64> = (0..11)
            .map(|i| Complex64::new(if i == 7 { 0.1 } else { 1.0 }, 0.0))
            .collect();
        let trace = Trace::new(axis, samples);
        assert_eq!(trace.nearest_index(6.8), 7);
        assert_eq!(trace.amplitude_min_index(), 7);
    }
}
