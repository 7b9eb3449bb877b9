use crate::dsp::{find_peaks, savgol_filter};
use crate::instrument::VnaControl;
use crate::store::{timestamp, PeakRecord, SessionStore, SweepRecord};
use crate::trace::gradient_abs;
use crate::TuneError;

/// Tunable knobs of the resonance detector.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    /// Points-per-bandwidth ratio used when sizing a sweep.
    pub points_per_bandwidth: f64,
    /// Largest sweep the instrument is asked for in one go; wider windows
    /// are split into sub-intervals and stitched.
    pub max_points: u32,
    /// Source power for detection sweeps.
    pub power_dbm: f64,
    /// Savitzky–Golay window (samples, odd) applied to the phase gradient.
    pub savgol_window: usize,
    /// Savitzky–Golay polynomial order.
    pub savgol_order: usize,
    /// Minimum spacing between reported resonances.
    pub min_peak_distance_hz: f64,
    /// Window over which a peak's prominence is evaluated.
    pub prominence_window_hz: f64,
    /// Width of the slices used for the adaptive threshold.
    pub slice_hz: f64,
    /// Standard-deviation multiplier of the adaptive threshold.
    pub sigma: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            points_per_bandwidth: 5.0,
            max_points: 50_000,
            power_dbm: 10.0,
            savgol_window: 101,
            savgol_order: 3,
            min_peak_distance_hz: 10.0e6,
            prominence_window_hz: 1.0e6,
            slice_hz: 10.0e6,
            sigma: 1.0,
        }
    }
}

/// A stitched wideband sweep reduced to its unwrapped-phase gradient.
#[derive(Debug, Clone)]
pub struct PhaseGradientSweep {
    pub frequencies_hz: Vec<f64>,
    pub phase_rad: Vec<f64>,
    pub phase_unwrapped_rad: Vec<f64>,
    pub gradient: Vec<f64>,
    pub spacing_hz: f64,
}

/// Peaks extracted from a [`PhaseGradientSweep`].
#[derive(Debug, Clone)]
pub struct PeakAnalysis {
    /// Per-sample adaptive threshold (height and prominence floor).
    pub thresholds: Vec<f64>,
    /// Max-normalized filtered gradient the peaks were found on.
    pub filtered: Vec<f64>,
    pub peak_indexes: Vec<usize>,
    pub peak_frequencies_hz: Vec<f64>,
    pub peak_gradients: Vec<f64>,
}

/// Resonance detector: finds cavity modes as peaks in the gradient of the
/// unwrapped transmission phase.
///
/// A resonance pulls the transmission phase through a rapid swing, so its
/// unwrapped-phase derivative spikes even when the amplitude dip is shallow.
/// The spike is detected against an adaptive per-slice threshold
/// (`mean + sigma * stddev`), which tracks a sloping baseline across wide
/// windows.
#[derive(Debug, Clone, Default)]
pub struct ResonanceDetector {
    params: DetectorParams,
}

impl ResonanceDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect resonances in `[f_min, f_max]` at resolution `bandwidth_hz`.
    ///
    /// Returns peak frequencies, ascending, all within the window. The VNA
    /// settings in force on entry are restored before returning, on success
    /// and failure alike.
    pub fn detect(
        &self,
        vna: &mut dyn VnaControl,
        f_min_hz: f64,
        f_max_hz: f64,
        bandwidth_hz: f64,
        mut store: Option<&mut SessionStore>,
    ) -> Result<Vec<f64>, TuneError> {
        let sweep = self.sweep(vna, f_min_hz, f_max_hz, bandwidth_hz, store.as_deref_mut())?;
        let analysis = self.analyze(&sweep);

        if let Some(store) = store {
            store.save_peak_record(&PeakRecord {
                created_at: timestamp(),
                thresholds: analysis.thresholds.clone(),
                peak_indexes: analysis.peak_indexes.clone(),
                peak_frequencies_hz: analysis.peak_frequencies_hz.clone(),
                peak_gradients: analysis.peak_gradients.clone(),
            })?;
        }

        log::debug!(
            "detected {} resonance(s) in [{:.4}, {:.4}] GHz",
            analysis.peak_frequencies_hz.len(),
            f_min_hz * 1e-9,
            f_max_hz * 1e-9
        );
        Ok(analysis.peak_frequencies_hz)
    }

    /// Acquire the stitched phase-gradient sweep for a window.
    pub fn sweep(
        &self,
        vna: &mut dyn VnaControl,
        f_min_hz: f64,
        f_max_hz: f64,
        bandwidth_hz: f64,
        mut store: Option<&mut SessionStore>,
    ) -> Result<PhaseGradientSweep, TuneError> {
        let saved = vna.settings()?;
        let result = self.sweep_inner(vna, f_min_hz, f_max_hz, bandwidth_hz, store.as_deref_mut());
        let restored = vna.apply_settings(&saved);

        let sweep = result?;
        restored?;

        if let Some(store) = store {
            store.save_sweep_record(&SweepRecord {
                created_at: timestamp(),
                frequencies_hz: sweep.frequencies_hz.clone(),
                phase_rad: sweep.phase_rad.clone(),
                phase_unwrapped_rad: sweep.phase_unwrapped_rad.clone(),
                phase_gradient: sweep.gradient.clone(),
            })?;
        }
        Ok(sweep)
    }

    fn sweep_inner(
        &self,
        vna: &mut dyn VnaControl,
        f_min_hz: f64,
        f_max_hz: f64,
        bandwidth_hz: f64,
        mut store: Option<&mut SessionStore>,
    ) -> Result<PhaseGradientSweep, TuneError> {
        let p = &self.params;
        let total_span = f_max_hz - f_min_hz;
        if total_span <= 0.0 {
            return Err(TuneError::OutOfRange(format!(
                "empty detection window [{}, {}]",
                f_min_hz, f_max_hz
            )));
        }

        // Split the window until one sub-interval fits the point limit.
        let mut points = (p.points_per_bandwidth * total_span / bandwidth_hz).ceil();
        let mut sub_intervals = 1usize;
        let mut span = total_span;
        if points > p.max_points as f64 {
            sub_intervals = (points / p.max_points as f64).ceil() as usize;
            span = total_span / sub_intervals as f64;
            points = p.max_points as f64;
            log::debug!(
                "window needs {} points, splitting into {} sub-intervals",
                (p.points_per_bandwidth * total_span / bandwidth_hz).ceil(),
                sub_intervals
            );
        }
        let points = points as u32;
        let spacing = span / (points - 1) as f64;

        vna.set_power_dbm(p.power_dbm)?;
        vna.set_span_hz(span)?;
        vna.set_points(points)?;
        vna.set_bandwidth_hz(bandwidth_hz)?;

        let mut frequencies = Vec::new();
        let mut phase = Vec::new();
        let mut unwrapped_total: Vec<f64> = Vec::new();
        let mut gradient = Vec::new();

        for i in 0..sub_intervals {
            let start = f_min_hz + i as f64 * span;
            let stop = start + span;
            log::debug!(
                "sub-interval {}: [{:.6}, {:.6}] GHz",
                i + 1,
                start * 1e-9,
                stop * 1e-9
            );
            vna.set_start_stop_hz(start, stop)?;
            vna.electrical_delay_auto()?;

            let trace = vna.acquire()?;
            if let Some(store) = store.as_deref_mut() {
                store.save_raw_trace(&trace)?;
            }

            let wrapped = trace.phase();
            let unwrapped = trace.unwrapped_phase();

            // Each sub-interval is unwrapped on its own; align it so the
            // stitched phase stays continuous across the boundary.
            let shift = match unwrapped_total.last() {
                Some(&last) => last - unwrapped[0],
                None => 0.0,
            };
            unwrapped_total.extend(unwrapped.iter().map(|u| u + shift));

            gradient.extend(gradient_abs(&unwrapped, spacing));
            frequencies.extend_from_slice(&trace.frequencies_hz);
            phase.extend(wrapped);
        }

        Ok(PhaseGradientSweep {
            frequencies_hz: frequencies,
            phase_rad: phase,
            phase_unwrapped_rad: unwrapped_total,
            gradient,
            spacing_hz: spacing,
        })
    }

    /// Run the peak-finding pass on a sweep.
    pub fn analyze(&self, sweep: &PhaseGradientSweep) -> PeakAnalysis {
        let p = &self.params;
        let n = sweep.gradient.len();
        if n == 0 {
            return PeakAnalysis {
                thresholds: Vec::new(),
                filtered: Vec::new(),
                peak_indexes: Vec::new(),
                peak_frequencies_hz: Vec::new(),
                peak_gradients: Vec::new(),
            };
        }

        let mut filtered = savgol_filter(&sweep.gradient, p.savgol_window, p.savgol_order);
        let max = filtered.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max > 0.0 {
            for v in &mut filtered {
                *v /= max;
            }
        }

        // Adaptive threshold: slice the window and take mean + sigma * std
        // per slice, tiled across that slice's samples.
        let total_span = sweep.frequencies_hz[n - 1] - sweep.frequencies_hz[0];
        let slices = ((total_span / p.slice_hz).ceil() as usize).max(1);
        let samples_per_slice = (n / slices).max(1);
        let mut thresholds = Vec::with_capacity(n);
        for chunk in filtered.chunks(samples_per_slice) {
            let mean = chunk.iter().sum::<f64>() / chunk.len() as f64;
            let variance =
                chunk.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / chunk.len() as f64;
            let threshold = mean + p.sigma * variance.sqrt();
            thresholds.extend(std::iter::repeat(threshold).take(chunk.len()));
        }

        let min_distance = ((p.min_peak_distance_hz / sweep.spacing_hz).round() as usize).max(1);
        let prominence_window = (p.prominence_window_hz / sweep.spacing_hz).round() as usize;

        let peak_indexes = find_peaks(&filtered, &thresholds, min_distance, prominence_window);
        let peak_frequencies_hz: Vec<f64> = peak_indexes
            .iter()
            .map(|&i| sweep.frequencies_hz[i])
            .collect();
        let peak_gradients: Vec<f64> = peak_indexes.iter().map(|&i| filtered[i]).collect();

        PeakAnalysis {
            thresholds,
            filtered,
            peak_indexes,
            peak_frequencies_hz,
            peak_gradients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_sweep(peaks_at: &[f64]) -> PhaseGradientSweep {
        // 100 MHz window at 10 kHz spacing with arctangent poles of 50 kHz
        // half-width: sharp gradient spikes over a flat baseline.
        let n = 10_001;
        let f0 = 5.15e9;
        let spacing = 1.0e4;
        let frequencies_hz: Vec<f64> = (0..n).map(|i| f0 + spacing * i as f64).collect();
        let phase_unwrapped_rad: Vec<f64> = frequencies_hz
            .iter()
            .map(|&f| {
                peaks_at
                    .iter()
                    .map(|&fp| -((f - fp) / 5.0e4).atan())
                    .sum::<f64>()
            })
            .collect();
        let gradient = gradient_abs(&phase_unwrapped_rad, spacing);
        PhaseGradientSweep {
            frequencies_hz,
            phase_rad: phase_unwrapped_rad.clone(),
            phase_unwrapped_rad,
            gradient,
            spacing_hz: spacing,
        }
    }

    #[test]
    fn finds_isolated_poles() {
        let detector = ResonanceDetector::default();
        let sweep = synthetic_sweep(&[5.18e9, 5.22e9]);
        let analysis = detector.analyze(&sweep);
        assert_eq!(analysis.peak_frequencies_hz.len(), 2);
        assert!((analysis.peak_frequencies_hz[0] - 5.18e9).abs() <= sweep.spacing_hz);
        assert!((analysis.peak_frequencies_hz[1] - 5.22e9).abs() <= sweep.spacing_hz);
    }

    #[test]
    fn peaks_respect_minimum_distance() {
        let detector = ResonanceDetector::default();
        // Two poles 2 MHz apart, well below the 10 MHz separation floor.
        let sweep = synthetic_sweep(&[5.200e9, 5.202e9]);
        let analysis = detector.analyze(&sweep);
        assert_eq!(analysis.peak_frequencies_hz.len(), 1);
    }

    #[test]
    fn flat_sweep_has_no_peaks() {
        let detector = ResonanceDetector::default();
        let sweep = synthetic_sweep(&[]);
        let analysis = detector.analyze(&sweep);
        assert!(analysis.peak_frequencies_hz.is_empty());
    }

    #[test]
    fn thresholds_cover_every_sample() {
        let detector = ResonanceDetector::default();
        let sweep = synthetic_sweep(&[5.2e9]);
        let analysis = detector.analyze(&sweep);
        assert_eq!(analysis.thresholds.len(), sweep.gradient.len());
    }
}
