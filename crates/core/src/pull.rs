use crate::detect::ResonanceDetector;
use crate::probe;
use crate::scan::{scan_coupling, CouplingScanParams};
use crate::session::Bench;
use crate::store::SessionStore;
use crate::TuneError;

/// Empirical mode slope of this cavity assembly: how fast a mode's
/// frequency moves per millimeter of cavity length. Negative — lengthening
/// the cavity lowers the mode.
pub const MODE_SLOPE_HZ_PER_MM: f64 = -160.0e6;

/// Largest single length correction the puller will take.
pub const MAX_STEP_MM: f64 = 0.2;

/// Mapping from a frequency error to a signed length correction. The slope
/// is empirical per physical assembly, so it is pluggable.
pub type FreqErrorToLengthStep = Box<dyn Fn(f64) -> f64 + Send>;

/// Default translation: follow the assembly's mode slope, clamped.
pub fn default_length_step(freq_error_hz: f64) -> f64 {
    (freq_error_hz / MODE_SLOPE_HZ_PER_MM).clamp(-MAX_STEP_MM, MAX_STEP_MM)
}

/// Coarse frequency puller: iteratively walks the linear stage until the
/// tracked mode sits within `tolerance_hz` of the target.
///
/// Convergence is not guaranteed — the lookup table is trusted to start
/// close, and this loop only closes residual gaps. It tracks the *deepest*
/// detected mode, not the nearest in frequency: a shallow mode nearer the
/// target is usually a spurious box mode that the optimizer cannot deepen.
pub struct CoarsePuller {
    /// Width of the initial wideband detection window.
    pub wide_span_hz: f64,
    /// VNA span while closing in on the selected mode.
    pub narrow_span_hz: f64,
    /// IF bandwidth of the wideband detection sweep.
    pub detect_bandwidth_hz: f64,
    /// IF bandwidth of the re-detection sweeps.
    pub refine_bandwidth_hz: f64,
    /// Residual gap at which the puller stops.
    pub tolerance_hz: f64,
    pub max_iterations: u32,
    pub translate: FreqErrorToLengthStep,
}

impl Default for CoarsePuller {
    fn default() -> Self {
        Self {
            wide_span_hz: 500.0e6,
            narrow_span_hz: 30.0e6,
            detect_bandwidth_hz: 5.0e4,
            refine_bandwidth_hz: 1.0e5,
            tolerance_hz: 1.0e6,
            max_iterations: 25,
            translate: Box::new(default_length_step),
        }
    }
}

impl CoarsePuller {
    /// Pull the nearest usable mode onto `target_hz`.
    ///
    /// The VNA settings in force on entry are restored before returning.
    pub fn pull(
        &self,
        bench: &mut Bench,
        target_hz: f64,
        detector: &ResonanceDetector,
        scan: &CouplingScanParams,
        mut store: Option<&mut SessionStore>,
    ) -> Result<(), TuneError> {
        let saved = bench.vna.settings()?;
        let result = self.pull_inner(bench, target_hz, detector, scan, store.as_deref_mut());
        let restored = bench.vna.apply_settings(&saved);
        result?;
        restored
    }

    fn pull_inner(
        &self,
        bench: &mut Bench,
        target_hz: f64,
        detector: &ResonanceDetector,
        scan: &CouplingScanParams,
        mut store: Option<&mut SessionStore>,
    ) -> Result<(), TuneError> {
        // Make sure the modes are visible at all before hunting for them.
        scan_coupling(bench, target_hz, scan)?;

        let half = self.wide_span_hz / 2.0;
        let found = detector.detect(
            bench.vna,
            target_hz - half,
            target_hz + half,
            self.detect_bandwidth_hz,
            store.as_deref_mut(),
        )?;
        if found.is_empty() {
            log::warn!(
                "coarse pull: no resonances within {:.0} MHz of {:.4} GHz, leaving the \
                 stage where it is",
                self.wide_span_hz * 1e-6,
                target_hz * 1e-9
            );
            return Ok(());
        }

        // Probe every candidate and track the deepest dip.
        let mut selected = f64::NAN;
        let mut deepest = f64::INFINITY;
        for &frequency in &found {
            let tone = probe::tone_depth(bench.vna, frequency)?;
            log::debug!(
                "coarse pull candidate {:.6} GHz, depth {:.3e}",
                frequency * 1e-9,
                tone.depth_linear
            );
            if tone.depth_linear < deepest {
                deepest = tone.depth_linear;
                selected = tone.frequency_at_min_hz;
            }
        }
        log::info!(
            "coarse pull: tracking mode at {:.6} GHz (depth {:.3e})",
            selected * 1e-9,
            deepest
        );

        let mut delta = target_hz - selected;
        let mut iterations = 0u32;
        while delta.abs() > self.tolerance_hz {
            bench.vna.set_span_hz(self.narrow_span_hz)?;
            bench.vna.set_center_hz(selected)?;

            let step_mm = (self.translate)(delta);
            log::debug!(
                "coarse pull: {:+.3} MHz off, moving stage {:+.4} mm",
                delta * 1e-6,
                step_mm
            );
            bench.linear.move_rel_mm(step_mm)?;

            let redetected = detector.detect(
                bench.vna,
                selected - self.narrow_span_hz,
                selected + self.narrow_span_hz,
                self.refine_bandwidth_hz,
                store.as_deref_mut(),
            )?;

            iterations += 1;
            if iterations > self.max_iterations {
                log::warn!(
                    "coarse pull: iteration cap ({}) reached {:+.3} MHz off the target",
                    self.max_iterations,
                    delta * 1e-6
                );
                break;
            }
            if redetected.is_empty() {
                log::warn!("coarse pull: lost the mode, falling back to a broad re-tune");
                self.recover(bench, target_hz, detector, store.as_deref_mut())?;
                break;
            }

            selected = redetected[0];
            delta = target_hz - selected;
            log::debug!(
                "coarse pull: mode now at {:.6} GHz ({:+.3} MHz off)",
                selected * 1e-9,
                delta * 1e-6
            );
        }
        Ok(())
    }

    /// One broad re-detect over the wideband window: step toward whatever is
    /// nearest the target and hand the rest to the optimizer.
    fn recover(
        &self,
        bench: &mut Bench,
        target_hz: f64,
        detector: &ResonanceDetector,
        store: Option<&mut SessionStore>,
    ) -> Result<(), TuneError> {
        let half = self.wide_span_hz / 2.0;
        let found = detector.detect(
            bench.vna,
            target_hz - half,
            target_hz + half,
            self.detect_bandwidth_hz,
            store,
        )?;
        let Some(nearest) = found
            .into_iter()
            .min_by(|a, b| (a - target_hz).abs().total_cmp(&(b - target_hz).abs()))
        else {
            log::warn!("coarse pull: broad re-tune found nothing either");
            return Ok(());
        };
        let delta = target_hz - nearest;
        bench.linear.move_rel_mm((self.translate)(delta))?;
        log::info!(
            "coarse pull: re-tuned toward {:.6} GHz ({:+.3} MHz off)",
            nearest * 1e-9,
            delta * 1e-6
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_step_follows_the_mode_slope() {
        // Target above the mode: shorten the cavity (negative step).
        let step = default_length_step(20.0e6);
        assert!(step < 0.0);
        assert!((step - 20.0e6 / MODE_SLOPE_HZ_PER_MM).abs() < 1e-12);
    }

    #[test]
    fn default_step_is_clamped() {
        assert_eq!(default_length_step(1.0e9), -MAX_STEP_MM);
        assert_eq!(default_length_step(-1.0e9), MAX_STEP_MM);
    }
}
