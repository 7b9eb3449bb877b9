use crate::detect::ResonanceDetector;
use crate::instrument::VnaControl;
use crate::probe;
use crate::store::SessionStore;
use crate::tuner::Target;
use crate::TuneError;

/// IF bandwidth of the detection sweep inside a cost evaluation.
pub const DETECT_BANDWIDTH_HZ: f64 = 5.0e4;

/// Level reported when the window contains no detectable resonance at all.
/// Large enough that any vertex with a mode in view beats it, finite so the
/// simplex can still rank vertices and walk back.
pub const EMPTY_WINDOW_LEVEL: f64 = 1.0e12;

/// Evaluate the tuning cost around the target.
///
/// Every resonance detected within `span_hz` of the target is refined with
/// the narrow depth probe, scored as
/// `((f - target)/f_tol)^2 + (depth/d_tol)^2`, and the *minimum* over
/// candidates is returned: the landscape follows the best mode in view,
/// which is the one the mechanics are being asked to produce.
pub fn evaluate(
    vna: &mut dyn VnaControl,
    detector: &ResonanceDetector,
    target: &Target,
    span_hz: f64,
    mut store: Option<&mut SessionStore>,
) -> Result<f64, TuneError> {
    let half = span_hz / 2.0;
    let resonances = detector.detect(
        vna,
        target.frequency_hz - half,
        target.frequency_hz + half,
        DETECT_BANDWIDTH_HZ,
        store.as_deref_mut(),
    )?;

    if resonances.is_empty() {
        log::warn!(
            "no resonances within {:.0} MHz of {:.4} GHz",
            span_hz * 1e-6,
            target.frequency_hz * 1e-9
        );
        vna.autoscale()?;
        return Ok(EMPTY_WINDOW_LEVEL);
    }

    let mut level = f64::INFINITY;
    for frequency in resonances {
        let tone = probe::tone_depth(vna, frequency)?;
        let frequency_term = ((tone.frequency_at_min_hz - target.frequency_hz)
            / target.frequency_tolerance_hz)
            .powi(2);
        let depth_term = (tone.depth_linear / target.depth_tolerance).powi(2);
        level = level.min(frequency_term + depth_term);
    }

    vna.autoscale()?;
    Ok(level)
}
