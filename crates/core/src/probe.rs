use crate::instrument::{set_window, VnaControl};
use crate::{Trace, TuneError};

/// Span of the depth-probe window. Narrow on purpose: the optimizer wants
/// the residual depth *at the target frequency*, not at whatever nearby
/// minimum the resonance currently sits on.
pub const PROBE_SPAN_HZ: f64 = 0.1e6;

/// IF bandwidth of the depth probe.
pub const PROBE_BANDWIDTH_HZ: f64 = 1.0e5;

/// Source power of the depth probe.
pub const PROBE_POWER_DBM: f64 = 10.0;

/// Result of a narrow-span depth measurement around one frequency.
#[derive(Debug, Clone)]
pub struct ToneDepth {
    /// |s|² at the sample closest to the probe center.
    pub depth_linear: f64,
    /// Frequency of the amplitude minimum inside the probe window.
    pub frequency_at_min_hz: f64,
    /// The narrow trace itself, kept for diagnostics.
    pub trace: Trace,
}

impl ToneDepth {
    pub fn depth_db(&self) -> f64 {
        10.0 * self.depth_linear.log10()
    }
}

/// Measure the depth of the response at `center_hz` with the default narrow
/// window. The VNA settings in force on entry are restored afterwards.
pub fn tone_depth(vna: &mut dyn VnaControl, center_hz: f64) -> Result<ToneDepth, TuneError> {
    tone_depth_with(vna, center_hz, PROBE_SPAN_HZ, PROBE_BANDWIDTH_HZ)
}

/// [`tone_depth`] with an explicit span and bandwidth.
pub fn tone_depth_with(
    vna: &mut dyn VnaControl,
    center_hz: f64,
    span_hz: f64,
    bandwidth_hz: f64,
) -> Result<ToneDepth, TuneError> {
    let saved = vna.settings()?;
    let result = measure(vna, center_hz, span_hz, bandwidth_hz);
    let restored = vna.apply_settings(&saved);
    let tone = result?;
    restored?;
    Ok(tone)
}

fn measure(
    vna: &mut dyn VnaControl,
    center_hz: f64,
    span_hz: f64,
    bandwidth_hz: f64,
) -> Result<ToneDepth, TuneError> {
    set_window(vna, center_hz, span_hz, bandwidth_hz, PROBE_POWER_DBM)?;
    let trace = vna.acquire()?;
    if trace.is_empty() {
        return Err(TuneError::Instrument("depth probe returned an empty trace".into()));
    }

    let amplitude = trace.amplitude();
    let depth_linear = amplitude[trace.nearest_index(center_hz)];
    let frequency_at_min_hz = trace.frequencies_hz[trace.amplitude_min_index()];

    Ok(ToneDepth {
        depth_linear,
        frequency_at_min_hz,
        trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_db_converts_linear_amplitude() {
        let tone = ToneDepth {
            depth_linear: 1e-3,
            frequency_at_min_hz: 5.2e9,
            trace: Trace::new(vec![5.2e9], vec![num_complex::Complex64::new(0.0, 0.0)]),
        };
        assert!((tone.depth_db() + 30.0).abs() < 1e-9);
    }
}
