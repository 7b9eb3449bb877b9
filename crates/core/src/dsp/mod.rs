//! Signal processing used by the resonance detector: Savitzky–Golay
//! smoothing and adaptive-threshold peak finding over phase-gradient traces.

pub use peaks::find_peaks;
pub use savgol::{savgol_coeffs, savgol_filter};

mod peaks;
mod savgol;
