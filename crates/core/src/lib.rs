pub use cost::{evaluate as cost_evaluate, DETECT_BANDWIDTH_HZ, EMPTY_WINDOW_LEVEL};
pub use detect::{DetectorParams, PeakAnalysis, PhaseGradientSweep, ResonanceDetector};
pub use error::{SessionFailure, TuneError};
pub use instrument::{
    park, set_window, steps_from_radians, unpark, LinearAxis, LinearStage, RotaryAxis,
    RotaryStage, ScpiTransport, VisaTcpTransport, Vna, VnaControl, VnaSettings, MAX_POINTS,
    MAX_POWER_DBM, MM_PER_MICROSTEP, PARK_SETTINGS, POINTS_PER_BANDWIDTH, STEPS_PER_RADIAN,
};
pub use lookup::{LookupEntry, ModeLookup, MATCH_WINDOW_GHZ, MIN_MODE_SPACING_MM};
pub use probe::{tone_depth, tone_depth_with, ToneDepth, PROBE_BANDWIDTH_HZ, PROBE_SPAN_HZ};
pub use pull::{default_length_step, CoarsePuller, FreqErrorToLengthStep, MODE_SLOPE_HZ_PER_MM};
pub use scan::{scan_coupling, CouplingScanParams};
pub use session::{
    Bench, CancelToken, TuneOptions, TuneOutcome, TuningSession, MAX_ITERATIONS, ROTARY_SPEED,
    SIMPLEX_TOLERANCE,
};
pub use simplex::{Bounds, NelderMead, SimplexDriver, SimplexOutcome, Termination, Verdict};
pub use store::{PeakRecord, SessionStore, SweepRecord};
pub use trace::{frequency_axis, gradient_abs, unwrap_phase, Trace};
pub use tuner::{span_for_iteration, IterationRecord, Target, TuningController};

mod cost;
mod detect;
pub mod dsp;
mod error;
pub mod instrument;
mod lookup;
mod probe;
mod pull;
mod scan;
mod session;
mod simplex;
mod store;
mod trace;
mod tuner;
