//! Instrument façades and the traits the tuning engine drives them through.
//!
//! The engine only ever sees [`VnaControl`], [`LinearAxis`] and
//! [`RotaryAxis`]; the concrete façades ([`Vna`], [`LinearStage`],
//! [`RotaryStage`]) adapt the SCPI, Zaber ASCII and TMCL wire layers onto
//! those contracts. Tests drive the engine against mock implementations.

pub use linear::{LinearStage, MM_PER_MICROSTEP};
pub use rotary::{steps_from_radians, RotaryStage, STEPS_PER_RADIAN};
pub use scpi::{ScpiTransport, VisaTcpTransport};
pub use vna::{
    park, set_window, unpark, Vna, VnaSettings, MAX_POINTS, MAX_POWER_DBM, PARK_SETTINGS,
    POINTS_PER_BANDWIDTH,
};

pub mod linear;
pub mod rotary;
pub mod scpi;
pub mod tmcl;
pub mod vna;

use crate::{Trace, TuneError};

/// Contract the tuning engine needs from the vector network analyzer.
///
/// Setters take effect before the next [`acquire`](VnaControl::acquire)
/// returns — implementations must not let a sweep begin while a preceding
/// configuration write is still in flight.
pub trait VnaControl {
    /// Capture the current sweep window so it can be restored later.
    fn settings(&mut self) -> Result<VnaSettings, TuneError>;

    /// Apply a previously captured sweep window.
    fn apply_settings(&mut self, settings: &VnaSettings) -> Result<(), TuneError>;

    fn set_center_hz(&mut self, center_hz: f64) -> Result<(), TuneError>;
    fn set_span_hz(&mut self, span_hz: f64) -> Result<(), TuneError>;
    fn span_hz(&mut self) -> Result<f64, TuneError>;
    fn set_start_stop_hz(&mut self, start_hz: f64, stop_hz: f64) -> Result<(), TuneError>;
    fn set_bandwidth_hz(&mut self, bandwidth_hz: f64) -> Result<(), TuneError>;
    fn set_points(&mut self, points: u32) -> Result<(), TuneError>;
    fn set_power_dbm(&mut self, power_dbm: f64) -> Result<(), TuneError>;

    /// Run one sweep and return the complex trace with its frequency axis.
    fn acquire(&mut self) -> Result<Trace, TuneError>;

    /// Rescale the display. Cosmetic; called after each cost evaluation.
    fn autoscale(&mut self) -> Result<(), TuneError>;

    /// One-shot electrical-delay calibration to flatten the phase baseline
    /// before a wideband sweep.
    fn electrical_delay_auto(&mut self) -> Result<(), TuneError>;
}

/// Contract for the cavity-length actuator.
///
/// Moves block until the axis reports idle; a position read always reflects
/// the last settled position.
pub trait LinearAxis {
    fn move_abs_mm(&mut self, position_mm: f64) -> Result<(), TuneError>;
    fn move_rel_mm(&mut self, distance_mm: f64) -> Result<(), TuneError>;
    fn position_mm(&mut self) -> Result<f64, TuneError>;
    fn wait_until_idle(&mut self) -> Result<(), TuneError>;
}

/// Contract for the antenna-coupling actuator.
///
/// Positions are unbounded microsteps — no wrap at a full turn, so the whole
/// physical range stays reachable.
pub trait RotaryAxis {
    fn move_absolute(&mut self, steps: i64) -> Result<(), TuneError>;
    fn move_relative(&mut self, delta_steps: i64) -> Result<(), TuneError>;
    fn position(&mut self) -> Result<i64, TuneError>;
    fn set_speed(&mut self, speed: u32) -> Result<(), TuneError>;
    fn wait_until_idle(&mut self) -> Result<(), TuneError>;
}
