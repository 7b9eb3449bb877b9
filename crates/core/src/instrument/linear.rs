use std::io::{Read, Write};

use cavtune_zaber::{AsciiDevice, AsciiPort};

use super::LinearAxis;
use crate::TuneError;

/// Linear-stage scale: millimeters per microstep.
pub const MM_PER_MICROSTEP: f64 = 0.047625e-3;

/// Façade for the Zaber linear stage that sets the cavity length.
///
/// Positions are exposed in millimeters; the underlying device works in
/// microsteps. All moves block until the stage reports idle.
pub struct LinearStage<S> {
    device: AsciiDevice<S>,
    mm_per_step: f64,
}

impl LinearStage<Box<dyn serialport::SerialPort>> {
    /// Open the stage on a real serial port.
    pub fn open(path: &str, device_number: u8) -> Result<Self, TuneError> {
        let port = AsciiPort::open(path)?;
        let device = AsciiDevice::new(port, device_number)?;
        Ok(Self::new(device))
    }
}

impl<S: Read + Write> LinearStage<S> {
    pub fn new(device: AsciiDevice<S>) -> Self {
        Self {
            device,
            mm_per_step: MM_PER_MICROSTEP,
        }
    }

    /// Override the step scale for a stage with different microstepping.
    pub fn with_scale(mut self, mm_per_step: f64) -> Self {
        self.mm_per_step = mm_per_step;
        self
    }

    pub fn home(&mut self) -> Result<(), TuneError> {
        self.device.home()?;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), TuneError> {
        self.device.stop()?;
        Ok(())
    }

    /// Absolute move in microsteps.
    pub fn move_abs(&mut self, position: i64, blocking: bool) -> Result<(), TuneError> {
        self.device.move_abs(position, blocking)?;
        Ok(())
    }

    /// Relative move in microsteps.
    pub fn move_rel(&mut self, distance: i64, blocking: bool) -> Result<(), TuneError> {
        self.device.move_rel(distance, blocking)?;
        Ok(())
    }

    fn steps(&self, mm: f64) -> i64 {
        (mm / self.mm_per_step) as i64
    }
}

impl<S: Read + Write> LinearAxis for LinearStage<S> {
    fn move_abs_mm(&mut self, position_mm: f64) -> Result<(), TuneError> {
        self.move_abs(self.steps(position_mm), true)
    }

    fn move_rel_mm(&mut self, distance_mm: f64) -> Result<(), TuneError> {
        self.move_rel(self.steps(distance_mm), true)
    }

    fn position_mm(&mut self) -> Result<f64, TuneError> {
        Ok(self.device.get_position()? as f64 * self.mm_per_step)
    }

    fn wait_until_idle(&mut self) -> Result<(), TuneError> {
        self.device.poll_until_idle(0)?;
        Ok(())
    }
}
