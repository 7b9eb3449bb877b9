use std::f64::consts::TAU;
use std::io::{Read, Write};
use std::time::Duration;

use super::tmcl::{axis_parameter, command, mvp, TmclBus};
use super::RotaryAxis;
use crate::TuneError;

/// Rotary-stage scale: microsteps per radian of antenna rotation
/// (200 full steps per revolution at 256 microsteps).
pub const STEPS_PER_RADIAN: f64 = 200.0 * 256.0 / TAU;

/// Cadence at which the position-reached flag is polled during a move.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Façade for the Trinamic rotary stage that sets the antenna-coupling
/// angle.
///
/// Positions are raw microsteps and accumulate monotonically — the stage is
/// never wrapped at a full turn, so the operator can walk the entire
/// physical range and beyond.
pub struct RotaryStage<S> {
    bus: TmclBus<S>,
    motor: u8,
}

impl RotaryStage<Box<dyn serialport::SerialPort>> {
    /// Open the stage on a real serial port.
    pub fn open(path: &str, module_address: u8, motor: u8) -> Result<Self, TuneError> {
        Ok(Self::new(TmclBus::open(path, module_address)?, motor))
    }
}

/// Convert an angle in radians to rotary-stage microsteps.
pub fn steps_from_radians(angle_rad: f64) -> i64 {
    (angle_rad * STEPS_PER_RADIAN).round() as i64
}

impl<S: Read + Write> RotaryStage<S> {
    pub fn new(bus: TmclBus<S>, motor: u8) -> Self {
        Self { bus, motor }
    }

    pub fn rotate_right(&mut self, speed: u32) -> Result<(), TuneError> {
        self.bus
            .exec(command::ROTATE_RIGHT, 0, self.motor, speed as i32)?;
        Ok(())
    }

    pub fn rotate_left(&mut self, speed: u32) -> Result<(), TuneError> {
        self.bus
            .exec(command::ROTATE_LEFT, 0, self.motor, speed as i32)?;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), TuneError> {
        self.bus.exec(command::STOP, 0, self.motor, 0)?;
        Ok(())
    }
}

impl<S: Read + Write> RotaryAxis for RotaryStage<S> {
    fn move_absolute(&mut self, steps: i64) -> Result<(), TuneError> {
        self.bus.exec(
            command::MOVE_TO_POSITION,
            mvp::ABSOLUTE,
            self.motor,
            steps as i32,
        )?;
        Ok(())
    }

    fn move_relative(&mut self, delta_steps: i64) -> Result<(), TuneError> {
        self.bus.exec(
            command::MOVE_TO_POSITION,
            mvp::RELATIVE,
            self.motor,
            delta_steps as i32,
        )?;
        Ok(())
    }

    fn position(&mut self) -> Result<i64, TuneError> {
        let value = self.bus.exec(
            command::GET_AXIS_PARAMETER,
            axis_parameter::ACTUAL_POSITION,
            self.motor,
            0,
        )?;
        Ok(value as i64)
    }

    fn set_speed(&mut self, speed: u32) -> Result<(), TuneError> {
        self.bus.exec(
            command::SET_AXIS_PARAMETER,
            axis_parameter::MAX_POSITIONING_SPEED,
            self.motor,
            speed as i32,
        )?;
        Ok(())
    }

    fn wait_until_idle(&mut self) -> Result<(), TuneError> {
        loop {
            let reached = self.bus.exec(
                command::GET_AXIS_PARAMETER,
                axis_parameter::POSITION_REACHED,
                self.motor,
                0,
            )?;
            if reached != 0 {
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_full_turn_is_the_motor_microstep_count() {
        assert_eq!(steps_from_radians(TAU), 51_200);
    }

    #[test]
    fn step_scale_is_symmetric() {
        let forward = steps_from_radians(0.1 * TAU);
        let back = steps_from_radians(-0.1 * TAU);
        assert_eq!(forward, -back);
        assert_eq!(forward, 5_120);
    }
}
