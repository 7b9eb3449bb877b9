//! TMCL wire protocol for Trinamic stepper controllers.
//!
//! Nine-byte request frames `[address, command, type, motor, i32 value
//! big-endian, checksum]` where the checksum is the byte sum of the first
//! eight bytes. Replies mirror the layout with a status byte; status 100
//! means the command was accepted.

use std::io::{Read, Write};
use std::time::Duration;

use crate::TuneError;

/// TMCL command numbers used by the rotary stage.
pub mod command {
    pub const ROTATE_RIGHT: u8 = 1;
    pub const ROTATE_LEFT: u8 = 2;
    pub const STOP: u8 = 3;
    pub const MOVE_TO_POSITION: u8 = 4;
    pub const SET_AXIS_PARAMETER: u8 = 5;
    pub const GET_AXIS_PARAMETER: u8 = 6;
}

/// Axis parameter numbers.
pub mod axis_parameter {
    pub const TARGET_POSITION: u8 = 0;
    pub const ACTUAL_POSITION: u8 = 1;
    pub const MAX_POSITIONING_SPEED: u8 = 4;
    pub const POSITION_REACHED: u8 = 8;
}

/// MVP addressing modes.
pub mod mvp {
    pub const ABSOLUTE: u8 = 0;
    pub const RELATIVE: u8 = 1;
}

/// Status code for an accepted command.
pub const STATUS_OK: u8 = 100;

/// Default baud rate for TMCL modules.
pub const DEFAULT_BAUD: u32 = 9600;

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// A single TMCL request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmclRequest {
    pub address: u8,
    pub command: u8,
    pub type_number: u8,
    pub motor: u8,
    pub value: i32,
}

impl TmclRequest {
    pub fn encode(&self) -> [u8; 9] {
        let mut frame = [0u8; 9];
        frame[0] = self.address;
        frame[1] = self.command;
        frame[2] = self.type_number;
        frame[3] = self.motor;
        frame[4..8].copy_from_slice(&self.value.to_be_bytes());
        frame[8] = checksum(&frame[..8]);
        frame
    }
}

/// A single TMCL reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmclReply {
    pub reply_address: u8,
    pub module_address: u8,
    pub status: u8,
    pub command: u8,
    pub value: i32,
}

impl TmclReply {
    pub fn decode(frame: [u8; 9]) -> Result<Self, TuneError> {
        let expected = checksum(&frame[..8]);
        if frame[8] != expected {
            return Err(TuneError::Protocol(format!(
                "TMCL checksum mismatch: found {:#04x}, expected {:#04x}",
                frame[8], expected
            )));
        }
        Ok(Self {
            reply_address: frame[0],
            module_address: frame[1],
            status: frame[2],
            command: frame[3],
            value: i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
        })
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// A TMCL module on a byte stream.
pub struct TmclBus<S> {
    stream: S,
    address: u8,
}

impl TmclBus<Box<dyn serialport::SerialPort>> {
    /// Open a module on a real serial port.
    pub fn open(path: &str, address: u8) -> Result<Self, TuneError> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(DEFAULT_TIMEOUT)
            .open()
            .map_err(|e| TuneError::Instrument(format!("open {}: {}", path, e)))?;
        log::info!("opened TMCL port {}", path);
        Ok(Self::new(port, address))
    }
}

impl<S: Read + Write> TmclBus<S> {
    pub fn new(stream: S, address: u8) -> Self {
        Self { stream, address }
    }

    /// Execute one command and return the reply value.
    pub fn exec(
        &mut self,
        command: u8,
        type_number: u8,
        motor: u8,
        value: i32,
    ) -> Result<i32, TuneError> {
        let request = TmclRequest {
            address: self.address,
            command,
            type_number,
            motor,
            value,
        };
        self.stream
            .write_all(&request.encode())
            .and_then(|_| self.stream.flush())
            .map_err(|e| TuneError::Instrument(format!("TMCL write: {}", e)))?;

        let mut frame = [0u8; 9];
        let mut filled = 0;
        while filled < frame.len() {
            match self.stream.read(&mut frame[filled..]) {
                Ok(0) => return Err(TuneError::Instrument("TMCL read: short frame".into())),
                Ok(n) => filled += n,
                Err(e) => return Err(TuneError::Instrument(format!("TMCL read: {}", e))),
            }
        }

        let reply = TmclReply::decode(frame)?;
        if reply.command != command {
            return Err(TuneError::Protocol(format!(
                "TMCL reply echoes command {} but {} was sent",
                reply.command, command
            )));
        }
        if reply.status != STATUS_OK {
            return Err(TuneError::Instrument(format!(
                "TMCL command {} failed with status {}",
                command, reply.status
            )));
        }
        Ok(reply.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_carries_checksum() {
        let frame = TmclRequest {
            address: 1,
            command: command::MOVE_TO_POSITION,
            type_number: mvp::ABSOLUTE,
            motor: 0,
            value: 0x0102_0304,
        }
        .encode();
        assert_eq!(&frame[..8], &[1, 4, 0, 0, 1, 2, 3, 4]);
        assert_eq!(frame[8], 15);
    }

    #[test]
    fn reply_round_trip() {
        let mut frame = [2, 1, STATUS_OK, command::GET_AXIS_PARAMETER, 0xFF, 0xFF, 0xFF, 0xFF, 0];
        frame[8] = frame[..8].iter().fold(0u8, |a, &b| a.wrapping_add(b));
        let reply = TmclReply::decode(frame).unwrap();
        assert_eq!(reply.status, STATUS_OK);
        assert_eq!(reply.value, -1);
    }

    #[test]
    fn corrupt_checksum_is_a_protocol_error() {
        let frame = [2, 1, STATUS_OK, 6, 0, 0, 0, 0, 0xAA];
        assert!(matches!(
            TmclReply::decode(frame),
            Err(TuneError::Protocol(_))
        ));
    }
}
