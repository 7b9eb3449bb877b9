use std::io::{Read, Write};
use std::time::Duration;

use crate::{BinaryCommand, BinaryReply, ZaberError};

/// Default baud rate for the Binary protocol.
pub const DEFAULT_BAUD: u32 = 9600;

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A serial port speaking the Binary protocol.
pub struct BinaryPort<S> {
    stream: S,
}

impl BinaryPort<Box<dyn serialport::SerialPort>> {
    /// Open a real serial port at the Binary protocol's default baud rate.
    pub fn open(path: &str) -> Result<Self, ZaberError> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(DEFAULT_TIMEOUT)
            .open()
            .map_err(|e| ZaberError::Io(std::io::Error::other(e)))?;
        log::info!("opened Zaber binary port {}", path);
        Ok(Self::new(port))
    }
}

impl<S: Read + Write> BinaryPort<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn write_command(&mut self, command: &BinaryCommand) -> Result<(), ZaberError> {
        log::debug!("> {}", command);
        self.stream.write_all(&command.encode())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read exactly one six-byte reply frame.
    pub fn read_reply(&mut self, message_id: bool) -> Result<BinaryReply, ZaberError> {
        let mut frame = [0u8; 6];
        let mut filled = 0;
        while filled < frame.len() {
            match self.stream.read(&mut frame[filled..]) {
                Ok(0) => return Err(ZaberError::Timeout),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(ZaberError::Timeout)
                }
                Err(e) => return Err(ZaberError::Io(e)),
            }
        }
        let reply = BinaryReply::decode(frame, message_id);
        log::debug!("< {}", reply);
        Ok(reply)
    }
}
