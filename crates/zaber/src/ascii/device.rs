use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{AsciiAxis, AsciiCommand, AsciiPort, AsciiReply, DeviceStatus, ReplyFlag, ZaberError};

/// Cadence at which the device is polled while waiting for motion to finish.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One device on an ASCII daisy chain.
///
/// Cloning is cheap: clones share the underlying port through a mutex, so a
/// device and the axes derived from it can coexist. Every exchange is
/// validated — the reply must come from this device, the addressed axis and
/// the same message ID, otherwise [`ZaberError::UnexpectedReply`] is raised.
pub struct AsciiDevice<S> {
    port: Arc<Mutex<AsciiPort<S>>>,
    address: u8,
}

impl<S> Clone for AsciiDevice<S> {
    fn clone(&self) -> Self {
        Self {
            port: Arc::clone(&self.port),
            address: self.address,
        }
    }
}

impl<S: Read + Write> AsciiDevice<S> {
    /// Attach to the device at `address` (1–99) on the given port.
    pub fn new(port: AsciiPort<S>, address: u8) -> Result<Self, ZaberError> {
        if !(1..=99).contains(&address) {
            return Err(ZaberError::InvalidParameter(format!(
                "device address must be between 1 and 99, got {}",
                address
            )));
        }
        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            address,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// An [`AsciiAxis`] handle for axis `number` (1–9) of this device.
    pub fn axis(&self, number: u8) -> Result<AsciiAxis<S>, ZaberError> {
        AsciiAxis::new(self.clone(), number)
    }

    /// Send a command to this device and wait for its reply.
    ///
    /// The command's device address is overwritten with this device's, so a
    /// handle can never accidentally broadcast; the axis number is preserved.
    pub fn send(&self, mut command: AsciiCommand) -> Result<AsciiReply, ZaberError> {
        command.device_address = self.address;

        // Write and read under one lock so concurrent holders of the port
        // cannot interleave their exchanges.
        let reply = {
            let mut port = self.port.lock();
            port.write_command(&command)?;
            port.read_reply()?
        };

        if reply.device_address != self.address
            || reply.axis_number != command.axis_number
            || reply.message_id != command.message_id
        {
            return Err(ZaberError::UnexpectedReply {
                device: reply.device_address,
                axis: reply.axis_number,
            });
        }
        if reply.reply_flag == Some(ReplyFlag::Rejected) {
            log::warn!(
                "device {} rejected command {:?}: {}",
                self.address,
                command.data,
                reply.data
            );
        }
        Ok(reply)
    }

    /// Send device-scope command text (axis 0).
    pub fn command(&self, data: &str) -> Result<AsciiReply, ZaberError> {
        self.send(AsciiCommand::new(self.address, 0, data))
    }

    /// Poll the device status until it reports idle.
    ///
    /// `axis_number` 0 polls the device as a whole (busy while any axis
    /// moves); 1–9 polls a single axis.
    pub fn poll_until_idle(&self, axis_number: u8) -> Result<AsciiReply, ZaberError> {
        loop {
            let reply = self.send(AsciiCommand::new(self.address, axis_number, ""))?;
            if reply.device_status == Some(DeviceStatus::Idle) {
                return Ok(reply);
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    /// Home the device and block until it is idle.
    pub fn home(&self) -> Result<AsciiReply, ZaberError> {
        let reply = self.command("home")?;
        self.poll_until_idle(0)?;
        Ok(reply)
    }

    /// Move to an absolute position in microsteps.
    pub fn move_abs(&self, position: i64, blocking: bool) -> Result<AsciiReply, ZaberError> {
        let reply = self.command(&format!("move abs {}", position))?;
        if blocking {
            self.poll_until_idle(0)?;
        }
        Ok(reply)
    }

    /// Move by a relative number of microsteps.
    pub fn move_rel(&self, distance: i64, blocking: bool) -> Result<AsciiReply, ZaberError> {
        let reply = self.command(&format!("move rel {}", distance))?;
        if blocking {
            self.poll_until_idle(0)?;
        }
        Ok(reply)
    }

    /// Move at a constant speed. Unlike the positioning moves this does not
    /// block by default — a velocity move only ends on `stop` or a limit.
    pub fn move_vel(&self, speed: i64, blocking: bool) -> Result<AsciiReply, ZaberError> {
        let reply = self.command(&format!("move vel {}", speed))?;
        if blocking {
            self.poll_until_idle(0)?;
        }
        Ok(reply)
    }

    /// Pre-empt any movement command.
    pub fn stop(&self) -> Result<AsciiReply, ZaberError> {
        let reply = self.command("stop")?;
        self.poll_until_idle(0)?;
        Ok(reply)
    }

    pub fn get_status(&self) -> Result<DeviceStatus, ZaberError> {
        let reply = self.command("")?;
        reply
            .device_status
            .ok_or_else(|| ZaberError::Malformed("status reply carried no status".into()))
    }

    /// Current position in microsteps. On a multi-axis device this is the
    /// position of the first axis.
    pub fn get_position(&self) -> Result<i64, ZaberError> {
        let reply = self.command("get pos")?;
        let first = reply.data.split(' ').next().unwrap_or("");
        first
            .parse()
            .map_err(|_| ZaberError::Malformed(format!("invalid position: {:?}", reply.data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ascii::port::testing::FakeStream;

    fn device(replies: &[&str]) -> AsciiDevice<FakeStream> {
        AsciiDevice::new(AsciiPort::new(FakeStream::new(replies)), 1).unwrap()
    }

    #[test]
    fn rejects_out_of_range_address() {
        let port = AsciiPort::new(FakeStream::new(&[]));
        assert!(AsciiDevice::new(port, 0).is_err());
    }

    #[test]
    fn send_overwrites_device_address() {
        let dev = device(&["@01 0 OK IDLE -- 0\r\n"]);
        let reply = dev
            .send(AsciiCommand::new(42, 0, "get pos"))
            .expect("reply");
        assert_eq!(reply.device_address, 1);
        assert_eq!(
            dev.port.lock().stream().written_lines(),
            vec!["/1 0 get pos\r\n"]
        );
    }

    #[test]
    fn mismatched_device_is_a_protocol_error() {
        let dev = device(&["@02 0 OK IDLE -- 0\r\n"]);
        assert!(matches!(
            dev.command("get pos"),
            Err(ZaberError::UnexpectedReply { device: 2, .. })
        ));
    }

    #[test]
    fn mismatched_message_id_is_a_protocol_error() {
        let dev = device(&["@01 0 09 OK IDLE -- 0\r\n"]);
        assert!(matches!(
            dev.send(AsciiCommand::new(1, 0, "get pos").with_message_id(3)),
            Err(ZaberError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn blocking_move_polls_until_idle() {
        let dev = device(&[
            "@01 0 OK BUSY -- 0\r\n",
            "@01 0 OK BUSY -- 0\r\n",
            "@01 0 OK IDLE -- 0\r\n",
        ]);
        dev.move_abs(10_000, true).expect("move");
        let lines = dev.port.lock().stream().written_lines();
        assert_eq!(lines[0], "/1 0 move abs 10000\r\n");
        // Two status polls until the idle reply arrived.
        assert_eq!(lines[1..], ["/1 0\r\n", "/1 0\r\n"]);
    }

    #[test]
    fn get_position_takes_first_axis_of_multi_axis_reply() {
        let dev = device(&["@01 0 OK IDLE -- 10000 20000\r\n"]);
        assert_eq!(dev.get_position().unwrap(), 10_000);
    }
}
