use std::io::{Read, Write};

use crate::{AsciiCommand, AsciiDevice, AsciiReply, DeviceStatus, ZaberError};

/// One axis of an ASCII device.
///
/// Commands sent through an axis handle are always routed to that axis,
/// regardless of the axis number in the command itself.
pub struct AsciiAxis<S> {
    parent: AsciiDevice<S>,
    number: u8,
}

impl<S: Read + Write> AsciiAxis<S> {
    pub(crate) fn new(parent: AsciiDevice<S>, number: u8) -> Result<Self, ZaberError> {
        if !(1..=9).contains(&number) {
            return Err(ZaberError::InvalidParameter(format!(
                "axis number must be between 1 and 9, got {}",
                number
            )));
        }
        Ok(Self { parent, number })
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn send(&self, mut command: AsciiCommand) -> Result<AsciiReply, ZaberError> {
        command.axis_number = self.number;
        let reply = self.parent.send(command)?;
        if reply.axis_number != self.number {
            return Err(ZaberError::UnexpectedReply {
                device: reply.device_address,
                axis: reply.axis_number,
            });
        }
        Ok(reply)
    }

    fn command(&self, data: &str) -> Result<AsciiReply, ZaberError> {
        self.send(AsciiCommand::new(self.parent.address(), self.number, data))
    }

    pub fn home(&self) -> Result<AsciiReply, ZaberError> {
        let reply = self.command("home")?;
        self.poll_until_idle()?;
        Ok(reply)
    }

    pub fn move_abs(&self, position: i64, blocking: bool) -> Result<AsciiReply, ZaberError> {
        let reply = self.command(&format!("move abs {}", position))?;
        if blocking {
            self.poll_until_idle()?;
        }
        Ok(reply)
    }

    pub fn move_rel(&self, distance: i64, blocking: bool) -> Result<AsciiReply, ZaberError> {
        let reply = self.command(&format!("move rel {}", distance))?;
        if blocking {
            self.poll_until_idle()?;
        }
        Ok(reply)
    }

    pub fn move_vel(&self, speed: i64, blocking: bool) -> Result<AsciiReply, ZaberError> {
        let reply = self.command(&format!("move vel {}", speed))?;
        if blocking {
            self.poll_until_idle()?;
        }
        Ok(reply)
    }

    pub fn stop(&self) -> Result<AsciiReply, ZaberError> {
        let reply = self.command("stop")?;
        self.poll_until_idle()?;
        Ok(reply)
    }

    pub fn get_status(&self) -> Result<DeviceStatus, ZaberError> {
        let reply = self.command("")?;
        reply
            .device_status
            .ok_or_else(|| ZaberError::Malformed("status reply carried no status".into()))
    }

    pub fn get_position(&self) -> Result<i64, ZaberError> {
        let reply = self.command("get pos")?;
        reply
            .data
            .parse()
            .map_err(|_| ZaberError::Malformed(format!("invalid position: {:?}", reply.data)))
    }

    pub fn poll_until_idle(&self) -> Result<AsciiReply, ZaberError> {
        self.parent.poll_until_idle(self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ascii::port::testing::FakeStream;
    use crate::AsciiPort;

    #[test]
    fn commands_are_routed_to_this_axis() {
        let port = AsciiPort::new(FakeStream::new(&["@01 2 OK IDLE -- 4096\r\n"]));
        let dev = AsciiDevice::new(port, 1).unwrap();
        let axis = dev.axis(2).unwrap();
        assert_eq!(axis.get_position().unwrap(), 4096);
    }

    #[test]
    fn reply_from_wrong_axis_is_rejected() {
        let port = AsciiPort::new(FakeStream::new(&["@01 1 OK IDLE -- 4096\r\n"]));
        let dev = AsciiDevice::new(port, 1).unwrap();
        let axis = dev.axis(2).unwrap();
        assert!(matches!(
            axis.get_position(),
            Err(ZaberError::UnexpectedReply { axis: 1, .. })
        ));
    }

    #[test]
    fn axis_zero_is_invalid() {
        let port = AsciiPort::new(FakeStream::new(&[]));
        let dev = AsciiDevice::new(port, 1).unwrap();
        assert!(dev.axis(0).is_err());
    }
}
