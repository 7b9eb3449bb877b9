//! Serial protocols for Zaber motion controllers.
//!
//! Zaber stages speak two wire protocols. The ASCII protocol frames
//! human-readable lines (`"/1 1 move abs 10000\r\n"`) with an optional
//! longitudinal checksum on replies; the Binary protocol uses fixed six-byte
//! frames. Both are implemented here over any `io::Read + io::Write`
//! transport so they can be exercised against in-memory fakes; real hardware
//! is reached through [`ascii::AsciiPort::open`] and
//! [`binary::BinaryPort::open`], which sit on top of the `serialport` crate.

pub use ascii::{
    AsciiAxis, AsciiCommand, AsciiDevice, AsciiPort, AsciiReply, DeviceStatus, MessageType,
    ReplyFlag,
};
pub use binary::{BinaryCommand, BinaryPort, BinaryReply};
pub use error::ZaberError;

pub mod ascii;
pub mod binary;
mod error;
