//! Zaber Binary protocol: fixed six-byte frames
//! `<device, command, i32 data little-endian>`.
//!
//! When message IDs are enabled on the device, the top byte of the data word
//! carries the ID and only 24 bits of data remain; replies must then be read
//! with `message_id = true` so the data field is sign-extended correctly.

pub use command::BinaryCommand;
pub use port::BinaryPort;
pub use reply::BinaryReply;

mod command;
mod port;
mod reply;
