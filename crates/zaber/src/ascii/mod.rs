//! Zaber ASCII protocol.
//!
//! Commands are framed as `"/<device> <axis> [<message id>] <data>\r\n"`.
//! Replies start with `@` (command replies), `#` (info) or `!` (alerts) and
//! may carry a trailing `:XX` longitudinal checksum.

pub use axis::AsciiAxis;
pub use command::AsciiCommand;
pub use device::AsciiDevice;
pub use port::AsciiPort;
pub use reply::{lrc_checksum, AsciiReply, DeviceStatus, MessageType, ReplyFlag};

mod axis;
mod command;
mod device;
mod port;
mod reply;
