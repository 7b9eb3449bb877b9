use thiserror::Error;

/// Errors that can occur while talking to a Zaber device.
#[derive(Debug, Error)]
pub enum ZaberError {
    #[error("serial I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("read timed out")]
    Timeout,

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("checksum mismatch: found {found}, expected {expected}")]
    ChecksumMismatch { found: String, expected: String },

    #[error("unexpected reply from device {device}, axis {axis}")]
    UnexpectedReply { device: u8, axis: u8 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
