use std::io::{Read, Write};
use std::time::Duration;

use crate::ascii::reply::lrc_checksum;
use crate::{AsciiCommand, AsciiReply, ZaberError};

/// Default baud rate for Zaber devices speaking the ASCII protocol.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A serial port speaking the ASCII protocol.
///
/// Generic over the underlying byte stream so protocol handling can be
/// tested without hardware. Replies carrying a checksum are verified against
/// the raw wire bytes before parsing; a mismatch surfaces as
/// [`ZaberError::ChecksumMismatch`].
pub struct AsciiPort<S> {
    stream: S,
}

impl AsciiPort<Box<dyn serialport::SerialPort>> {
    /// Open a real serial port at the ASCII protocol's default baud rate.
    pub fn open(path: &str) -> Result<Self, ZaberError> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(DEFAULT_TIMEOUT)
            .open()
            .map_err(|e| ZaberError::Io(std::io::Error::other(e)))?;
        log::info!("opened Zaber ASCII port {}", path);
        Ok(Self::new(port))
    }
}

impl<S: Read + Write> AsciiPort<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    #[cfg(test)]
    pub(crate) fn stream(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Write a single command frame.
    pub fn write_command(&mut self, command: &AsciiCommand) -> Result<(), ZaberError> {
        let line = command.encode();
        log::debug!("> {}", line.trim_end());
        self.stream.write_all(line.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read one reply line, verifying its checksum when present.
    pub fn read_reply(&mut self) -> Result<AsciiReply, ZaberError> {
        let line = self.read_line()?;
        log::debug!("< {}", line.trim_end());
        verify_checksum(&line)?;
        AsciiReply::parse(&line)
    }

    fn read_line(&mut self) -> Result<String, ZaberError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(ZaberError::Timeout),
                Ok(_) => {
                    buf.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(ZaberError::Timeout)
                }
                Err(e) => return Err(ZaberError::Io(e)),
            }
        }
        String::from_utf8(buf).map_err(|e| ZaberError::Malformed(e.to_string()))
    }
}

/// Check the trailing `:XX` checksum of a raw reply line, if it has one.
fn verify_checksum(line: &str) -> Result<(), ZaberError> {
    let body = line.trim_end_matches(['\r', '\n']);
    let Some(colon) = body.len().checked_sub(3) else {
        return Ok(());
    };
    if body.as_bytes()[colon] != b':' {
        return Ok(());
    }
    let found = &body[colon + 1..];
    let expected = lrc_checksum(&body[1..colon]);
    if found != expected {
        return Err(ZaberError::ChecksumMismatch {
            found: found.to_string(),
            expected,
        });
    }
    Ok(())
}

/// In-memory stream for protocol tests: written bytes accumulate, reads
/// drain a queue of scripted reply lines.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io::{Read, Write};

    pub(crate) struct FakeStream {
        pub written: Vec<u8>,
        pub replies: VecDeque<u8>,
    }

    impl FakeStream {
        pub(crate) fn new(replies: &[&str]) -> Self {
            Self {
                written: Vec::new(),
                replies: replies.concat().bytes().collect(),
            }
        }

        pub(crate) fn written_lines(&self) -> Vec<String> {
            String::from_utf8(self.written.clone())
                .unwrap()
                .split_inclusive("\r\n")
                .map(str::to_string)
                .collect()
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.replies.pop_front() {
                Some(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no scripted reply",
                )),
            }
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeStream;
    use super::*;

    #[test]
    fn writes_framed_command_and_reads_reply() {
        let mut port = AsciiPort::new(FakeStream::new(&["@01 0 OK IDLE -- 0\r\n"]));
        port.write_command(&AsciiCommand::new(1, 0, "move abs 10000"))
            .unwrap();
        let reply = port.read_reply().unwrap();
        assert_eq!(reply.device_address, 1);
        assert_eq!(port.stream.written, b"/1 0 move abs 10000\r\n");
    }

    #[test]
    fn rejects_corrupt_checksum() {
        let mut port = AsciiPort::new(FakeStream::new(&["@01 1 02 OK IDLE -- 12345:A5\r\n"]));
        assert!(matches!(
            port.read_reply(),
            Err(ZaberError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn accepts_valid_checksum() {
        let mut port = AsciiPort::new(FakeStream::new(&["@01 1 02 OK IDLE -- 12345:3B\r\n"]));
        let reply = port.read_reply().unwrap();
        assert_eq!(reply.checksum.as_deref(), Some("3B"));
    }

    #[test]
    fn empty_stream_times_out() {
        let mut port = AsciiPort::new(FakeStream::new(&[]));
        assert!(matches!(port.read_reply(), Err(ZaberError::Timeout)));
    }
}
