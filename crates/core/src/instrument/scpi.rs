use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::TuneError;

/// Default timeout for SCPI queries. Long sweeps at narrow bandwidth can
/// take tens of seconds before the trace query returns.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Line-oriented SCPI transport, the contract a VISA resource provides.
pub trait ScpiTransport {
    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> Result<(), TuneError>;

    /// Send a query and read its single-line reply.
    fn query(&mut self, command: &str) -> Result<String, TuneError>;
}

/// SCPI over a raw TCP socket (VISA "SOCKET" resources, e.g. port 5025).
pub struct VisaTcpTransport {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl VisaTcpTransport {
    /// Connect to `address` (`host:port`).
    pub fn connect(address: &str) -> Result<Self, TuneError> {
        let stream = TcpStream::connect(address)
            .map_err(|e| TuneError::Instrument(format!("connect {}: {}", address, e)))?;
        stream
            .set_read_timeout(Some(DEFAULT_TIMEOUT))
            .and_then(|_| stream.set_write_timeout(Some(DEFAULT_TIMEOUT)))
            .map_err(|e| TuneError::Instrument(e.to_string()))?;
        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|e| TuneError::Instrument(e.to_string()))?,
        );
        log::info!("connected to VNA at {}", address);
        Ok(Self {
            writer: stream,
            reader,
        })
    }
}

impl ScpiTransport for VisaTcpTransport {
    fn write(&mut self, command: &str) -> Result<(), TuneError> {
        log::debug!("vna > {}", command);
        self.writer
            .write_all(command.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| TuneError::Instrument(format!("write {:?}: {}", command, e)))
    }

    fn query(&mut self, command: &str) -> Result<String, TuneError> {
        self.write(command)?;
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| TuneError::Instrument(format!("query {:?}: {}", command, e)))?;
        if n == 0 {
            return Err(TuneError::Instrument(format!(
                "query {:?}: connection closed",
                command
            )));
        }
        let reply = line.trim_end().to_string();
        log::debug!("vna < {}", truncate_for_log(&reply));
        Ok(reply)
    }
}

fn truncate_for_log(reply: &str) -> &str {
    reply.get(..80).unwrap_or(reply)
}
