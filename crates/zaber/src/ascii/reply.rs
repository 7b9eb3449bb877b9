use crate::ZaberError;

/// Message type of an incoming ASCII frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `@` — a direct reply to a command.
    Reply,
    /// `#` — an informational message.
    Info,
    /// `!` — an asynchronous alert.
    Alert,
}

/// Whether the device accepted the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFlag {
    Ok,
    Rejected,
}

/// Motion state reported in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Busy,
    Idle,
}

/// A parsed reply in Zaber's ASCII protocol.
///
/// Parsing is purely syntactic: a checksum suffix is captured verbatim and
/// `encode(parse(s)) == s` holds for any valid frame with canonical fields.
/// Checksum *verification* is a separate step ([`AsciiReply::checksum_valid`],
/// enforced by [`crate::AsciiPort`] on every line read from the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiReply {
    pub message_type: MessageType,
    pub device_address: u8,
    pub axis_number: u8,
    pub message_id: Option<u8>,
    pub reply_flag: Option<ReplyFlag>,
    pub device_status: Option<DeviceStatus>,
    pub warning_flag: Option<String>,
    pub data: String,
    pub checksum: Option<String>,
}

/// Longitudinal checksum over the payload of a frame (everything after the
/// leading type character, up to but excluding the `:` separator):
/// `((sum & 0xFF) ^ 0xFF) + 1`, rendered as two uppercase hex digits.
pub fn lrc_checksum(payload: &str) -> String {
    let sum: u32 = payload.bytes().map(u32::from).sum();
    format!("{:02X}", ((sum & 0xFF) ^ 0xFF).wrapping_add(1) & 0xFF)
}

impl AsciiReply {
    /// Parse a single reply line. Leading/trailing `\r\n` is ignored.
    pub fn parse(line: &str) -> Result<Self, ZaberError> {
        let mut body = line.trim_end_matches(['\r', '\n']);

        if body.len() < 5 {
            return Err(ZaberError::Malformed(format!(
                "reply too short: {:?}",
                line
            )));
        }

        // Any message type may carry a ":XX" checksum suffix.
        let mut checksum = None;
        let bytes = body.as_bytes();
        if bytes[bytes.len() - 3] == b':' {
            checksum = Some(body[body.len() - 2..].to_string());
            body = &body[..body.len() - 3];
        }

        let message_type = match bytes[0] {
            b'@' => MessageType::Reply,
            b'#' => MessageType::Info,
            b'!' => MessageType::Alert,
            other => {
                return Err(ZaberError::Malformed(format!(
                    "invalid response type: {:?}",
                    other as char
                )))
            }
        };

        let tokens: Vec<&str> = body[1..].split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ZaberError::Malformed(format!("missing header: {:?}", line)));
        }
        let device_address = parse_field(tokens[0], "device address")?;
        let axis_number = parse_field(tokens[1], "axis number")?;
        if device_address > 99 || axis_number > 9 {
            return Err(ZaberError::Malformed(format!(
                "address out of range: {:?}",
                line
            )));
        }

        let mut reply = AsciiReply {
            message_type,
            device_address,
            axis_number,
            message_id: None,
            reply_flag: None,
            device_status: None,
            warning_flag: None,
            data: String::new(),
            checksum,
        };

        match message_type {
            MessageType::Reply => {
                // A message ID is present when a numeric token sits between
                // the axis number and the reply flag.
                let mut rest = &tokens[2..];
                if rest.len() >= 5 && is_numeric(rest[0]) {
                    reply.message_id = Some(parse_field(rest[0], "message id")?);
                    rest = &rest[1..];
                }
                if rest.len() < 4 {
                    return Err(ZaberError::Malformed(format!(
                        "truncated reply: {:?}",
                        line
                    )));
                }
                reply.reply_flag = Some(parse_reply_flag(rest[0])?);
                reply.device_status = Some(parse_device_status(rest[1])?);
                reply.warning_flag = Some(rest[2].to_string());
                reply.data = rest[3..].join(" ");
            }
            MessageType::Info => {
                let mut rest = &tokens[2..];
                if rest.len() >= 2 && is_numeric(rest[0]) {
                    reply.message_id = Some(parse_field(rest[0], "message id")?);
                    rest = &rest[1..];
                }
                reply.data = rest.join(" ");
            }
            MessageType::Alert => {
                let rest = &tokens[2..];
                if rest.len() < 2 {
                    return Err(ZaberError::Malformed(format!(
                        "truncated alert: {:?}",
                        line
                    )));
                }
                reply.device_status = Some(parse_device_status(rest[0])?);
                reply.warning_flag = Some(rest[1].to_string());
                reply.data = rest[2..].join(" ");
            }
        }

        Ok(reply)
    }

    /// Render the reply back into the protocol line that produced it.
    pub fn encode(&self) -> String {
        let mut line = match self.message_type {
            MessageType::Reply => {
                let mut s = format!("@{:02} {}", self.device_address, self.axis_number);
                if let Some(id) = self.message_id {
                    s.push_str(&format!(" {:02}", id));
                }
                s.push_str(&format!(
                    " {} {} {} {}",
                    flag_str(self.reply_flag),
                    status_str(self.device_status),
                    self.warning_flag.as_deref().unwrap_or("--"),
                    self.data
                ));
                s
            }
            MessageType::Info => {
                let mut s = format!("#{:02} {}", self.device_address, self.axis_number);
                if let Some(id) = self.message_id {
                    s.push_str(&format!(" {:02}", id));
                }
                s.push(' ');
                s.push_str(&self.data);
                s
            }
            MessageType::Alert => {
                let mut s = format!(
                    "!{:02} {} {} {}",
                    self.device_address,
                    self.axis_number,
                    status_str(self.device_status),
                    self.warning_flag.as_deref().unwrap_or("--")
                );
                if !self.data.is_empty() {
                    s.push(' ');
                    s.push_str(&self.data);
                }
                s
            }
        };

        if let Some(checksum) = &self.checksum {
            line.push(':');
            line.push_str(checksum);
        }
        line.push_str("\r\n");
        line
    }

    /// Check the captured checksum against the frame contents.
    ///
    /// Returns `None` when the reply carried no checksum. The expected value
    /// is recomputed from the canonical encoding, which matches the wire
    /// bytes for frames emitted by device firmware.
    pub fn checksum_valid(&self) -> Option<bool> {
        let found = self.checksum.as_deref()?;
        let encoded = self.encode();
        let payload_end = encoded.len() - (found.len() + 3); // ":XX\r\n"
        let expected = lrc_checksum(&encoded[1..payload_end]);
        Some(expected == found)
    }
}

impl std::fmt::Display for AsciiReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode().trim_end())
    }
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn parse_field(token: &str, what: &str) -> Result<u8, ZaberError> {
    token
        .parse()
        .map_err(|_| ZaberError::Malformed(format!("invalid {}: {:?}", what, token)))
}

fn parse_reply_flag(token: &str) -> Result<ReplyFlag, ZaberError> {
    match token {
        "OK" => Ok(ReplyFlag::Ok),
        "RJ" => Ok(ReplyFlag::Rejected),
        other => Err(ZaberError::Malformed(format!(
            "invalid reply flag: {:?}",
            other
        ))),
    }
}

fn parse_device_status(token: &str) -> Result<DeviceStatus, ZaberError> {
    match token {
        "BUSY" => Ok(DeviceStatus::Busy),
        "IDLE" => Ok(DeviceStatus::Idle),
        other => Err(ZaberError::Malformed(format!(
            "invalid device status: {:?}",
            other
        ))),
    }
}

fn flag_str(flag: Option<ReplyFlag>) -> &'static str {
    match flag {
        Some(ReplyFlag::Ok) => "OK",
        Some(ReplyFlag::Rejected) => "RJ",
        None => "--",
    }
}

fn status_str(status: Option<DeviceStatus>) -> &'static str {
    match status {
        Some(DeviceStatus::Busy) => "BUSY",
        Some(DeviceStatus::Idle) => "IDLE",
        None => "--",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reply_with_message_id_and_checksum() {
        let reply = AsciiReply::parse("@01 1 02 OK IDLE -- 12345:A5\r\n").unwrap();
        assert_eq!(reply.message_type, MessageType::Reply);
        assert_eq!(reply.device_address, 1);
        assert_eq!(reply.axis_number, 1);
        assert_eq!(reply.message_id, Some(2));
        assert_eq!(reply.reply_flag, Some(ReplyFlag::Ok));
        assert_eq!(reply.device_status, Some(DeviceStatus::Idle));
        assert_eq!(reply.warning_flag.as_deref(), Some("--"));
        assert_eq!(reply.data, "12345");
        assert_eq!(reply.checksum.as_deref(), Some("A5"));
    }

    #[test]
    fn round_trips_canonical_frames() {
        for line in [
            "@01 1 02 OK IDLE -- 12345:A5\r\n",
            "@01 0 OK BUSY WR 0\r\n",
            "@99 9 255 RJ IDLE -- BADCOMMAND\r\n",
            "#01 0 some info text\r\n",
            "#02 1 05 107520\r\n",
            "!03 2 IDLE FD\r\n",
        ] {
            let reply = AsciiReply::parse(line).unwrap();
            assert_eq!(reply.encode(), line, "round trip failed for {:?}", line);
        }
    }

    #[test]
    fn reply_without_message_id() {
        let reply = AsciiReply::parse("@01 0 OK IDLE -- 20000\r\n").unwrap();
        assert_eq!(reply.message_id, None);
        assert_eq!(reply.data, "20000");
    }

    #[test]
    fn lrc_matches_reference_vector() {
        // Computed with the LRC definition over the payload of
        // "@01 1 02 OK IDLE -- 12345".
        assert_eq!(lrc_checksum("01 1 02 OK IDLE -- 12345"), "3B");
    }

    #[test]
    fn checksum_verification_flags_corruption() {
        let good = AsciiReply::parse("@01 1 02 OK IDLE -- 12345:3B\r\n").unwrap();
        assert_eq!(good.checksum_valid(), Some(true));

        let bad = AsciiReply::parse("@01 1 02 OK IDLE -- 12345:A5\r\n").unwrap();
        assert_eq!(bad.checksum_valid(), Some(false));

        let none = AsciiReply::parse("@01 1 02 OK IDLE -- 12345\r\n").unwrap();
        assert_eq!(none.checksum_valid(), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(AsciiReply::parse("$01 0 OK IDLE -- 0\r\n").is_err());
        assert!(AsciiReply::parse("@01\r\n").is_err());
        assert!(AsciiReply::parse("@01 0 NO IDLE -- 0\r\n").is_err());
    }

    #[test]
    fn data_may_contain_spaces() {
        let reply = AsciiReply::parse("@01 0 OK IDLE -- 12 34 56\r\n").unwrap();
        assert_eq!(reply.data, "12 34 56");
        assert_eq!(reply.encode(), "@01 0 OK IDLE -- 12 34 56\r\n");
    }
}
