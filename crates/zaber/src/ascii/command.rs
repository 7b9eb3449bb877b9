/// A single command in Zaber's ASCII protocol.
///
/// `device_address` 0 addresses all devices and `axis_number` 0 addresses the
/// whole device; [`crate::AsciiDevice`] and [`crate::AsciiAxis`] overwrite
/// these fields so a command is always routed to the handle it was sent
/// through. Empty `data` is valid and doubles as a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiCommand {
    pub device_address: u8,
    pub axis_number: u8,
    pub message_id: Option<u8>,
    pub data: String,
}

impl AsciiCommand {
    pub fn new(device_address: u8, axis_number: u8, data: impl Into<String>) -> Self {
        Self {
            device_address,
            axis_number,
            message_id: None,
            data: data.into(),
        }
    }

    pub fn with_message_id(mut self, message_id: u8) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Render the command as a fully framed protocol line.
    pub fn encode(&self) -> String {
        let mut line = format!("/{} {}", self.device_address, self.axis_number);
        if let Some(id) = self.message_id {
            line.push_str(&format!(" {}", id));
        }
        if !self.data.is_empty() {
            line.push(' ');
            line.push_str(&self.data);
        }
        line.push_str("\r\n");
        line
    }
}

impl std::fmt::Display for AsciiCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_move_command() {
        let cmd = AsciiCommand::new(1, 0, "move abs 10000");
        assert_eq!(cmd.encode(), "/1 0 move abs 10000\r\n");
    }

    #[test]
    fn encodes_empty_data_as_status_poll() {
        let cmd = AsciiCommand::new(2, 1, "");
        assert_eq!(cmd.encode(), "/2 1\r\n");
    }

    #[test]
    fn encodes_message_id_between_axis_and_data() {
        let cmd = AsciiCommand::new(1, 1, "get pos").with_message_id(7);
        assert_eq!(cmd.encode(), "/1 1 7 get pos\r\n");
    }
}
