/// A single command in Zaber's Binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryCommand {
    /// Target device number. 0 broadcasts to all devices.
    pub device_number: u8,
    /// Command number from the Binary protocol reference.
    pub command_number: u8,
    /// Data value transmitted with the command.
    pub data: i32,
    /// Optional message ID; when set it replaces the top data byte.
    pub message_id: Option<u8>,
}

impl BinaryCommand {
    pub fn new(device_number: u8, command_number: u8, data: i32) -> Self {
        Self {
            device_number,
            command_number,
            data,
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: u8) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Encode the six-byte frame.
    pub fn encode(&self) -> [u8; 6] {
        let mut frame = [0u8; 6];
        frame[0] = self.device_number;
        frame[1] = self.command_number;
        frame[2..6].copy_from_slice(&self.data.to_le_bytes());
        if let Some(id) = self.message_id {
            frame[5] = id;
        }
        frame
    }
}

impl std::fmt::Display for BinaryCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}]",
            self.device_number, self.command_number, self.data
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_little_endian_data() {
        let frame = BinaryCommand::new(1, 55, 1000).encode();
        assert_eq!(frame, [1, 55, 0xE8, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn encodes_negative_data() {
        let frame = BinaryCommand::new(1, 21, -1).encode();
        assert_eq!(frame, [1, 21, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn message_id_replaces_top_data_byte() {
        let frame = BinaryCommand::new(1, 55, 1000).with_message_id(0xAB).encode();
        assert_eq!(frame, [1, 55, 0xE8, 0x03, 0x00, 0xAB]);
    }
}
