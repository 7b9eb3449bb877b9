/// A parsed reply in Zaber's Binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryReply {
    pub device_number: u8,
    pub command_number: u8,
    pub data: i32,
    pub message_id: Option<u8>,
}

impl BinaryReply {
    /// Decode a six-byte frame.
    ///
    /// A message ID truncates the data word to 24 bits, and nothing in the
    /// frame itself says whether one is present — the caller must know the
    /// device's message-ID mode. With `message_id = true` the top byte is
    /// extracted as the ID and the remaining 24 bits are sign-extended.
    pub fn decode(frame: [u8; 6], message_id: bool) -> Self {
        let device_number = frame[0];
        let command_number = frame[1];
        let raw = i32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);

        if message_id {
            let id = (raw as u32 >> 24) as u8;
            // Sign-extend the low 24 bits.
            let data = (raw << 8) >> 8;
            Self {
                device_number,
                command_number,
                data,
                message_id: Some(id),
            }
        } else {
            Self {
                device_number,
                command_number,
                data: raw,
                message_id: None,
            }
        }
    }

    /// Re-encode the frame as it would appear on the wire.
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

impl std::fmt::Display for BinaryReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}]",
            self.device_number, self.command_number, self.data
        )
    }
}
