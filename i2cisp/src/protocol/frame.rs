//! Command frames of the ISP-over-I2C protocol.
//!
//! ## Frame Format
//!
//! ```text
//! +--------+---------------+----------------+-----------+----------+
//! | Opcode |    Length     |     Prefix     |  Payload  | Checksum |
//! +--------+---------------+----------------+-----------+----------+
//! | 1 byte |    1 byte     |    3 bytes     | variable  |  1 byte  |
//! +--------+---------------+----------------+-----------+----------+
//! |  0x51  | 0x80 | len+3  | 0xC2 0x00 0x00 |  command  | XOR^0xE6 |
//! +--------+---------------+----------------+-----------+----------+
//! ```
//!
//! The checksum is the XOR of every preceding byte, XORed with 0xE6.

use crate::error::{Error, Result};

/// First byte of every command frame.
pub const FRAME_OPCODE: u8 = 0x51;

/// Bit set in the length byte.
pub const LENGTH_FLAG: u8 = 0x80;

/// Fixed bytes between the length byte and the payload.
pub const FRAME_PREFIX: [u8; 3] = [0xC2, 0x00, 0x00];

/// Constant folded into the checksum.
pub const CHECKSUM_XOR: u8 = 0xE6;

/// Opcode, length and prefix.
pub const HEADER_LEN: usize = 2 + FRAME_PREFIX.len();

/// Largest payload whose length still fits the 7-bit length field.
pub const MAX_PAYLOAD_LEN: usize = 0x7F - FRAME_PREFIX.len();

/// Commands understood by the device's ISP monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Turn on the debug channel.
    DebugOn,
    /// Request to enter force-IROM (low-level programming) mode.
    EnterIromMode,
    /// Request to enter the ISP driver write state.
    EnterDriverWriteState,
    /// Request to run the downloaded ISP driver.
    RunDriver,
    /// Erase the inactive flash bank.
    EraseInactiveBank,
    /// Hard reset the device.
    HardReset,
    /// Announce the next fast-flash-write chunk. Not acknowledged.
    FastFlashWrite,
}

impl Command {
    /// Every command, in protocol order.
    pub const ALL: [Command; 7] = [
        Self::DebugOn,
        Self::EnterIromMode,
        Self::EnterDriverWriteState,
        Self::RunDriver,
        Self::EraseInactiveBank,
        Self::HardReset,
        Self::FastFlashWrite,
    ];

    /// Payload bytes carried by this command.
    pub fn payload(self) -> &'static [u8] {
        match self {
            Self::DebugOn => &[0x02, 0x09],
            Self::EnterIromMode => &[0x07, 0x07, 0x50, 0x00, 0x00, 0x10],
            Self::EnterDriverWriteState => &[0x07, 0x07, 0x50, 0x00, 0x00, 0x11],
            Self::RunDriver => &[0x07, 0x07, 0x50, 0x00, 0x00, 0x12],
            Self::EraseInactiveBank => &[0x07, 0x07, 0x50, 0x00, 0x00, 0x20],
            Self::HardReset => &[0x07, 0x07, 0x50, 0x00, 0x01, 0x10],
            Self::FastFlashWrite => &[0x03, 0x10],
        }
    }

    /// Whether the device answers this command with a status reply.
    pub fn expects_ack(self) -> bool {
        !matches!(self, Self::FastFlashWrite)
    }

    /// Build the complete frame for this command.
    pub fn frame(self) -> Vec<u8> {
        encode_command(self.payload())
    }

    /// Look a command up by its payload.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.payload() == payload)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DebugOn => "debug on",
            Self::EnterIromMode => "enter force-IROM mode",
            Self::EnterDriverWriteState => "enter ISP driver write state",
            Self::RunDriver => "run ISP driver",
            Self::EraseInactiveBank => "erase inactive bank",
            Self::HardReset => "hard reset",
            Self::FastFlashWrite => "fast flash write",
        };
        f.write_str(name)
    }
}

/// XOR checksum over `bytes`, folded with [`CHECKSUM_XOR`].
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b) ^ CHECKSUM_XOR
}

/// Wrap a command payload into a checksummed frame.
///
/// Payloads longer than [`MAX_PAYLOAD_LEN`] do not fit the length field.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_command(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    frame.push(FRAME_OPCODE);
    // Safe cast: payload length is bounded by MAX_PAYLOAD_LEN
    frame.push(LENGTH_FLAG | (payload.len() + FRAME_PREFIX.len()) as u8);
    frame.extend_from_slice(&FRAME_PREFIX);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}

/// Check a frame's header, length field and checksum, returning its payload.
pub fn verify_command(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < HEADER_LEN + 1 {
        return Err(Error::InvalidFrame(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0] != FRAME_OPCODE {
        return Err(Error::InvalidFrame(format!("bad opcode 0x{:02X}", frame[0])));
    }
    if frame[1] & LENGTH_FLAG == 0 {
        return Err(Error::InvalidFrame(format!("bad length byte 0x{:02X}", frame[1])));
    }
    if frame[2..HEADER_LEN] != FRAME_PREFIX {
        return Err(Error::InvalidFrame("bad frame prefix".into()));
    }

    let (body, tail) = frame.split_at(frame.len() - 1);
    let payload = &body[HEADER_LEN..];
    let declared = usize::from(frame[1] & !LENGTH_FLAG);
    if declared != payload.len() + FRAME_PREFIX.len() {
        return Err(Error::InvalidFrame(format!(
            "length field {declared} does not match payload of {} bytes",
            payload.len()
        )));
    }

    let expected = checksum(body);
    if tail[0] != expected {
        return Err(Error::InvalidFrame(format!(
            "checksum mismatch: expected 0x{expected:02X}, got 0x{:02X}",
            tail[0]
        )));
    }

    Ok(payload)
}
