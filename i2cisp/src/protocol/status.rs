//! Device status replies.
//!
//! After every acknowledged write the device is polled with 8-byte reads. Only
//! byte 1 and the pair at bytes 5..7 carry protocol signals; the rest is device
//! internal and ignored here.

use crate::error::{Error, Result};

/// Size of a status reply.
pub const STATUS_LEN: usize = 8;

/// Byte 1 while the device is still processing.
pub const BUSY_MARKER: u8 = 0x80;

/// Bytes 5..7 of a positive acknowledgement.
pub const ACK_CODE: [u8; 2] = [0x03, 0x0C];

/// Bytes 5..7 of a negative acknowledgement.
pub const NACK_CODE: [u8; 2] = [0x03, 0x0B];

/// Classification of one status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Write accepted.
    Ack,
    /// Write rejected.
    Nack,
    /// Still working, read again.
    Busy,
    /// Not a reply this protocol knows.
    Unknown,
}

/// One raw status reply from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReply(pub [u8; STATUS_LEN]);

impl StatusReply {
    /// Wrap a raw read, which must be exactly [`STATUS_LEN`] bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let bytes: [u8; STATUS_LEN] = data.try_into().map_err(|_| Error::ShortTransfer {
            op: "read",
            expected: STATUS_LEN,
            actual: data.len(),
        })?;
        Ok(Self(bytes))
    }

    /// A reply carrying the ACK code.
    pub const fn ack() -> Self {
        Self([0x00, 0x00, 0x00, 0x00, 0x00, ACK_CODE[0], ACK_CODE[1], 0x00])
    }

    /// A reply carrying the NACK code.
    pub const fn nack() -> Self {
        Self([0x00, 0x00, 0x00, 0x00, 0x00, NACK_CODE[0], NACK_CODE[1], 0x00])
    }

    /// A reply with the busy marker set.
    pub const fn busy() -> Self {
        Self([0x00, BUSY_MARKER, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
    }

    /// Classify the reply.
    ///
    /// The NACK code wins over ACK, and both win over the busy marker.
    pub fn status(&self) -> Status {
        let code = [self.0[5], self.0[6]];
        if code == NACK_CODE {
            Status::Nack
        } else if code == ACK_CODE {
            Status::Ack
        } else if self.0[1] == BUSY_MARKER {
            Status::Busy
        } else {
            Status::Unknown
        }
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &[u8; STATUS_LEN] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_constructors() {
        assert_eq!(StatusReply::ack().status(), Status::Ack);
        assert_eq!(StatusReply::nack().status(), Status::Nack);
        assert_eq!(StatusReply::busy().status(), Status::Busy);
        assert_eq!(StatusReply([0; 8]).status(), Status::Unknown);
    }

    #[test]
    fn test_other_bytes_are_ignored() {
        let reply = StatusReply([0x6E, 0x12, 0xAB, 0xCD, 0xEF, 0x03, 0x0C, 0x99]);
        assert_eq!(reply.status(), Status::Ack);
    }

    #[test]
    fn test_code_takes_priority_over_busy() {
        let reply = StatusReply([0x00, 0x80, 0x00, 0x00, 0x00, 0x03, 0x0B, 0x00]);
        assert_eq!(reply.status(), Status::Nack);
        let reply = StatusReply([0x00, 0x80, 0x00, 0x00, 0x00, 0x03, 0x0C, 0x00]);
        assert_eq!(reply.status(), Status::Ack);
    }

    #[test]
    fn test_from_slice_length() {
        assert!(StatusReply::from_slice(&[0; 8]).is_ok());
        assert!(matches!(
            StatusReply::from_slice(&[0; 5]),
            Err(Error::ShortTransfer { actual: 5, .. })
        ));
    }
}
