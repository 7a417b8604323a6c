//! Error types for i2cisp.

use crate::session::Step;
use std::io;
use thiserror::Error;

/// Result type for i2cisp operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for i2cisp operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (image files, transaction log).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bus adapter failed to complete a read or write.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The bus adapter transferred fewer bytes than requested.
    #[error("Short {op}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Operation that came up short ("write" or "read").
        op: &'static str,
        /// Requested byte count.
        expected: usize,
        /// Transferred byte count.
        actual: usize,
    },

    /// The device rejected the last write.
    #[error("Device NACK (status {})", hex_bytes(status))]
    Nack {
        /// Raw status reply.
        status: [u8; 8],
    },

    /// The device replied with a status frame that matches no known pattern.
    #[error("Unexpected device reply {}", hex_bytes(status))]
    UnexpectedReply {
        /// Raw status reply.
        status: [u8; 8],
    },

    /// The device stayed busy for longer than the configured poll ceiling.
    #[error("Device still busy after {polls} status polls")]
    BusyTimeout {
        /// Number of status reads issued.
        polls: u32,
    },

    /// A command frame failed header, length or checksum validation.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The device write address ran past the last bank.
    #[error("Write address overflow: image does not fit the device address space")]
    AddressOverflow,

    /// A stop was requested.
    #[error("Cancelled by user")]
    Cancelled,

    /// The firmware image cannot be transferred.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A chunk transfer failed.
    #[error("chunk {index} (image offset {offset:#x}): {source}")]
    Chunk {
        /// Zero-based chunk index within the image.
        index: usize,
        /// Byte offset of the chunk within the image.
        offset: u64,
        /// Underlying failure.
        source: Box<Error>,
    },

    /// A flashing step failed.
    #[error("{step} failed: {source}")]
    Step {
        /// Step that was running.
        step: Step,
        /// Underlying failure.
        source: Box<Error>,
    },
}

/// Coarse classification of an [`Error`], independent of where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bus read/write failure or short count.
    Transport,
    /// Explicit rejection by the device.
    Nack,
    /// Unrecognized reply, malformed frame, busy ceiling or address overflow.
    Protocol,
    /// Cooperative stop observed.
    Cancelled,
    /// Unusable firmware image.
    InvalidImage,
    /// Invalid configuration.
    Config,
    /// Host I/O failure.
    Io,
}

impl Error {
    /// Classify this error, looking through chunk and step context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Transport(_) | Self::ShortTransfer { .. } => ErrorKind::Transport,
            Self::Nack { .. } => ErrorKind::Nack,
            Self::UnexpectedReply { .. }
            | Self::BusyTimeout { .. }
            | Self::InvalidFrame(_)
            | Self::AddressOverflow => ErrorKind::Protocol,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidImage(_) => ErrorKind::InvalidImage,
            Self::Config(_) => ErrorKind::Config,
            Self::Chunk { source, .. } | Self::Step { source, .. } => source.kind(),
        }
    }

    /// Innermost error with all location context removed.
    pub fn root(&self) -> &Error {
        match self {
            Self::Chunk { source, .. } | Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Chunk index at which the failure occurred, if it happened mid-transfer.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::Chunk { index, .. } => Some(*index),
            Self::Step { source, .. } => source.chunk_index(),
            _ => None,
        }
    }

    /// Whether this error is a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_context() {
        let err = Error::Step {
            step: Step::FirmwareTransfer,
            source: Box::new(Error::Chunk {
                index: 3,
                offset: 0x3000,
                source: Box::new(Error::Nack { status: [0; 8] }),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Nack);
        assert_eq!(err.chunk_index(), Some(3));
        assert!(matches!(err.root(), Error::Nack { .. }));
    }

    #[test]
    fn test_busy_timeout_is_protocol_error() {
        assert_eq!(Error::BusyTimeout { polls: 10 }.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_message_carries_location() {
        let err = Error::Chunk {
            index: 1,
            offset: 0x1000,
            source: Box::new(Error::UnexpectedReply {
                status: [0x00, 0x12, 0, 0, 0, 0xFF, 0xFF, 0],
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 1"));
        assert!(msg.contains("0x1000"));
        assert!(msg.contains("00 12 00 00 00 FF FF 00"));
    }
}
