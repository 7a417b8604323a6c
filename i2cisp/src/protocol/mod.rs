//! Protocol implementations.

pub mod chunk;
pub mod crc;
pub mod frame;
pub mod status;

// Re-export common types
pub use chunk::{MAX_CHUNK_SIZE, WriteAddress, decode_chunk, encode_chunk};
pub use crc::crc16;
pub use frame::{Command, encode_command, verify_command};
pub use status::{Status, StatusReply};
