//! # i2cisp
//!
//! A library for programming display controllers over their ISP-over-I2C port.
//!
//! This crate provides the protocol side of the flashing process:
//!
//! - Command frame encoding and verification (XOR checksum)
//! - Fast-flash-write chunk encoding with CRC16
//! - Chunk sequencing with the device's bank/page/offset write address
//! - Busy/ACK/NACK status polling
//! - The complete seven-step programming sequence with abort recovery
//!
//! The bus itself is reached through the [`Transport`] trait. Any `embedded-hal`
//! blocking I2C master can be used through [`HalTransport`], and on Linux
//! [`open_i2c_dev`] opens a `/dev/i2c-N` device directly.
//!
//! ## Features
//!
//! - `native` (default): Linux `i2c-dev` support via `linux-embedded-hal`
//! - `serde`: Serialization support for reports and chunk plans
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "native", target_os = "linux"))]
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     use i2cisp::{FlashSession, ImageSource, open_i2c_dev};
//!
//!     let bus = open_i2c_dev("/dev/i2c-1")?;
//!     let mut session = FlashSession::new(bus, 0x73);
//!
//!     let mut driver = ImageSource::open("isp_driver.bin")?;
//!     let mut firmware = ImageSource::open("firmware.bin")?;
//!     session.flash(&mut driver, &mut firmware, |p| {
//!         println!("{}: {} bytes", p.label, p.bytes_done);
//!     })?;
//!
//!     Ok(())
//! }
//! # #[cfg(not(all(feature = "native", target_os = "linux")))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod image;
pub mod poller;
pub mod protocol;
pub mod sequencer;
pub mod session;
pub mod transport;

// Re-exports for convenience
#[cfg(all(feature = "native", target_os = "linux"))]
pub use transport::open_i2c_dev;
pub use {
    error::{Error, ErrorKind, Result},
    image::{ChunkReader, ImageSource, PlannedChunk, plan_chunks},
    poller::AckPoller,
    protocol::{Command, Status, StatusReply, WriteAddress, crc16, encode_chunk, encode_command},
    sequencer::{ChunkSequencer, TransferProgress, TransferSummary},
    session::{DEFAULT_SLAVE, FlashReport, FlashSession, SessionConfig, Step, StopFlag},
    transport::{HalTransport, RecordingTransport, SimulatedTarget, Transport},
};
