//! Transport abstraction for the I2C bus.
//!
//! The protocol layer only needs two blocking primitives: write a buffer to a
//! slave address and read a fixed number of bytes back. The [`Transport`] trait
//! captures exactly that, so the session can run over any bus adapter:
//!
//! ```text
//! +------------------------------------------+
//! |  FlashSession / ChunkSequencer / Poller  |
//! +--------------------+---------------------+
//!                      |
//!                      v
//! +--------------------+---------------------+
//! |             Transport trait              |
//! +------+-------------+-------------+-------+
//!        |             |             |
//!        v             v             v
//! +------+------+ +-----+------+ +----+--------+
//! | HalTransport | | Simulated  | | Recording   |
//! | (e-hal I2C)  | |  Target    | | (wrapper)   |
//! +--------------+ +------------+ +-------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use i2cisp::transport::Transport;
//!
//! fn example<T: Transport>(bus: &mut T) -> i2cisp::Result<()> {
//!     bus.write_all(0x73, &[0x51, 0x85, 0xC2, 0x00, 0x00, 0x03, 0x10, 0xE3])?;
//!     let status = bus.read_exact(0x73, 8)?;
//!     println!("status: {status:02X?}");
//!     Ok(())
//! }
//! ```

pub mod hal;
#[cfg(all(feature = "native", target_os = "linux"))]
pub mod linux;
pub mod record;
pub mod sim;

use crate::error::{Error, Result};

/// Blocking byte transport to an I2C slave.
pub trait Transport {
    /// Write `data` to `slave`, returning the number of bytes the bus accepted.
    fn write(&mut self, slave: u8, data: &[u8]) -> Result<usize>;

    /// Read up to `len` bytes from `slave`.
    fn read(&mut self, slave: u8, len: usize) -> Result<Vec<u8>>;

    /// Human readable name of the bus (e.g. "/dev/i2c-1").
    fn name(&self) -> &str;

    /// Write all of `data`, treating a short count as a transport failure.
    fn write_all(&mut self, slave: u8, data: &[u8]) -> Result<()> {
        let written = self.write(slave, data)?;
        if written != data.len() {
            return Err(Error::ShortTransfer {
                op: "write",
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }

    /// Read exactly `len` bytes, treating a short count as a transport failure.
    fn read_exact(&mut self, slave: u8, len: usize) -> Result<Vec<u8>> {
        let data = self.read(slave, len)?;
        if data.len() != len {
            return Err(Error::ShortTransfer {
                op: "read",
                expected: len,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, slave: u8, data: &[u8]) -> Result<usize> {
        (**self).write(slave, data)
    }

    fn read(&mut self, slave: u8, len: usize) -> Result<Vec<u8>> {
        (**self).read(slave, len)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, slave: u8, data: &[u8]) -> Result<usize> {
        (**self).write(slave, data)
    }

    fn read(&mut self, slave: u8, len: usize) -> Result<Vec<u8>> {
        (**self).read(slave, len)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// Re-export the implementations
pub use hal::HalTransport;
#[cfg(all(feature = "native", target_os = "linux"))]
pub use linux::open_i2c_dev;
pub use record::RecordingTransport;
pub use sim::SimulatedTarget;
