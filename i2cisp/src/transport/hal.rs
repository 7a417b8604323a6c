//! Adapter from `embedded-hal` blocking I2C to [`Transport`].

use crate::error::{Error, Result};
use crate::transport::Transport;
use embedded_hal::blocking::i2c;
use log::trace;
use std::fmt;

/// Any `embedded-hal` 0.2 blocking I2C master used as a [`Transport`].
pub struct HalTransport<I> {
    i2c: I,
    name: String,
}

impl<I> HalTransport<I> {
    /// Wrap an I2C master.
    pub fn new(i2c: I, name: impl Into<String>) -> Self {
        Self {
            i2c,
            name: name.into(),
        }
    }

    /// Consume the adapter and return the bus.
    pub fn into_inner(self) -> I {
        self.i2c
    }
}

impl<I, E> Transport for HalTransport<I>
where
    I: i2c::Write<Error = E> + i2c::Read<Error = E>,
    E: fmt::Debug,
{
    fn write(&mut self, slave: u8, data: &[u8]) -> Result<usize> {
        trace!("i2c write 0x{slave:02X}: {} bytes", data.len());
        self.i2c
            .write(slave, data)
            .map_err(|e| Error::Transport(format!("{}: write failed: {e:?}", self.name)))?;
        Ok(data.len())
    }

    fn read(&mut self, slave: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.i2c
            .read(slave, &mut buf)
            .map_err(|e| Error::Transport(format!("{}: read failed: {e:?}", self.name)))?;
        trace!("i2c read 0x{slave:02X}: {buf:02X?}");
        Ok(buf)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const SLAVE: u8 = 0x73;

    #[test]
    fn test_write_then_read_status() {
        let frame = Command::RunDriver.frame();
        let ack = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x0C, 0x00];
        let expectations = [
            I2cTransaction::write(SLAVE, frame.clone()),
            I2cTransaction::read(SLAVE, ack.clone()),
        ];
        let mut bus = HalTransport::new(I2cMock::new(&expectations), "mock");

        assert_eq!(bus.write(SLAVE, &frame).unwrap(), frame.len());
        assert_eq!(bus.read_exact(SLAVE, 8).unwrap(), ack);

        bus.into_inner().done();
    }

    struct DeadBus;

    impl i2c::Write for DeadBus {
        type Error = &'static str;

        fn write(&mut self, _address: u8, _bytes: &[u8]) -> std::result::Result<(), Self::Error> {
            Err("arbitration lost")
        }
    }

    impl i2c::Read for DeadBus {
        type Error = &'static str;

        fn read(&mut self, _address: u8, _buffer: &mut [u8]) -> std::result::Result<(), Self::Error> {
            Err("no ack")
        }
    }

    #[test]
    fn test_bus_error_maps_to_transport_error() {
        let mut bus = HalTransport::new(DeadBus, "i2c-dead");

        let err = bus.write(SLAVE, &Command::HardReset.frame()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
        assert!(err.to_string().contains("i2c-dead"));
        assert!(err.to_string().contains("arbitration lost"));

        assert!(bus.read(SLAVE, 8).is_err());
    }
}
