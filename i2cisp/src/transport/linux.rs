//! Linux `i2c-dev` bus access.

use crate::error::{Error, Result};
use crate::transport::HalTransport;
use linux_embedded_hal::I2cdev;
use log::debug;

/// Open a `/dev/i2c-N` character device as a transport.
pub fn open_i2c_dev(path: &str) -> Result<HalTransport<I2cdev>> {
    let dev = I2cdev::new(path).map_err(|e| Error::Transport(format!("{path}: {e}")))?;
    debug!("Opened I2C bus {path}");
    Ok(HalTransport::new(dev, path))
}
