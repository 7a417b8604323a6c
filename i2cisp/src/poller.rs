//! Acknowledgement polling.
//!
//! After every acknowledged write the device answers status reads with an
//! 8-byte reply. The poller keeps reading while the device reports busy and
//! turns everything else into success or a terminal error.

use crate::error::{Error, Result};
use crate::protocol::status::STATUS_LEN;
use crate::protocol::{Status, StatusReply};
use crate::transport::Transport;
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// Default pause between status reads while the device is busy.
pub const DEFAULT_BUSY_DELAY: Duration = Duration::from_millis(500);

/// Default number of busy replies tolerated before giving up.
pub const DEFAULT_MAX_BUSY_POLLS: u32 = 10_000;

/// Busy/ack/nack polling state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPoller {
    busy_delay: Duration,
    max_busy_polls: u32,
}

impl Default for AckPoller {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_DELAY, DEFAULT_MAX_BUSY_POLLS)
    }
}

impl AckPoller {
    /// Create a poller.
    pub const fn new(busy_delay: Duration, max_busy_polls: u32) -> Self {
        Self {
            busy_delay,
            max_busy_polls,
        }
    }

    /// Pause between busy replies.
    pub fn busy_delay(&self) -> Duration {
        self.busy_delay
    }

    /// Busy replies tolerated before [`Error::BusyTimeout`].
    pub fn max_busy_polls(&self) -> u32 {
        self.max_busy_polls
    }

    /// Wait for the device to acknowledge the last write.
    ///
    /// Returns the number of status reads issued. NACK and unrecognized replies
    /// are terminal and are not followed by another read.
    pub fn poll<T: Transport + ?Sized>(&self, transport: &mut T, slave: u8) -> Result<u32> {
        let mut busy = 0u32;
        loop {
            let raw = transport.read_exact(slave, STATUS_LEN)?;
            let reply = StatusReply::from_slice(&raw)?;
            trace!("status {:02X?}", reply.bytes());

            match reply.status() {
                Status::Ack => {
                    if busy > 0 {
                        debug!("ACK after {busy} busy replies");
                    }
                    return Ok(busy + 1);
                },
                Status::Nack => return Err(Error::Nack { status: reply.0 }),
                Status::Unknown => return Err(Error::UnexpectedReply { status: reply.0 }),
                Status::Busy => {
                    busy += 1;
                    if busy >= self.max_busy_polls {
                        return Err(Error::BusyTimeout { polls: busy });
                    }
                    if !self.busy_delay.is_zero() {
                        thread::sleep(self.busy_delay);
                    }
                },
            }
        }
    }
}
