//! Flash session: the complete programming sequence.
//!
//! A [`FlashSession`] owns the transport, the slave address, the timing
//! configuration and a [`StopFlag`]. It drives the device from its normal state
//! through force-IROM mode, the ISP driver download, bank erase and the
//! firmware download, and finally hard resets it.
//!
//! ## Example
//!
//! ```rust
//! use i2cisp::{FlashSession, ImageSource, SessionConfig, SimulatedTarget};
//!
//! let driver = vec![0xAA; 300];
//! let firmware = vec![0x55; 9000];
//!
//! let mut session = FlashSession::new(SimulatedTarget::new(), 0x73)
//!     .with_config(SessionConfig::without_delays());
//! let report = session.flash(
//!     &mut ImageSource::from_bytes("driver.bin", &driver),
//!     &mut ImageSource::from_bytes("firmware.bin", &firmware),
//!     |p| println!("{}: {}/{:?}", p.label, p.chunks_done, p.total_chunks),
//! )?;
//! assert_eq!(report.firmware.chunks, 3);
//! # Ok::<(), i2cisp::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::image::ImageSource;
use crate::poller::{AckPoller, DEFAULT_BUSY_DELAY, DEFAULT_MAX_BUSY_POLLS};
use crate::protocol::{Command, MAX_CHUNK_SIZE};
use crate::sequencer::{
    ChunkSequencer, DEFAULT_CHUNK_DELAY, TransferProgress, TransferSummary,
};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Default I2C slave address of the device's ISP monitor.
pub const DEFAULT_SLAVE: u8 = 0x73;

/// One stage of the programming sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Step {
    /// Debug channel enable.
    DebugOn,
    /// Switch into force-IROM mode.
    EnterIromMode,
    /// Switch into the ISP driver write state.
    EnterDriverWriteState,
    /// Download of the ISP driver image.
    DriverTransfer,
    /// Start of the ISP driver.
    RunDriver,
    /// Erase of the inactive bank.
    EraseInactiveBank,
    /// Download of the firmware image.
    FirmwareTransfer,
    /// Final hard reset.
    HardReset,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DebugOn => "debug on",
            Self::EnterIromMode => "enter force-IROM mode",
            Self::EnterDriverWriteState => "enter ISP driver write state",
            Self::DriverTransfer => "ISP driver transfer",
            Self::RunDriver => "run ISP driver",
            Self::EraseInactiveBank => "erase inactive bank",
            Self::FirmwareTransfer => "firmware transfer",
            Self::HardReset => "hard reset",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation flag shared between the session and other threads.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// A flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. The session notices before the next chunk or step.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the session can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Timing, retry and behaviour settings of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between priming frame and chunk frame.
    pub chunk_delay: Duration,
    /// Pause between status reads while the device is busy.
    pub busy_delay: Duration,
    /// Busy replies tolerated per write.
    pub max_busy_polls: u32,
    /// Pause after entering force-IROM mode.
    pub after_mode_delay: Duration,
    /// Pause after entering the driver write state.
    pub after_state_delay: Duration,
    /// Pause after starting the driver.
    pub after_run_delay: Duration,
    /// Pause after erasing the inactive bank.
    pub after_erase_delay: Duration,
    /// Pause between the firmware download and the hard reset.
    pub before_reset_delay: Duration,
    /// Chunk size in bytes (`1..=4096`).
    pub chunk_size: usize,
    /// Hard reset the device when a sequence is aborted.
    pub reset_on_abort: bool,
    /// Send the debug-on command before entering force-IROM mode.
    pub debug_on: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_delay: DEFAULT_CHUNK_DELAY,
            busy_delay: DEFAULT_BUSY_DELAY,
            max_busy_polls: DEFAULT_MAX_BUSY_POLLS,
            after_mode_delay: Duration::from_millis(200),
            after_state_delay: Duration::from_millis(100),
            after_run_delay: Duration::from_millis(100),
            after_erase_delay: Duration::from_millis(500),
            before_reset_delay: Duration::from_secs(3),
            chunk_size: MAX_CHUNK_SIZE,
            reset_on_abort: true,
            debug_on: false,
        }
    }
}

impl SessionConfig {
    /// Default settings with every pause set to zero (dry runs, tests).
    pub fn without_delays() -> Self {
        Self {
            chunk_delay: Duration::ZERO,
            busy_delay: Duration::ZERO,
            after_mode_delay: Duration::ZERO,
            after_state_delay: Duration::ZERO,
            after_run_delay: Duration::ZERO,
            after_erase_delay: Duration::ZERO,
            before_reset_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        crate::image::check_chunk_size(self.chunk_size)?;
        if self.max_busy_polls == 0 {
            return Err(Error::Config("max_busy_polls must be at least 1".into()));
        }
        Ok(())
    }

    fn sequencer(&self, slave: u8) -> ChunkSequencer {
        ChunkSequencer::new(slave)
            .with_chunk_size(self.chunk_size)
            .with_chunk_delay(self.chunk_delay)
            .with_poller(self.poller())
    }

    fn poller(&self) -> AckPoller {
        AckPoller::new(self.busy_delay, self.max_busy_polls)
    }
}

/// Result of a complete programming sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlashReport {
    /// ISP driver download.
    pub driver: TransferSummary,
    /// Firmware download.
    pub firmware: TransferSummary,
    /// Wall time of the whole sequence.
    pub elapsed: Duration,
}

/// An ISP programming session with one device.
pub struct FlashSession<T: Transport> {
    transport: T,
    slave: u8,
    config: SessionConfig,
    stop: StopFlag,
}

impl<T: Transport> FlashSession<T> {
    /// Create a session with default settings.
    pub fn new(transport: T, slave: u8) -> Self {
        Self {
            transport,
            slave,
            config: SessionConfig::default(),
            stop: StopFlag::new(),
        }
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing stop flag, e.g. one wired to a Ctrl-C handler.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// A handle to this session's stop flag.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Current settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Slave address.
    pub fn slave(&self) -> u8 {
        self.slave
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the session and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send one command frame, waiting for the ACK when the command has one.
    pub fn send_command(&mut self, command: Command) -> Result<()> {
        debug!("Sending {command}");
        self.transport.write_all(self.slave, &command.frame())?;
        if command.expects_ack() {
            self.config.poller().poll(&mut self.transport, self.slave)?;
        }
        Ok(())
    }

    /// Turn on the debug channel.
    pub fn debug_on(&mut self) -> Result<()> {
        self.step(Step::DebugOn, |s| s.send_command(Command::DebugOn))
    }

    /// Enter force-IROM mode and let the device settle.
    pub fn enter_irom_mode(&mut self) -> Result<()> {
        let delay = self.config.after_mode_delay;
        self.step(Step::EnterIromMode, |s| {
            s.send_command(Command::EnterIromMode)?;
            pause(delay);
            Ok(())
        })
    }

    /// Enter the ISP driver write state.
    pub fn enter_driver_write_state(&mut self) -> Result<()> {
        let delay = self.config.after_state_delay;
        self.step(Step::EnterDriverWriteState, |s| {
            s.send_command(Command::EnterDriverWriteState)?;
            pause(delay);
            Ok(())
        })
    }

    /// Start the downloaded ISP driver.
    pub fn run_driver(&mut self) -> Result<()> {
        let delay = self.config.after_run_delay;
        self.step(Step::RunDriver, |s| {
            s.send_command(Command::RunDriver)?;
            pause(delay);
            Ok(())
        })
    }

    /// Erase the inactive flash bank.
    pub fn erase_inactive_bank(&mut self) -> Result<()> {
        let delay = self.config.after_erase_delay;
        self.step(Step::EraseInactiveBank, |s| {
            s.send_command(Command::EraseInactiveBank)?;
            pause(delay);
            Ok(())
        })
    }

    /// Hard reset the device.
    pub fn hard_reset(&mut self) -> Result<()> {
        info!("Hard reset");
        self.send_command(Command::HardReset)
            .map_err(|e| step_error(Step::HardReset, e))
    }

    /// Write one image with the fast-flash-write protocol.
    pub fn write_image<R, F>(
        &mut self,
        image: &mut ImageSource<R>,
        progress: F,
    ) -> Result<TransferSummary>
    where
        R: Read,
        F: FnMut(&TransferProgress<'_>),
    {
        self.config.validate()?;
        self.config
            .sequencer(self.slave)
            .transfer(&mut self.transport, image, &self.stop, progress)
    }

    /// Run the complete programming sequence.
    ///
    /// If any step before the final reset fails (including a stop request) and
    /// [`SessionConfig::reset_on_abort`] is set, one hard reset is attempted
    /// before the original error is returned.
    pub fn flash<R1, R2, F>(
        &mut self,
        driver: &mut ImageSource<R1>,
        firmware: &mut ImageSource<R2>,
        mut progress: F,
    ) -> Result<FlashReport>
    where
        R1: Read,
        R2: Read,
        F: FnMut(&TransferProgress<'_>),
    {
        self.config.validate()?;
        let start = Instant::now();

        let outcome = self.run_sequence(driver, firmware, &mut progress);
        let (driver, firmware) = match outcome {
            Ok(done) => done,
            Err(e) => {
                self.recover(&e);
                return Err(e);
            },
        };

        self.hard_reset()?;
        let report = FlashReport {
            driver,
            firmware,
            elapsed: start.elapsed(),
        };
        info!("Flashing finished in {:.1}s", report.elapsed.as_secs_f64());
        Ok(report)
    }

    fn run_sequence<R1, R2, F>(
        &mut self,
        driver: &mut ImageSource<R1>,
        firmware: &mut ImageSource<R2>,
        progress: &mut F,
    ) -> Result<(TransferSummary, TransferSummary)>
    where
        R1: Read,
        R2: Read,
        F: FnMut(&TransferProgress<'_>),
    {
        if self.config.debug_on {
            self.debug_on()?;
        }

        info!("Entering force-IROM mode");
        self.enter_irom_mode()?;
        self.enter_driver_write_state()?;

        info!("Downloading ISP driver {}", driver.label());
        let driver = self.step(Step::DriverTransfer, |s| {
            s.write_image(driver, &mut *progress)
        })?;

        info!("Starting ISP driver");
        self.run_driver()?;

        info!("Erasing inactive bank");
        self.erase_inactive_bank()?;

        info!("Downloading firmware {}", firmware.label());
        let delay = self.config.before_reset_delay;
        let firmware = self.step(Step::FirmwareTransfer, |s| {
            let summary = s.write_image(firmware, &mut *progress)?;
            pause(delay);
            Ok(summary)
        })?;

        Ok((driver, firmware))
    }

    /// Run `f` as `step`, honouring the stop flag and tagging failures.
    fn step<U>(&mut self, step: Step, f: impl FnOnce(&mut Self) -> Result<U>) -> Result<U> {
        if self.stop.is_stopped() {
            return Err(step_error(step, Error::Cancelled));
        }
        f(self).map_err(|e| step_error(step, e))
    }

    /// Best-effort hard reset after an aborted sequence.
    fn recover(&mut self, cause: &Error) {
        if !self.config.reset_on_abort {
            warn!("Aborted ({cause}), leaving device as is");
            return;
        }

        warn!("Aborted ({cause}), attempting hard reset");
        match self.send_command(Command::HardReset) {
            Ok(()) => info!("Device reset after abort"),
            Err(e) => warn!("Hard reset after abort failed: {e}"),
        }
    }
}

fn step_error(step: Step, source: Error) -> Error {
    Error::Step {
        step,
        source: Box::new(source),
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
