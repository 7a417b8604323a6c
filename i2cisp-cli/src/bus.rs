//! Bus selection and session setup.
//!
//! Resolves the bus device and slave address from CLI args, environment and
//! configuration, and opens either the real `i2c-dev` bus or the simulated
//! target used by `--dry-run`. When `--log-transactions` is given the bus is
//! wrapped so every transaction lands in a CSV file.

use {
    crate::{Cli, CliError, DEFAULT_DEVICE, FlashOpts, config::Config},
    anyhow::{Context, Result},
    i2cisp::{
        DEFAULT_SLAVE, FlashSession, RecordingTransport, SessionConfig, SimulatedTarget, StopFlag,
        Transport,
    },
    log::{debug, info},
    std::{fs::OpenOptions, io::LineWriter, time::Duration},
};

/// Transport handle used by all commands.
pub(crate) type Bus = Box<dyn Transport>;

/// Where the session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    /// Bus device, or "simulated" for dry runs.
    pub device: String,
    /// 7-bit slave address.
    pub address: u8,
    /// Whether the simulated target is used.
    pub dry_run: bool,
}

impl Target {
    /// Resolve the target: CLI/env first, then config, then built-in defaults.
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            device: cli
                .device
                .clone()
                .or_else(|| config.bus.device.clone())
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            address: cli.address.or(config.bus.address).unwrap_or(DEFAULT_SLAVE),
            dry_run: cli.dry_run,
        }
    }
}

/// Build the session settings from defaults, config file and command options.
///
/// Dry runs start from zero delays so they complete instantly.
pub(crate) fn session_config(dry_run: bool, config: &Config, opts: &FlashOpts) -> SessionConfig {
    let base = if dry_run {
        SessionConfig::without_delays()
    } else {
        SessionConfig::default()
    };
    let mut session = if dry_run {
        // Keep sizes and behaviour from the config, but no waiting.
        SessionConfig {
            chunk_size: config.flash.chunk_size.unwrap_or(base.chunk_size),
            reset_on_abort: config.flash.reset_on_abort.unwrap_or(base.reset_on_abort),
            debug_on: config.flash.debug_on,
            ..base
        }
    } else {
        config.apply_to(base)
    };

    if let Some(size) = opts.chunk_size {
        session.chunk_size = size;
    }
    if let Some(ms) = opts.chunk_delay {
        session.chunk_delay = Duration::from_millis(ms);
    }
    if opts.debug_on {
        session.debug_on = true;
    }
    if opts.no_reset_on_abort {
        session.reset_on_abort = false;
    }
    session
}

/// Open the bus for `target`.
pub(crate) fn open_bus(target: &Target) -> Result<Bus> {
    if target.dry_run {
        info!("Dry run: using a simulated device");
        return Ok(Box::new(SimulatedTarget::new()));
    }
    open_device(&target.device)
}

#[cfg(target_os = "linux")]
fn open_device(device: &str) -> Result<Bus> {
    let bus = i2cisp::open_i2c_dev(device)
        .with_context(|| format!("Failed to open I2C bus {device}"))?;
    Ok(Box::new(bus))
}

#[cfg(not(target_os = "linux"))]
fn open_device(device: &str) -> Result<Bus> {
    Err(CliError::Usage(format!(
        "Cannot open {device}: I2C bus access is only supported on Linux (use --dry-run)"
    ))
    .into())
}

/// Wrap `bus` with a transaction log when requested.
fn with_transaction_log(cli: &Cli, bus: Bus) -> Result<Bus> {
    let Some(path) = &cli.log_transactions else {
        return Ok(bus);
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open transaction log {}", path.display()))?;
    debug!("Logging transactions to {}", path.display());
    Ok(Box::new(RecordingTransport::new(bus, LineWriter::new(file))?))
}

/// Open a session ready to run commands, wired to `stop`.
pub(crate) fn open_session(
    cli: &Cli,
    config: &Config,
    opts: &FlashOpts,
    stop: &StopFlag,
) -> Result<(Target, FlashSession<Bus>)> {
    let target = Target::resolve(cli, config);
    let settings = session_config(target.dry_run, config, opts);
    settings
        .validate()
        .map_err(|e| CliError::Usage(e.to_string()))?;

    let bus = with_transaction_log(cli, open_bus(&target)?)?;
    let session = FlashSession::new(bus, target.address)
        .with_config(settings)
        .with_stop_flag(stop.clone());
    Ok((target, session))
}
