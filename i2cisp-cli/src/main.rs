//! i2cisp CLI - Command-line tool for flashing firmware over ISP-over-I2C.
//!
//! ## Features
//!
//! - Run the complete driver + firmware programming sequence
//! - Write a single image or send single ISP commands
//! - Inspect the chunk layout of an image
//! - Dry runs against a simulated device
//! - Transaction logging to CSV
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use i2cisp::{Command as IspCommand, StopFlag};
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

mod bus;
mod commands;
mod config;

use config::Config;

/// Default I2C bus device.
pub(crate) const DEFAULT_DEVICE: &str = "/dev/i2c-1";

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// i2cisp - Flash display controller firmware over the ISP-over-I2C port.
///
/// Environment variables:
///   I2CISP_DEVICE    - I2C bus device (default: /dev/i2c-1)
///   I2CISP_ADDRESS   - 7-bit slave address in hex (default: 0x73)
#[derive(Parser)]
#[command(name = "i2cisp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// I2C bus device.
    #[arg(short, long, global = true, env = "I2CISP_DEVICE")]
    pub(crate) device: Option<String>,

    /// 7-bit slave address of the ISP monitor (hex, e.g. 0x73).
    #[arg(short, long, global = true, env = "I2CISP_ADDRESS", value_parser = parse_slave_address)]
    pub(crate) address: Option<u8>,

    /// Talk to a simulated device that acknowledges everything.
    #[arg(long, global = true)]
    pub(crate) dry_run: bool,

    /// Append every bus transaction to this CSV file.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) log_transactions: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the complete programming sequence: ISP driver, erase, firmware, reset.
    Flash {
        /// ISP driver binary.
        driver: PathBuf,

        /// Firmware binary.
        firmware: PathBuf,

        #[command(flatten)]
        opts: FlashOpts,
    },

    /// Write a single image with fast-flash-write (no mode changes, no reset).
    Write {
        /// Binary to write.
        image: PathBuf,

        #[command(flatten)]
        opts: FlashOpts,
    },

    /// Send a single ISP command and wait for its acknowledgement.
    Command {
        /// Command to send.
        #[arg(value_enum)]
        command: CommandArg,
    },

    /// Show the chunk layout of an image.
    Info {
        /// Binary to inspect.
        image: PathBuf,

        /// Chunk size in bytes.
        #[arg(long, default_value_t = i2cisp::protocol::MAX_CHUNK_SIZE)]
        chunk_size: usize,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by the commands that transfer images.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct FlashOpts {
    /// Chunk size in bytes (1-4096).
    #[arg(long)]
    pub(crate) chunk_size: Option<usize>,

    /// Pause between priming frame and chunk, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub(crate) chunk_delay: Option<u64>,

    /// Send the debug-on command first.
    #[arg(long)]
    pub(crate) debug_on: bool,

    /// Leave the device alone when the sequence is aborted.
    #[arg(long)]
    pub(crate) no_reset_on_abort: bool,
}

/// Single ISP commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum CommandArg {
    /// Enter force-IROM mode.
    Irom,
    /// Enter the ISP driver write state.
    DriverState,
    /// Run the ISP driver.
    Run,
    /// Erase the inactive bank.
    Erase,
    /// Hard reset the device.
    Reset,
    /// Turn on the debug channel.
    DebugOn,
}

impl From<CommandArg> for IspCommand {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Irom => IspCommand::EnterIromMode,
            CommandArg::DriverState => IspCommand::EnterDriverWriteState,
            CommandArg::Run => IspCommand::RunDriver,
            CommandArg::Erase => IspCommand::EraseInactiveBank,
            CommandArg::Reset => IspCommand::HardReset,
            CommandArg::DebugOn => IspCommand::DebugOn,
        }
    }
}

/// CLI-level failures with a dedicated exit code.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Invalid invocation or configuration.
    #[error("{0}")]
    Usage(String),
    /// Interrupted by the user.
    #[error("Interrupted")]
    Cancelled,
}

/// Parse a 7-bit I2C address given in hex (`0x` prefix optional).
fn parse_slave_address(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    let value =
        u8::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex address '{s}': {e}"))?;
    if value > 0x7F {
        return Err(format!("Address 0x{value:02X} is not a 7-bit I2C address"));
    }
    Ok(value)
}

/// Map a failure to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::Usage(_) => 2,
                CliError::Cancelled => 130,
            };
        }
        if let Some(isp) = cause.downcast_ref::<i2cisp::Error>() {
            return match isp.kind() {
                i2cisp::ErrorKind::Cancelled => 130,
                i2cisp::ErrorKind::Config => 2,
                _ => 1,
            };
        }
    }
    1
}

/// Install a Ctrl-C handler that raises `stop`.
pub(crate) fn install_stop_handler(stop: &StopFlag) {
    let stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if stop.is_stopped() {
            // Second Ctrl-C: give up immediately.
            std::process::exit(130);
        }
        eprintln!("\nStopping after the current chunk...");
        stop.stop();
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "i2cisp v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = match cli.config_path {
        Some(ref path) => Config::load_from_path(path)
            .map_err(|e| CliError::Usage(format!("Invalid config: {e:#}")))?,
        None => Config::load(),
    };

    match &cli.command {
        Commands::Flash {
            driver,
            firmware,
            opts,
        } => commands::flash::cmd_flash(cli, &config, driver, firmware, opts),
        Commands::Write { image, opts } => commands::flash::cmd_write(cli, &config, image, opts),
        Commands::Command { command } => commands::command::cmd_command(cli, &config, *command),
        Commands::Info {
            image,
            chunk_size,
            json,
        } => commands::info::cmd_info(image, *chunk_size, *json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell, &mut std::io::stdout())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_slave_address() {
        assert_eq!(parse_slave_address("0x73"), Ok(0x73));
        assert_eq!(parse_slave_address("0X14"), Ok(0x14));
        assert_eq!(parse_slave_address(" 7f "), Ok(0x7F));
        assert!(parse_slave_address("0x80").is_err());
        assert!(parse_slave_address("zz").is_err());
        assert!(parse_slave_address("").is_err());
    }

    #[test]
    fn test_exit_codes() {
        let usage = anyhow::Error::new(CliError::Usage("bad".into()));
        assert_eq!(exit_code_for(&usage), 2);

        let cancelled = anyhow::Error::new(i2cisp::Error::Step {
            step: i2cisp::Step::FirmwareTransfer,
            source: Box::new(i2cisp::Error::Cancelled),
        })
        .context("Flashing failed");
        assert_eq!(exit_code_for(&cancelled), 130);

        let nack = anyhow::Error::new(i2cisp::Error::Nack { status: [0; 8] });
        assert_eq!(exit_code_for(&nack), 1);

        let config = anyhow::Error::new(i2cisp::Error::Config("chunk size".into()));
        assert_eq!(exit_code_for(&config), 2);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_command_arg_mapping() {
        assert_eq!(IspCommand::from(CommandArg::Irom), IspCommand::EnterIromMode);
        assert_eq!(IspCommand::from(CommandArg::Reset), IspCommand::HardReset);
        assert_eq!(IspCommand::from(CommandArg::DebugOn), IspCommand::DebugOn);
    }

    #[test]
    fn test_flash_parses_global_options() {
        let cli = Cli::try_parse_from([
            "i2cisp",
            "--address",
            "0x14",
            "--dry-run",
            "flash",
            "drv.bin",
            "fw.bin",
            "--chunk-size",
            "1024",
        ])
        .unwrap();
        assert_eq!(cli.address, Some(0x14));
        assert!(cli.dry_run);
        match cli.command {
            Commands::Flash { opts, .. } => assert_eq!(opts.chunk_size, Some(1024)),
            _ => panic!("expected flash"),
        }
    }
}
