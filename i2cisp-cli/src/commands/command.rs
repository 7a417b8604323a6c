//! Single ISP command implementation.

use anyhow::{Context, Result};
use console::style;
use i2cisp::{Command, StopFlag};

use crate::bus::open_session;
use crate::config::Config;
use crate::{Cli, CommandArg, FlashOpts};

/// Send one command and wait for its acknowledgement.
pub(crate) fn cmd_command(cli: &Cli, config: &Config, arg: CommandArg) -> Result<()> {
    let command = Command::from(arg);
    let (_, mut session) = open_session(cli, config, &FlashOpts::default(), &StopFlag::new())?;

    // The step methods include the settle delay that follows each command.
    match arg {
        CommandArg::Irom => session.enter_irom_mode(),
        CommandArg::DriverState => session.enter_driver_write_state(),
        CommandArg::Run => session.run_driver(),
        CommandArg::Erase => session.erase_inactive_bank(),
        CommandArg::Reset => session.hard_reset(),
        CommandArg::DebugOn => session.debug_on(),
    }
    .with_context(|| format!("Command '{command}' failed"))?;

    if !cli.quiet {
        eprintln!("{} {command}: acknowledged", style("✓").green());
    }
    Ok(())
}
