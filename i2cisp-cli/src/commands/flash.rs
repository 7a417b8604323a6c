//! Flash and write command implementations.

use anyhow::{Context, Result};
use console::style;
use i2cisp::{ImageSource, StopFlag, TransferProgress};
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;

use crate::bus::{Target, open_session};
use crate::config::Config;
use crate::{Cli, CliError, FlashOpts, install_stop_handler, use_fancy_output};

/// Create the transfer progress bar (hidden when quiet or not a TTY).
fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Status text shown next to the bar: image label, throughput and time left.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn progress_message(p: &TransferProgress<'_>) -> String {
    let rate = HumanBytes(p.rate() as u64);
    match p.eta() {
        Some(eta) => format!("{} ({rate}/s, {} left)", p.label, HumanDuration(eta)),
        None => format!("{} ({rate}/s)", p.label),
    }
}

/// Progress callback driving `pb`, restarting the bar for every new image.
fn track<'a>(pb: &'a ProgressBar) -> impl FnMut(&TransferProgress<'_>) + 'a {
    let mut current = String::new();
    move |p: &TransferProgress<'_>| {
        if p.label != current {
            current = p.label.to_string();
            pb.set_length(p.total_bytes.unwrap_or(0));
            pb.reset();
        }
        pb.set_position(p.bytes_done);
        pb.set_message(progress_message(p));
    }
}

fn open_image(path: &Path) -> Result<ImageSource<std::io::BufReader<std::fs::File>>> {
    ImageSource::open(path).with_context(|| format!("Failed to load image {}", path.display()))
}

fn announce(cli: &Cli, target: &Target) {
    if !cli.quiet {
        eprintln!(
            "{} Using {} (slave 0x{:02X})",
            style("🔌").cyan(),
            if target.dry_run {
                "simulated device"
            } else {
                target.device.as_str()
            },
            target.address
        );
    }
}

/// Translate a cancelled run into the CLI's cancellation error.
fn finish<T>(result: i2cisp::Result<T>, what: &str) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_cancelled() => {
            log::warn!("{what} interrupted: {e}");
            Err(CliError::Cancelled.into())
        },
        Err(e) => Err(anyhow::Error::new(e).context(format!("{what} failed"))),
    }
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    driver: &Path,
    firmware: &Path,
    opts: &FlashOpts,
) -> Result<()> {
    let mut driver_image = open_image(driver)?;
    let mut firmware_image = open_image(firmware)?;

    if !cli.quiet {
        for image in [driver_image.label(), firmware_image.label()] {
            eprintln!("{} Loaded {}", style("📦").cyan(), image);
        }
    }

    let stop = StopFlag::new();
    let (target, mut session) = open_session(cli, config, opts, &stop)?;
    install_stop_handler(&stop);
    announce(cli, &target);

    let pb = progress_bar(cli);
    let result = session.flash(&mut driver_image, &mut firmware_image, track(&pb));
    let report = match finish(result, "Flashing") {
        Ok(report) => report,
        Err(e) => {
            pb.abandon();
            return Err(e);
        },
    };
    pb.finish_with_message("done");

    if !cli.quiet {
        eprintln!(
            "\n{} Flashed {} ({} bytes) and {} ({} bytes) in {:.1}s",
            style("🎉").green().bold(),
            report.driver.label,
            report.driver.bytes,
            report.firmware.label,
            report.firmware.bytes,
            report.elapsed.as_secs_f64()
        );
    }

    Ok(())
}

/// Write command implementation.
pub(crate) fn cmd_write(cli: &Cli, config: &Config, image: &Path, opts: &FlashOpts) -> Result<()> {
    let mut source = open_image(image)?;
    if !cli.quiet {
        eprintln!("{} Loaded {}", style("📦").cyan(), source.label());
    }

    let stop = StopFlag::new();
    let (target, mut session) = open_session(cli, config, opts, &stop)?;
    install_stop_handler(&stop);
    announce(cli, &target);

    let pb = progress_bar(cli);
    let result = session.write_image(&mut source, track(&pb));
    let summary = match finish(result, "Write") {
        Ok(summary) => summary,
        Err(e) => {
            pb.abandon();
            return Err(e);
        },
    };
    pb.finish_with_message("done");

    if !cli.quiet {
        eprintln!(
            "\n{} Wrote {} ({} bytes, {} chunks, last address {})",
            style("✓").green().bold(),
            summary.label,
            summary.bytes,
            summary.chunks,
            summary.last_address
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn progress(chunks_done: usize, elapsed: Duration) -> TransferProgress<'static> {
        TransferProgress {
            label: "fw.bin",
            chunks_done,
            total_chunks: Some(4),
            bytes_done: chunks_done as u64 * 4096,
            total_bytes: Some(16384),
            elapsed,
        }
    }

    #[test]
    fn test_progress_message_shows_rate_and_time_left() {
        let msg = progress_message(&progress(1, Duration::from_secs(2)));
        assert!(msg.starts_with("fw.bin ("));
        assert!(msg.contains("/s"));
        assert!(msg.contains("6 seconds left"));
    }

    #[test]
    fn test_progress_message_without_estimate() {
        let msg = progress_message(&progress(0, Duration::ZERO));
        assert_eq!(msg, "fw.bin (0 B/s)");
    }
}
