//! Chunked fast-flash-write transfer.
//!
//! Every chunk is announced with the priming command, followed by the chunk
//! frame itself, which the device acknowledges through the [`AckPoller`].

use crate::error::{Error, Result};
use crate::image::{ImageSource, check_chunk_size};
use crate::poller::AckPoller;
use crate::protocol::{Command, MAX_CHUNK_SIZE, WriteAddress, encode_chunk};
use crate::session::StopFlag;
use crate::transport::Transport;
use log::{debug, info, trace};
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

/// Default pause between the priming frame and the chunk frame.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Progress of an image transfer, reported after each acknowledged chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress<'a> {
    /// Image label.
    pub label: &'a str,
    /// Chunks acknowledged so far.
    pub chunks_done: usize,
    /// Total chunk count, when the image size is known.
    pub total_chunks: Option<usize>,
    /// Image bytes acknowledged so far.
    pub bytes_done: u64,
    /// Image size, when known.
    pub total_bytes: Option<u64>,
    /// Time since the transfer started.
    pub elapsed: Duration,
}

impl TransferProgress<'_> {
    /// Average throughput in bytes per second.
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_done as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated time left, extrapolated from the chunks done so far.
    #[allow(clippy::cast_precision_loss)]
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total_chunks?;
        if self.chunks_done == 0 {
            return None;
        }
        let left = total.saturating_sub(self.chunks_done) as f64;
        Some(self.elapsed.mul_f64(left / self.chunks_done as f64))
    }
}

/// Outcome of a completed image transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransferSummary {
    /// Image label.
    pub label: String,
    /// Chunks written.
    pub chunks: usize,
    /// Bytes written.
    pub bytes: u64,
    /// Wall time of the transfer.
    pub elapsed: Duration,
    /// Address of the last chunk written.
    pub last_address: WriteAddress,
}

/// Splits an image into chunks and writes them in order.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSequencer {
    slave: u8,
    chunk_size: usize,
    chunk_delay: Duration,
    poller: AckPoller,
}

impl ChunkSequencer {
    /// Sequencer for `slave` with full-size chunks and default timing.
    pub fn new(slave: u8) -> Self {
        Self {
            slave,
            chunk_size: MAX_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            poller: AckPoller::default(),
        }
    }

    /// Set the chunk size (`1..=4096`).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the pause between priming frame and chunk frame.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Set the acknowledgement poller.
    #[must_use]
    pub fn with_poller(mut self, poller: AckPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Write `image` to the device.
    ///
    /// `stop` is checked before every chunk. Failures are wrapped in
    /// [`Error::Chunk`] carrying the chunk index and image offset.
    pub fn transfer<T, R, F>(
        &self,
        transport: &mut T,
        image: &mut ImageSource<R>,
        stop: &StopFlag,
        mut progress: F,
    ) -> Result<TransferSummary>
    where
        T: Transport + ?Sized,
        R: Read,
        F: FnMut(&TransferProgress<'_>),
    {
        check_chunk_size(self.chunk_size)?;
        if image.is_empty() {
            return Err(Error::InvalidImage(format!("{} is empty", image.label())));
        }

        let label = image.label().to_owned();
        let total_bytes = image.len();
        let total_chunks = image.chunk_count(self.chunk_size);
        info!(
            "Writing {label} ({} bytes, {} chunks)",
            total_bytes.map_or_else(|| "?".to_string(), |n| n.to_string()),
            total_chunks.map_or_else(|| "?".to_string(), |n| n.to_string()),
        );

        let start = Instant::now();
        let mut reader = image.chunks(self.chunk_size);
        let mut address = WriteAddress::START;
        let mut index = 0usize;
        let mut offset = 0u64;

        loop {
            let wrap = move |source: Error| Error::Chunk {
                index,
                offset,
                source: Box::new(source),
            };

            let Some(data) = reader.next_chunk().map_err(wrap)? else {
                break;
            };
            if index > 0 {
                address.advance().map_err(wrap)?;
            }
            self.write_chunk(transport, stop, address, &data)
                .map_err(wrap)?;

            index += 1;
            offset += data.len() as u64;

            let report = TransferProgress {
                label: &label,
                chunks_done: index,
                total_chunks,
                bytes_done: offset,
                total_bytes,
                elapsed: start.elapsed(),
            };
            debug!(
                "{label}: chunk {index} at {address} acknowledged, {offset} bytes, eta {:?}",
                report.eta()
            );
            progress(&report);
        }

        if index == 0 {
            return Err(Error::InvalidImage(format!("{label} is empty")));
        }

        let summary = TransferSummary {
            label,
            chunks: index,
            bytes: offset,
            elapsed: start.elapsed(),
            last_address: address,
        };
        info!(
            "Wrote {} ({} bytes in {} chunks, {:.1}s)",
            summary.label,
            summary.bytes,
            summary.chunks,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    fn write_chunk<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        stop: &StopFlag,
        address: WriteAddress,
        data: &[u8],
    ) -> Result<()> {
        if stop.is_stopped() {
            return Err(Error::Cancelled);
        }

        transport.write_all(self.slave, &Command::FastFlashWrite.frame())?;
        if !self.chunk_delay.is_zero() {
            thread::sleep(self.chunk_delay);
        }

        let frame = encode_chunk(address, data);
        trace!("chunk frame at {address}: {} bytes", frame.len());
        transport.write_all(self.slave, &frame)?;
        self.poller.poll(transport, self.slave)?;
        Ok(())
    }
}
