//! Firmware image sources.
//!
//! Images are plain binaries. They are consumed strictly front to back in
//! fixed-size chunks and never seeked, so any [`Read`] works as a source.

use crate::error::{Error, Result};
use crate::protocol::{MAX_CHUNK_SIZE, WriteAddress, crc16};
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read};
use std::path::Path;

/// A labelled, sequentially read firmware image.
#[derive(Debug)]
pub struct ImageSource<R> {
    label: String,
    reader: R,
    len: Option<u64>,
}

impl<R: Read> ImageSource<R> {
    /// Wrap a reader. `len` is only used for progress reporting.
    pub fn new(label: impl Into<String>, reader: R, len: Option<u64>) -> Self {
        Self {
            label: label.into(),
            reader,
            len,
        }
    }

    /// Name shown in logs and progress output.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Total image size, when known up front.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    /// Whether the image is known to be empty.
    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }

    /// Number of chunks the image splits into, when its size is known.
    pub fn chunk_count(&self, chunk_size: usize) -> Option<usize> {
        self.len
            .and_then(|len| usize::try_from(len).ok())
            .map(|len| len.div_ceil(chunk_size))
    }

    /// Iterate the image in chunks of `chunk_size` bytes.
    pub fn chunks(&mut self, chunk_size: usize) -> ChunkReader<&mut R> {
        ChunkReader::new(&mut self.reader, chunk_size)
    }
}

impl ImageSource<BufReader<File>> {
    /// Open a binary image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::InvalidImage(format!("{}: {e}", path.display())))?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(Error::InvalidImage(format!("{} is empty", path.display())));
        }

        let label = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(label, BufReader::new(file), Some(len)))
    }
}

impl<'a> ImageSource<Cursor<&'a [u8]>> {
    /// Use an in-memory buffer as an image.
    pub fn from_bytes(label: impl Into<String>, data: &'a [u8]) -> Self {
        Self::new(label, Cursor::new(data), Some(data.len() as u64))
    }
}

/// Splits a reader into chunks of at most `chunk_size` bytes.
///
/// Short reads from the source are retried until the chunk is full, so only the
/// final chunk can be shorter than `chunk_size`.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Create a chunk reader.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size,
            done: false,
        }
    }

    /// Read the next chunk, or `None` at end of image.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if filled < buf.len() {
            self.done = true;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Where one chunk of an image lands on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PlannedChunk {
    /// Zero-based chunk index.
    pub index: usize,
    /// Byte offset within the image.
    pub offset: u64,
    /// Data length.
    pub len: usize,
    /// Device write address.
    pub address: WriteAddress,
    /// CRC16 sent with the chunk.
    pub crc: u16,
}

/// Walk an image and compute address, length and CRC of every chunk.
pub fn plan_chunks<R: Read>(reader: R, chunk_size: usize) -> Result<Vec<PlannedChunk>> {
    check_chunk_size(chunk_size)?;

    let mut plan = Vec::new();
    let mut address = WriteAddress::START;
    let mut offset = 0u64;
    for (index, chunk) in ChunkReader::new(reader, chunk_size).enumerate() {
        let chunk = chunk?;
        if index > 0 {
            address.advance()?;
        }
        plan.push(PlannedChunk {
            index,
            offset,
            len: chunk.len(),
            address,
            crc: crc16(&chunk),
        });
        offset += chunk.len() as u64;
    }

    if plan.is_empty() {
        return Err(Error::InvalidImage("image is empty".into()));
    }
    Ok(plan)
}

/// Reject chunk sizes the device cannot take.
pub fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(Error::Config(format!(
            "chunk size {chunk_size} outside 1..={MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}
