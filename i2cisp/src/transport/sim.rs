//! In-memory device model used for dry runs and tests.

use crate::error::{Error, Result};
use crate::protocol::{Command, StatusReply, decode_chunk, frame::verify_command};
use crate::transport::Transport;
use std::collections::VecDeque;

/// A transport that records every write and answers reads from a script.
///
/// When the script runs dry every read is answered with an ACK, which makes a
/// freshly created target behave like a device that accepts everything.
#[derive(Debug, Default)]
pub struct SimulatedTarget {
    writes: Vec<Vec<u8>>,
    replies: VecDeque<StatusReply>,
    reads: usize,
    fail_write_at: Option<usize>,
}

impl SimulatedTarget {
    /// A target that acknowledges every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// A target that answers the first reads with `replies`, then ACKs.
    pub fn with_replies(replies: impl IntoIterator<Item = StatusReply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Make the write with zero-based number `index` fail at the bus level.
    #[must_use]
    pub fn fail_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    /// Every buffer written so far, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Number of status reads served.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Scripted replies not consumed yet.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Commands recognized among the writes, including priming frames.
    pub fn commands(&self) -> Vec<Command> {
        self.writes
            .iter()
            .filter_map(|w| verify_command(w).ok().and_then(Command::from_payload))
            .collect()
    }

    /// Chunk frames, i.e. every write that directly follows a priming frame.
    pub fn chunk_frames(&self) -> Vec<&[u8]> {
        let priming = Command::FastFlashWrite.frame();
        self.writes
            .windows(2)
            .filter(|pair| pair[0] == priming)
            .map(|pair| pair[1].as_slice())
            .collect()
    }

    /// Concatenated data of every chunk written, in order.
    pub fn reassembled(&self) -> Result<Vec<u8>> {
        let mut image = Vec::new();
        for frame in self.chunk_frames() {
            let chunk = decode_chunk(frame)?;
            if !chunk.crc_ok() {
                return Err(Error::InvalidFrame("chunk CRC mismatch".into()));
            }
            image.extend_from_slice(chunk.data);
        }
        Ok(image)
    }
}

impl Transport for SimulatedTarget {
    fn write(&mut self, _slave: u8, data: &[u8]) -> Result<usize> {
        if self.fail_write_at == Some(self.writes.len()) {
            self.fail_write_at = None;
            return Err(Error::Transport("simulated bus failure".into()));
        }
        self.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn read(&mut self, _slave: u8, len: usize) -> Result<Vec<u8>> {
        self.reads += 1;
        let reply = self.replies.pop_front().unwrap_or_else(StatusReply::ack);
        let mut out = reply.bytes().to_vec();
        out.resize(len, 0);
        Ok(out)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{WriteAddress, encode_chunk};

    #[test]
    fn test_default_reply_is_ack() {
        let mut target = SimulatedTarget::new();
        let status = StatusReply::from_slice(&target.read(0x73, 8).unwrap()).unwrap();
        assert_eq!(status, StatusReply::ack());
        assert_eq!(target.reads(), 1);
    }

    #[test]
    fn test_scripted_replies_come_first() {
        let mut target = SimulatedTarget::with_replies([StatusReply::busy(), StatusReply::nack()]);
        assert_eq!(target.read(0x73, 8).unwrap()[1], 0x80);
        assert_eq!(&target.read(0x73, 8).unwrap()[5..7], &[0x03, 0x0B]);
        assert_eq!(&target.read(0x73, 8).unwrap()[5..7], &[0x03, 0x0C]);
        assert_eq!(target.pending_replies(), 0);
    }

    #[test]
    fn test_reassembles_chunks_after_priming() {
        let mut target = SimulatedTarget::new();
        target.write_all(0x73, &Command::EnterIromMode.frame()).unwrap();
        for (i, part) in [&b"hello "[..], &b"world"[..]].iter().enumerate() {
            target.write_all(0x73, &Command::FastFlashWrite.frame()).unwrap();
            let addr = WriteAddress::new(0, 0, u8::try_from(i * 16).unwrap());
            target.write_all(0x73, &encode_chunk(addr, part)).unwrap();
        }

        assert_eq!(target.chunk_frames().len(), 2);
        assert_eq!(target.reassembled().unwrap(), b"hello world");
        assert_eq!(
            target.commands(),
            [
                Command::EnterIromMode,
                Command::FastFlashWrite,
                Command::FastFlashWrite
            ]
        );
    }

    #[test]
    fn test_injected_write_failure() {
        let mut target = SimulatedTarget::new().fail_write_at(1);
        assert!(target.write(0x73, &[1]).is_ok());
        assert!(target.write(0x73, &[2]).is_err());
        assert!(target.write(0x73, &[3]).is_ok());
        assert_eq!(target.writes().len(), 2);
    }
}
