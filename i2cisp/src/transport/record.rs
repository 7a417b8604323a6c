//! Transaction log wrapper.
//!
//! Every write and read passing through a [`RecordingTransport`] is appended to a
//! text sink as one CSV line, `W,<bytes>` or `R,<bytes>`, with bytes in hex. The
//! log is what a bench engineer inspects after a failed run, so reads that end
//! in an error are recorded too (as `W!,<message>` or `R!,<message>`). A write is
//! logged only after the bus accepted it.

use crate::error::Result;
use crate::transport::Transport;
use std::io::Write;

/// Header line written when a log is started.
pub const LOG_HEADER: &str = "W/R,I2C_Msg";

/// A transport wrapper that logs every transaction.
pub struct RecordingTransport<T, W: Write> {
    inner: T,
    log: W,
}

impl<T: Transport, W: Write> RecordingTransport<T, W> {
    /// Wrap `inner`, writing the CSV header to `log`.
    pub fn new(inner: T, mut log: W) -> Result<Self> {
        writeln!(log, "{LOG_HEADER}")?;
        Ok(Self { inner, log })
    }

    /// Flush the log and return the wrapped transport and sink.
    pub fn into_parts(mut self) -> Result<(T, W)> {
        self.log.flush()?;
        Ok((self.inner, self.log))
    }

    fn record(&mut self, tag: &str, bytes: &[u8]) -> Result<()> {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
        writeln!(self.log, "{tag},{}", hex.join(" "))?;
        Ok(())
    }
}

impl<T: Transport, W: Write> Transport for RecordingTransport<T, W> {
    fn write(&mut self, slave: u8, data: &[u8]) -> Result<usize> {
        match self.inner.write(slave, data) {
            Ok(written) => {
                self.record("W", data)?;
                Ok(written)
            },
            Err(e) => {
                writeln!(self.log, "W!,{e}")?;
                Err(e)
            },
        }
    }

    fn read(&mut self, slave: u8, len: usize) -> Result<Vec<u8>> {
        match self.inner.read(slave, len) {
            Ok(data) => {
                self.record("R", &data)?;
                Ok(data)
            },
            Err(e) => {
                writeln!(self.log, "R!,{e}")?;
                Err(e)
            },
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, StatusReply};
    use crate::transport::SimulatedTarget;

    #[test]
    fn test_records_writes_and_reads() {
        let target = SimulatedTarget::with_replies([StatusReply::busy()]);
        let mut bus = RecordingTransport::new(target, Vec::new()).unwrap();

        bus.write_all(0x73, &Command::FastFlashWrite.frame()).unwrap();
        bus.read_exact(0x73, 8).unwrap();

        let (target, log) = bus.into_parts().unwrap();
        assert_eq!(target.writes().len(), 1);

        let text = String::from_utf8(log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "W/R,I2C_Msg",
                "W,51 85 C2 00 00 03 10 E3",
                "R,00 80 00 00 00 00 00 00"
            ]
        );
    }

    #[test]
    fn test_failed_transactions_are_marked() {
        let target = SimulatedTarget::new().fail_write_at(0);
        let mut bus = RecordingTransport::new(target, Vec::new()).unwrap();

        assert!(bus.write_all(0x73, &[0xAB, 0xCD]).is_err());
        bus.write_all(0x73, &[0x01]).unwrap();

        let (target, log) = bus.into_parts().unwrap();
        assert_eq!(target.writes().len(), 1);

        let text = String::from_utf8(log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("W!,"));
        assert_eq!(lines[2], "W,01");
    }

    #[test]
    fn test_failed_read_is_marked() {
        let mut bus = RecordingTransport::new(DeadReads, Vec::new()).unwrap();

        assert!(bus.read(0x73, 8).is_err());

        let (_, log) = bus.into_parts().unwrap();
        let text = String::from_utf8(log).unwrap();
        assert_eq!(text.lines().nth(1), Some("R!,Transport error: no reply"));
    }

    struct DeadReads;

    impl Transport for DeadReads {
        fn write(&mut self, _slave: u8, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }

        fn read(&mut self, _slave: u8, _len: usize) -> Result<Vec<u8>> {
            Err(crate::Error::Transport("no reply".into()))
        }

        fn name(&self) -> &str {
            "dead"
        }
    }

    #[test]
    fn test_name_is_forwarded() {
        let bus = RecordingTransport::new(SimulatedTarget::new(), std::io::sink()).unwrap();
        assert_eq!(bus.name(), "simulated");
    }
}
