//! Fast-flash-write chunk encoding and device write addressing.
//!
//! ## Chunk Format
//!
//! ```text
//! +-----------+-----------+------------------+--------------------+
//! |  Address  |  Length   |       Data       |       CRC16        |
//! +-----------+-----------+------------------+--------------------+
//! | 4 bytes BE| 4 bytes BE|  <= 4096 bytes   | 4 bytes BE (0-ext) |
//! +-----------+-----------+------------------+--------------------+
//! ```

use crate::error::{Error, Result};
use crate::protocol::crc::crc16;
use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;

/// Largest chunk the device accepts in one fast-flash write.
pub const MAX_CHUNK_SIZE: usize = 0x1000;

/// Address, length and CRC fields around the chunk data.
pub const CHUNK_OVERHEAD: usize = 12;

/// Step of the offset byte per chunk.
const OFFSET_STEP: u8 = 16;

/// Offset value after which the page advances.
const OFFSET_LIMIT: u8 = 240;

/// Page value after which the bank advances.
const PAGE_LIMIT: u8 = 255;

/// Device write address of a chunk.
///
/// This is not a plain integer: it is a three-digit counter `[bank, page, offset]`
/// where `offset` counts in steps of 16 up to 240, and the whole counter is sent as
/// `[bank, page, offset, 0x00]`. One [`advance`](Self::advance) per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WriteAddress {
    /// Bank byte.
    pub bank: u8,
    /// Page byte.
    pub page: u8,
    /// Offset byte, a multiple of 16.
    pub offset: u8,
}

impl WriteAddress {
    /// Address of the first chunk of every image.
    pub const START: Self = Self {
        bank: 0,
        page: 0,
        offset: 0,
    };

    /// Build an address from its counter digits.
    pub const fn new(bank: u8, page: u8, offset: u8) -> Self {
        Self { bank, page, offset }
    }

    /// The 4-byte field written in front of the chunk.
    pub fn to_bytes(self) -> [u8; 4] {
        [self.bank, self.page, self.offset, 0x00]
    }

    /// The address field read as a big-endian word.
    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.to_bytes())
    }

    /// Counter value of the next chunk.
    ///
    /// The offset rollover is checked before the page rollover, so a page of 255
    /// only ever carries offset 0 before the bank advances. A hand-built
    /// `[bank, 255, 240]` carries into the bank instead of wrapping the page.
    pub fn next(self) -> Result<Self> {
        if self.offset == OFFSET_LIMIT && self.page < PAGE_LIMIT {
            Ok(Self {
                page: self.page + 1,
                offset: 0,
                ..self
            })
        } else if self.page == PAGE_LIMIT {
            let bank = self.bank.checked_add(1).ok_or(Error::AddressOverflow)?;
            Ok(Self {
                bank,
                page: 0,
                offset: 0,
            })
        } else {
            Ok(Self {
                offset: self.offset + OFFSET_STEP,
                ..self
            })
        }
    }

    /// Move to the next chunk address in place.
    pub fn advance(&mut self) -> Result<()> {
        *self = self.next()?;
        Ok(())
    }
}

impl fmt::Display for WriteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

/// Serialize one chunk for a fast-flash write.
///
/// The CRC covers `data` only and is zero-extended to four bytes. Callers must
/// keep `data` within [`MAX_CHUNK_SIZE`].
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn encode_chunk(address: WriteAddress, data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() <= MAX_CHUNK_SIZE);

    let mut buf = Vec::with_capacity(CHUNK_OVERHEAD + data.len());
    buf.extend_from_slice(&address.to_bytes());
    // Safe cast: chunk length is bounded by MAX_CHUNK_SIZE
    buf.write_u32::<BigEndian>(data.len() as u32).unwrap();
    buf.extend_from_slice(data);
    buf.write_u32::<BigEndian>(u32::from(crc16(data))).unwrap();
    buf
}

/// A chunk frame split back into its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk<'a> {
    /// Raw address field.
    pub address: [u8; 4],
    /// Chunk data.
    pub data: &'a [u8],
    /// CRC field.
    pub crc: u32,
}

impl DecodedChunk<'_> {
    /// Whether the CRC field matches the data.
    pub fn crc_ok(&self) -> bool {
        self.crc == u32::from(crc16(self.data))
    }
}

/// Split a chunk frame into its fields, checking the length field.
pub fn decode_chunk(frame: &[u8]) -> Result<DecodedChunk<'_>> {
    if frame.len() < CHUNK_OVERHEAD {
        return Err(Error::InvalidFrame(format!(
            "chunk frame too short: {} bytes",
            frame.len()
        )));
    }

    let address = [frame[0], frame[1], frame[2], frame[3]];
    let len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
    if frame.len() != CHUNK_OVERHEAD + len {
        return Err(Error::InvalidFrame(format!(
            "chunk length field {len} does not match frame of {} bytes",
            frame.len()
        )));
    }

    let data = &frame[8..8 + len];
    let tail = &frame[8 + len..];
    let crc = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);

    Ok(DecodedChunk { address, data, crc })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_chunk_layout() {
        let data = [0x01, 0x02, 0x03];
        let frame = encode_chunk(WriteAddress::new(0x01, 0x02, 0x30), &data);

        assert_eq!(frame.len(), CHUNK_OVERHEAD + data.len());
        assert_eq!(&frame[0..4], &[0x01, 0x02, 0x30, 0x00]);
        assert_eq!(&frame[4..8], &[0x00, 0x00, 0x00, 0x03]);
        assert_eq!(&frame[8..11], &data);
        let crc = crc16(&data).to_be_bytes();
        assert_eq!(&frame[11..15], &[0x00, 0x00, crc[0], crc[1]]);
    }

    #[test]
    fn test_encode_full_chunk() {
        let data = vec![0xAA; MAX_CHUNK_SIZE];
        let frame = encode_chunk(WriteAddress::START, &data);
        assert_eq!(&frame[4..8], &[0x00, 0x00, 0x10, 0x00]);
        assert_eq!(&frame[frame.len() - 4..], &[0x00, 0x00, 0x6F, 0x89]);
    }

    #[test]
    fn test_short_final_chunk_is_not_padded() {
        let data = vec![0x42; 904];
        let frame = encode_chunk(WriteAddress::START, &data);
        let decoded = decode_chunk(&frame).unwrap();
        assert_eq!(decoded.data.len(), 904);
        assert!(decoded.crc_ok());
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        let mut frame = encode_chunk(WriteAddress::START, &[1, 2, 3, 4]);
        frame[7] = 5;
        assert!(decode_chunk(&frame).is_err());
        assert!(decode_chunk(&frame[..8]).is_err());
    }

    #[test]
    fn test_offset_advances_by_sixteen() {
        let mut addr = WriteAddress::START;
        for i in 1..=15u8 {
            addr.advance().unwrap();
            assert_eq!(addr, WriteAddress::new(0, 0, i * 16));
        }
        assert_eq!(addr.offset, 240);

        addr.advance().unwrap();
        assert_eq!(addr, WriteAddress::new(0, 1, 0));
    }

    #[test]
    fn test_bank_rollover_at_last_page() {
        let mut addr = WriteAddress::START;
        // 16 chunks per page for pages 0..=254, then page 255 holds a single chunk
        for _ in 0..(255 * 16) {
            addr.advance().unwrap();
        }
        assert_eq!(addr, WriteAddress::new(0, 255, 0));

        addr.advance().unwrap();
        assert_eq!(addr, WriteAddress::new(1, 0, 0));
    }

    #[test]
    fn test_page_255_offset_240_rolls_page_first() {
        let addr = WriteAddress::new(0, 254, 240).next().unwrap();
        assert_eq!(addr, WriteAddress::new(0, 255, 0));
    }

    #[test]
    fn test_last_page_offset_240_carries_into_bank() {
        let addr = WriteAddress::new(3, 255, 240).next().unwrap();
        assert_eq!(addr, WriteAddress::new(4, 0, 0));
        assert!(matches!(
            WriteAddress::new(255, 255, 240).next(),
            Err(Error::AddressOverflow)
        ));
    }

    #[test]
    fn test_address_overflow() {
        assert!(matches!(
            WriteAddress::new(255, 255, 0).next(),
            Err(Error::AddressOverflow)
        ));
    }

    #[test]
    fn test_address_bytes() {
        let addr = WriteAddress::new(0, 0, 16);
        assert_eq!(addr.to_bytes(), [0x00, 0x00, 0x10, 0x00]);
        assert_eq!(addr.as_u32(), 0x0000_1000);
        assert_eq!(addr.to_string(), "0x00001000");
    }
}
