//! CRC16 used to protect fast-flash-write chunks.
//!
//! This is a CCITT-style polynomial (0x1021, MSB first, no reflection, no final
//! XOR) with one quirk: the register is seeded with the polynomial itself rather
//! than 0x0000 or 0xFFFF. The device firmware checks against the same seed, so
//! the value must not be "corrected".

/// Generator polynomial, also used as the initial register value.
pub const CRC16_POLY: u16 = 0x1021;

/// Seed of the CRC register.
pub const CRC16_INIT: u16 = CRC16_POLY;

/// Feed one byte into a CRC register.
#[allow(clippy::cast_possible_truncation)]
pub fn crc16_update(mut crc: u16, byte: u8) -> u16 {
    let mut data = byte;
    for _ in 0..8 {
        let flag = data ^ (crc >> 8) as u8;
        crc <<= 1;
        if flag & 0x80 != 0 {
            crc ^= CRC16_POLY;
        }
        data <<= 1;
    }
    crc
}

/// Compute the chunk CRC16 over `data`.
///
/// Every call starts from a fresh register; chunks are never chained.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |crc, &b| crc16_update(crc, b))
}
