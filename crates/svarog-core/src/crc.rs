//! Parity engine: CRC-8, CRC-16-CCITT and CRC-32 over arbitrary byte runs.
//!
//! Each block selects one variant at registration. All three are table-driven
//! and expose a resumable form so a caller can scan a payload once and
//! continue the accumulator into trailing bytes.
//!
//! Parameters:
//!
//! - CRC-8: polynomial `0x07`, init `0x00`, no reflection, no final XOR.
//! - CRC-16-CCITT: polynomial `0x1021`, init `0xFFFF`, no reflection, no
//!   final XOR.
//! - CRC-32: IEEE 802.3 polynomial, init `0xFFFFFFFF`, final inversion.

use serde::{Deserialize, Serialize};

/// Parity variant protecting a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrcKind {
    /// No parity word; the slot is stored bare.
    None,
    /// One-byte CRC-8.
    Crc8,
    /// Two-byte CRC-16-CCITT.
    Crc16,
    /// Four-byte CRC-32 (IEEE).
    Crc32,
}

impl CrcKind {
    /// Width of the stored parity word in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            CrcKind::None => 0,
            CrcKind::Crc8 => 1,
            CrcKind::Crc16 => 2,
            CrcKind::Crc32 => 4,
        }
    }

    /// Mask selecting the significant bits of a parity word of this width.
    #[must_use]
    pub(crate) const fn mask(self) -> u32 {
        match self {
            CrcKind::None => 0,
            CrcKind::Crc8 => 0xFF,
            CrcKind::Crc16 => 0xFFFF,
            CrcKind::Crc32 => 0xFFFF_FFFF,
        }
    }
}

const CRC8_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        #[allow(clippy::cast_possible_truncation)] // i is 0..256
        let mut crc = i as u8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const CRC16_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Initial CRC-8 accumulator value.
pub const CRC8_INIT: u8 = 0x00;
/// Initial CRC-16-CCITT accumulator value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// CRC-8 over `data`.
#[must_use]
pub fn crc8(data: &[u8]) -> u8 {
    crc8_with(CRC8_INIT, data)
}

/// CRC-8 resuming from a previous accumulator value.
#[must_use]
pub fn crc8_with(init: u8, data: &[u8]) -> u8 {
    let mut crc = init;
    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }
    crc
}

/// CRC-16-CCITT over `data`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    crc16_with(CRC16_INIT, data)
}

/// CRC-16-CCITT resuming from a previous accumulator value.
#[must_use]
pub fn crc16_with(init: u16, data: &[u8]) -> u16 {
    let mut crc = init;
    for &byte in data {
        let idx = ((crc >> 8) ^ u16::from(byte)) & 0xFF;
        crc = (crc << 8) ^ CRC16_TABLE[idx as usize];
    }
    crc
}

/// CRC-32 (IEEE 802.3) over `data`.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32_with(0, data)
}

/// CRC-32 resuming from a previously returned value.
///
/// Passing the result of an earlier [`crc32`] call as `init` continues the
/// computation as if the two byte runs had been one.
#[must_use]
pub fn crc32_with(init: u32, data: &[u8]) -> u32 {
    let mut crc = !init;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[idx];
    }
    !crc
}

/// Parity word for `data` under `kind`, widened to `u32`.
///
/// `CrcKind::None` yields 0.
#[must_use]
pub fn checksum(kind: CrcKind, data: &[u8]) -> u32 {
    match kind {
        CrcKind::None => 0,
        CrcKind::Crc8 => u32::from(crc8(data)),
        CrcKind::Crc16 => u32::from(crc16(data)),
        CrcKind::Crc32 => crc32(data),
    }
}

/// Resumes a [`checksum`] accumulator across a second byte run.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // prev is masked to the kind width
pub fn continue_checksum(kind: CrcKind, prev: u32, data: &[u8]) -> u32 {
    match kind {
        CrcKind::None => 0,
        CrcKind::Crc8 => u32::from(crc8_with(prev as u8, data)),
        CrcKind::Crc16 => u32::from(crc16_with(prev as u16, data)),
        CrcKind::Crc32 => crc32_with(prev, data),
    }
}

/// Encodes a parity word little-endian into `out` (`kind.width()` bytes).
pub fn encode_word(kind: CrcKind, value: u32, out: &mut [u8]) {
    let width = kind.width();
    debug_assert!(out.len() >= width);
    out[..width].copy_from_slice(&value.to_le_bytes()[..width]);
}

/// Decodes a little-endian parity word of `kind.width()` bytes.
#[must_use]
pub fn decode_word(kind: CrcKind, bytes: &[u8]) -> u32 {
    let width = kind.width();
    debug_assert!(bytes.len() >= width);
    let mut word = [0u8; 4];
    word[..width].copy_from_slice(&bytes[..width]);
    u32::from_le_bytes(word)
}
