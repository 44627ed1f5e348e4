//! Sensor serial number decoding.
//!
//! The sensor identifier is 6 raw bytes. The printed serial is ten
//! symbols from a 32-character alphabet, each symbol a 5-bit quintet.
//! Quintets straddle byte boundaries in a fixed pattern:
//!
//! ```text
//! digit  source bits
//!   1    b5[7:3]
//!   2    b5[2:0] b4[7:6]
//!   3    b4[5:1]
//!   4    b4[0]   b3[7:4]
//!   5    b3[3:0] b2[7]
//!   6    b2[6:2]
//!   7    b2[1:0] b1[7:5]
//!   8    b1[4:0]
//!   9    b0[7:3]
//!  10    b0[2:0] 00
//! ```
//!
//! All 48 input bits land in exactly one quintet, so distinct IDs
//! always give distinct serials.

use core::fmt;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::config::SERIAL_LEN;

/// Symbol alphabet (no B, I, O or S).
pub const SERIAL_ALPHABET: &[u8; 32] = b"0123456789ACDEFGHJKLMNPQRTUVWXYZ";

/// Number of symbols in a decoded serial.
pub const SERIAL_DIGITS: usize = 10;

/// Decoded sensor serial number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String<SERIAL_DIGITS>);

impl SerialNumber {
    /// Decode the raw 6-byte identifier.
    pub fn decode(raw: &[u8; SERIAL_LEN]) -> Self {
        let mut s = String::new();
        for q in quintets(raw) {
            // Alphabet is ASCII and the output fits exactly.
            let _ = s.push(SERIAL_ALPHABET[usize::from(q)] as char);
        }
        SerialNumber(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Printed form with the leading sensor-family digit, as shown on
    /// reader apps (`0` + ten symbols).
    pub fn with_family_prefix(&self) -> String<{ SERIAL_DIGITS + 1 }> {
        let mut s = String::new();
        let _ = s.push('0');
        let _ = s.push_str(self.as_str());
        s
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SerialNumber {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// Split the identifier into its ten quintets, most significant first.
fn quintets(b: &[u8; SERIAL_LEN]) -> [u8; SERIAL_DIGITS] {
    [
        (b[5] & 0xF8) >> 3,
        ((b[5] & 0x07) << 2) | ((b[4] & 0xC0) >> 6),
        (b[4] & 0x3E) >> 1,
        ((b[4] & 0x01) << 4) | ((b[3] & 0xF0) >> 4),
        ((b[3] & 0x0F) << 1) | ((b[2] & 0x80) >> 7),
        (b[2] & 0x7C) >> 2,
        ((b[2] & 0x03) << 3) | ((b[1] & 0xE0) >> 5),
        b[1] & 0x1F,
        (b[0] & 0xF8) >> 3,
        (b[0] & 0x07) << 2,
    ]
}
