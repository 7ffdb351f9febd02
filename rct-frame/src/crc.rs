//! CRC calculation for RCT frames

/// CRC calculation constants
const INITIAL_CRC: u16 = 0xFFFF;
const POLYNOMIAL: u16 = 0x1021;

/// Precomputed CRC table (MSB first)
static CRC_TABLE: once_cell::sync::Lazy<[u16; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [0u16; 256];
    for b in 0..=0xFFu16 {
        let mut v = b << 8;
        for _ in 0..8 {
            if (v & 0x8000) != 0 {
                v = (v << 1) ^ POLYNOMIAL;
            } else {
                v <<= 1;
            }
        }
        table[b as usize] = v;
    }
    table
});

/// CRC-CCITT accumulator for RCT frames
///
/// The device pads the checksummed byte stream to an even length before
/// finalizing, so the accumulator tracks the parity of the bytes folded in.
#[derive(Debug, Clone)]
pub struct Crc {
    crc_value: u16,
    odd: bool,
}

impl Crc {
    /// Create a new CRC calculator
    pub fn new() -> Self {
        Self {
            crc_value: INITIAL_CRC,
            odd: false,
        }
    }

    /// Reset the CRC value and parity to the initial state
    pub fn reset(&mut self) {
        self.crc_value = INITIAL_CRC;
        self.odd = false;
    }

    /// Fold one logical byte into the CRC
    pub fn update(&mut self, data: u8) {
        let index = ((self.crc_value >> 8) ^ data as u16) & 0xFF;
        self.crc_value = (self.crc_value << 8) ^ CRC_TABLE[index as usize];
        self.odd = !self.odd;
    }

    /// Fold multiple bytes into the CRC
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Finalize the CRC
    ///
    /// Folds in one zero byte first if an odd number of bytes has been
    /// processed since the last reset. Treat this as terminal for a frame.
    pub fn finish(&mut self) -> u16 {
        if self.odd {
            self.update(0);
        }
        self.crc_value
    }

    /// Get the current CRC value without padding
    pub fn value(&self) -> u16 {
        self.crc_value
    }
}

impl Default for Crc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-at-a-time reference: shift left, XOR the polynomial when the
    /// shifted-out bit disagrees with the input bit.
    fn reference(data: &[u8]) -> u16 {
        let mut crc = INITIAL_CRC;
        for &b in data {
            for i in 0..8 {
                let bit = (b >> (7 - i)) & 1 == 1;
                let c15 = (crc >> 15) & 1 == 1;
                crc <<= 1;
                if c15 != bit {
                    crc ^= POLYNOMIAL;
                }
            }
        }
        crc
    }

    #[test]
    fn test_crc_empty() {
        let mut calc = Crc::new();
        calc.reset();
        assert_eq!(calc.finish(), 0xFFFF);
    }

    #[test]
    fn test_crc_matches_bitwise_reference() {
        let data = [0x01u8, 0x04, 0x40, 0x0F, 0x01, 0x5B, 0x2B, 0x2D, 0xFF, 0x00];
        let mut calc = Crc::new();
        calc.update_bytes(&data);
        assert_eq!(calc.finish(), reference(&data));
    }

    #[test]
    fn test_crc_pads_odd_length() {
        let mut odd = Crc::new();
        odd.update_bytes(&[0x01, 0x02, 0x03]);

        let mut padded = Crc::new();
        padded.update_bytes(&[0x01, 0x02, 0x03, 0x00]);

        assert_ne!(odd.value(), padded.value());
        assert_eq!(odd.finish(), padded.finish());
    }

    #[test]
    fn test_crc_read_request_vector() {
        let mut calc = Crc::new();
        calc.update_bytes(&[0x01, 0x04, 0x40, 0x0F, 0x01, 0x5B]);
        assert_eq!(calc.finish(), 0x58B4);
    }

    #[test]
    fn test_crc_reset() {
        let mut calc = Crc::new();
        calc.update(0x01);
        calc.reset();
        assert_eq!(calc.value(), INITIAL_CRC);
        assert_eq!(calc.finish(), INITIAL_CRC);
    }
}
