//! The 8 bit CRC guarding every word Sensirion sensors put on the wire.
//!
//! Polynomial 0x31 (x⁸ + x⁵ + x⁴ + 1), initial value 0xFF, MSB first, no
//! reflection and no final XOR.

const POLYNOMIAL: u8 = 0x31;
const INIT: u8 = 0xFF;

#[must_use]
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = INIT;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Returns the big-endian word if the trailing checksum byte matches,
/// `None` if it does not.
#[must_use]
pub fn check_word(field: &[u8; 3]) -> Option<u16> {
    let [hi, lo, crc] = *field;
    (crc8(&[hi, lo]) == crc).then_some(u16::from_be_bytes([hi, lo]))
}

/// A word as it goes on the wire: two big-endian bytes then the checksum.
#[must_use]
pub fn word_with_crc(word: u16) -> [u8; 3] {
    let [hi, lo] = word.to_be_bytes();
    [hi, lo, crc8(&[hi, lo])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datasheet_vector() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn sgp40_default_compensation_words() {
        // 50 %RH and 25 °C, listed in the sgp40 datasheet
        assert_eq!(word_with_crc(0x8000), [0x80, 0x00, 0xA2]);
        assert_eq!(word_with_crc(0x6666), [0x66, 0x66, 0x93]);
    }

    #[test]
    fn stable_over_recomputation() {
        let inputs: [&[u8]; 4] = [&[], &[0x00], &[0xFF, 0xFF], &[1, 2, 3, 4, 5, 6, 7]];
        for input in inputs {
            assert_eq!(crc8(input), crc8(input));
        }
    }

    #[test]
    fn wrong_checksum_is_no_value() {
        for word in [0u16, 1, 0x1234, 0x8000, 0xFFFF] {
            let mut field = word_with_crc(word);
            assert_eq!(check_word(&field), Some(word));
            field[2] = field[2].wrapping_add(1);
            assert_eq!(check_word(&field), None);
        }
    }
}
