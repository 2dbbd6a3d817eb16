//! Framing shared by the Sensirion sensors: 16 bit big-endian commands,
//! every data word followed by its CRC.

use std::num::NonZeroU32;
use std::time::Duration;

use logger::RateLimited;
use protocol::{check_word, word_with_crc};

pub(crate) fn command(code: u16) -> [u8; 2] {
    code.to_be_bytes()
}

pub(crate) fn command_with_arg(code: u16, arg: u16) -> [u8; 5] {
    let [c0, c1] = code.to_be_bytes();
    let [a0, a1, crc] = word_with_crc(arg);
    [c0, c1, a0, a1, crc]
}

/// Words in a response, `None` for those that failed their checksum.
pub(crate) fn words(response: &[u8]) -> impl Iterator<Item = Option<u16>> + '_ {
    response
        .chunks_exact(3)
        .map(|chunk| check_word(&[chunk[0], chunk[1], chunk[2]]))
}

/// Checksum failures drop the affected value, the sensor keeps running.
/// A flaky cable produces a lot of them, so warnings are rate limited.
pub(crate) struct ChecksumLog {
    limiter: RateLimited,
}

impl ChecksumLog {
    pub(crate) fn new() -> Self {
        Self {
            limiter: RateLimited::new(Duration::from_secs(60), NonZeroU32::MIN),
        }
    }

    pub(crate) fn failed(&mut self, sensor: &str, field: &str) {
        logger::warn!(self.limiter; "{sensor}: checksum mismatch on {field}, value dropped");
    }
}
