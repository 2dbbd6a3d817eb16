//! Simulated chips answering like the real hardware does.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use i2c_bus::mock::Target;
use protocol::word_with_crc;

fn fill(buf: &mut [u8], response: &[u8]) {
    for (out, byte) in buf
        .iter_mut()
        .zip(response.iter().copied().chain(std::iter::repeat(0xFF)))
    {
        *out = byte;
    }
}

fn words(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| word_with_crc(*w)).collect()
}

fn code(data: &[u8]) -> Option<u16> {
    match data {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Lets a test keep a handle on a chip it attached to the bus.
#[derive(Default)]
pub struct Shared<S>(Arc<Mutex<S>>);

impl<S> Clone for Shared<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S> Shared<S> {
    pub fn new(state: S) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn state(&self) -> MutexGuard<'_, S> {
        self.0.lock().unwrap()
    }
}

pub struct Scd4x {
    pub measuring: bool,
    pub co2: u16,
    pub temperature: u16,
    pub humidity: u16,
    pub corrupt_humidity: bool,
    pub recalibration_response: u16,
    pub writes: Vec<Vec<u8>>,
    pub(crate) last: Option<u16>,
}

impl Default for Scd4x {
    fn default() -> Self {
        Self {
            measuring: false,
            co2: 600,
            // 25 °C
            temperature: 26214,
            // 50 %RH
            humidity: 32768,
            corrupt_humidity: false,
            recalibration_response: 0x8000,
            writes: Vec::new(),
            last: None,
        }
    }
}

impl Scd4x {
    pub fn commands(&self) -> Vec<u16> {
        self.writes.iter().filter_map(|w| code(w)).collect()
    }
}

impl Target for Shared<Scd4x> {
    fn on_write(&mut self, data: &[u8]) {
        let mut s = self.state();
        s.writes.push(data.to_vec());
        let code = code(data);
        match code {
            Some(0x21B1) => s.measuring = true,
            Some(0x3F86) => s.measuring = false,
            _ => (),
        }
        s.last = code;
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        let s = self.state();
        let response = match s.last {
            Some(0xE4B8) => words(&[if s.measuring { 0x8006 } else { 0x8000 }]),
            Some(0xEC05) => {
                let mut r = words(&[s.co2, s.temperature, s.humidity]);
                if s.corrupt_humidity {
                    r[8] ^= 0xFF;
                }
                r
            }
            Some(0x362F) => words(&[s.recalibration_response]),
            _ => Vec::new(),
        };
        fill(buf, &response);
    }
}

pub struct Sht4x {
    pub temperature: u16,
    pub humidity: u16,
    pub writes: Vec<Vec<u8>>,
}

impl Default for Sht4x {
    fn default() -> Self {
        Self {
            // 25 °C
            temperature: 26214,
            // 40 %RH
            humidity: 24117,
            writes: Vec::new(),
        }
    }
}

impl Target for Shared<Sht4x> {
    fn on_write(&mut self, data: &[u8]) {
        self.state().writes.push(data.to_vec());
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        let s = self.state();
        fill(buf, &words(&[s.temperature, s.humidity]));
    }
}

/// Calibration from the worked example in the datasheet, little-endian
const BMP280_CALIBRATION: [u16; 12] = [
    27504,
    26435,
    -1000i16 as u16,
    36477,
    -10685i16 as u16,
    3024,
    2855,
    140,
    -7i16 as u16,
    15500,
    -14600i16 as u16,
    6000,
];

pub struct Bmp280 {
    pub chip_id: u8,
    /// Pressure then temperature, 20 bit each, as in the data registers
    pub data: [u8; 6],
    pub writes: Vec<Vec<u8>>,
    pub(crate) pointer: u8,
}

impl Default for Bmp280 {
    fn default() -> Self {
        Self {
            chip_id: 0x58,
            // adc_P 415148, adc_T 519888: 100653.27 Pa at 25.08 °C
            data: [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00],
            writes: Vec::new(),
            pointer: 0,
        }
    }
}

impl Target for Shared<Bmp280> {
    fn on_write(&mut self, data: &[u8]) {
        let mut s = self.state();
        s.writes.push(data.to_vec());
        if let Some(register) = data.first() {
            s.pointer = *register;
        }
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        let s = self.state();
        let response: Vec<u8> = match s.pointer {
            0xD0 => vec![s.chip_id],
            0x88 => BMP280_CALIBRATION
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            0xF7 => s.data.to_vec(),
            _ => Vec::new(),
        };
        fill(buf, &response);
    }
}

pub struct Sgp40 {
    pub raw: u16,
    pub self_test: u16,
    pub heating: bool,
    pub writes: Vec<Vec<u8>>,
    pub(crate) last: Option<u16>,
}

impl Default for Sgp40 {
    fn default() -> Self {
        Self {
            raw: 31000,
            self_test: 0xD400,
            heating: false,
            writes: Vec::new(),
            last: None,
        }
    }
}

impl Target for Shared<Sgp40> {
    fn on_write(&mut self, data: &[u8]) {
        let mut s = self.state();
        s.writes.push(data.to_vec());
        let code = code(data);
        match code {
            Some(0x260F) => s.heating = true,
            Some(0x3615) => s.heating = false,
            _ => (),
        }
        s.last = code;
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        let s = self.state();
        let response = match s.last {
            Some(0x260F) => words(&[s.raw]),
            Some(0x280E) => words(&[s.self_test]),
            _ => Vec::new(),
        };
        fill(buf, &response);
    }
}

pub struct Sps30 {
    pub measuring: bool,
    /// Mass PM1.0 to PM10, number PM0.5 to PM10, typical size
    pub values: [f32; 10],
    pub writes: Vec<Vec<u8>>,
    pub(crate) last: Option<u16>,
}

impl Default for Sps30 {
    fn default() -> Self {
        Self {
            measuring: false,
            values: [1.0, 2.5, 4.0, 10.0, 0.5, 1.0, 2.5, 4.0, 10.0, 0.6],
            writes: Vec::new(),
            last: None,
        }
    }
}

impl Target for Shared<Sps30> {
    fn on_write(&mut self, data: &[u8]) {
        let mut s = self.state();
        s.writes.push(data.to_vec());
        let code = code(data);
        match code {
            Some(0x0010) => s.measuring = true,
            Some(0x0104) => s.measuring = false,
            _ => (),
        }
        s.last = code;
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        let s = self.state();
        let response = match s.last {
            Some(0x0202) => words(&[u16::from(s.measuring)]),
            Some(0x0300) => {
                let halves: Vec<u16> = s
                    .values
                    .iter()
                    .flat_map(|v| {
                        let bits = v.to_bits();
                        [(bits >> 16) as u16, bits as u16]
                    })
                    .collect();
                words(&halves)
            }
            _ => Vec::new(),
        };
        fill(buf, &response);
    }
}
