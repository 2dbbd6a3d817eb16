use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::{Result, Section};
use i2c_bus::Address;
use sensors::drivers::Precision;
use sensors::{SensorKind, Settings};
use serde::Deserialize;

/// One entry in the config file:
/// ```ron
/// (kind: Scd4x, bus: "/dev/i2c-1", address: Some(0x62), interval_secs: None)
/// ```
#[derive(Debug, Deserialize)]
pub struct SensorConfig {
    pub kind: SensorKind,
    pub bus: PathBuf,
    #[serde(default)]
    pub address: Option<u16>,
    #[serde(default)]
    pub interval_secs: Option<f32>,
    #[serde(default)]
    pub precision: Precision,
}

impl SensorConfig {
    pub fn address(&self) -> Result<Option<Address>> {
        self.address
            .map(Address::try_from)
            .transpose()
            .wrap_err_with(|| format!("Invalid address for {}", self.kind))
    }

    pub fn settings(&self) -> Result<Settings> {
        let interval = match self.interval_secs {
            None => None,
            Some(secs) if secs > 0. && secs.is_finite() => Some(Duration::from_secs_f32(secs)),
            Some(secs) => bail!("interval for {} must be positive, got {secs}", self.kind),
        };
        Ok(Settings {
            interval,
            precision: self.precision,
        })
    }
}

pub fn load(path: &Path) -> Result<Vec<SensorConfig>> {
    let text = std::fs::read_to_string(path)
        .wrap_err("Could not read config file")
        .with_note(|| format!("path: {}", path.display()))?;
    let sensors: Vec<SensorConfig> = ron::from_str(&text)
        .wrap_err("Could not parse config file")
        .with_note(|| format!("path: {}", path.display()))?;
    if sensors.is_empty() {
        bail!("config lists no sensors");
    }
    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_example() {
        let text = r#"[
            (kind: Bmp280, bus: "/dev/i2c-1"),
            (kind: Scd4x, bus: "/dev/i2c-1", address: Some(0x62), interval_secs: Some(10.0)),
            (kind: Sht4x, bus: "/dev/i2c-2", precision: Low),
        ]"#;
        let sensors: Vec<SensorConfig> = ron::from_str(text).unwrap();
        assert_eq!(sensors.len(), 3);
        assert_eq!(sensors[1].kind, SensorKind::Scd4x);
        assert_eq!(
            sensors[1].address().unwrap(),
            Some(Address::SevenBit(0x62))
        );
        assert_eq!(
            sensors[1].settings().unwrap().interval,
            Some(Duration::from_secs(10))
        );
        assert_eq!(sensors[2].settings().unwrap().precision, Precision::Low);
        assert_eq!(sensors[0].settings().unwrap(), Settings::default());
    }

    #[test]
    fn rejects_zero_interval() {
        let sensors: Vec<SensorConfig> =
            ron::from_str(r#"[(kind: Sht4x, bus: "/dev/i2c-1", interval_secs: Some(0.0))]"#)
                .unwrap();
        assert!(sensors[0].settings().is_err());
    }
}
