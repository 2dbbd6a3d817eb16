use i2c_bus::{Address, I2cBus};
use tracing::{info, instrument};

use crate::errors::SetupError;
use crate::info::{SensorKind, Settings, Setup, VocIndexFn};
use crate::input::Inputs;
use crate::merge::{merge, Merged};
use crate::sensor::Sensor;

/// Sensors that feed each other. A sensor's dependencies are looked up
/// among the sensors added before it, so add producers first.
#[derive(Default)]
pub struct SensorSet {
    sensors: Vec<Sensor>,
    voc_index: Option<VocIndexFn>,
}

impl std::fmt::Debug for SensorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSet")
            .field("sensors", &self.sensors)
            .finish_non_exhaustive()
    }
}

impl SensorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Algorithm used by every VOC sensor added after this.
    #[must_use]
    pub fn with_voc_index(mut self, algorithm: VocIndexFn) -> Self {
        self.voc_index = Some(algorithm);
        self
    }

    /// # Errors
    /// The device could not be opened, a required dependency is not in
    /// the set or a sensor by the same name already is.
    #[instrument(skip(self, bus, settings), fields(bus = bus.name()))]
    pub fn add(
        &mut self,
        kind: SensorKind,
        bus: &I2cBus,
        address: Option<Address>,
        settings: Settings,
    ) -> Result<&Sensor, SetupError> {
        let info = kind.info();
        let inputs = Inputs::resolve(
            info,
            self.sensors.iter().map(|sensor| (sensor.info(), sensor.stream())),
        )?;
        let setup = Setup {
            bus,
            address,
            settings,
            inputs,
            voc_index: self.voc_index.clone(),
        };
        let sensor = kind.create(setup)?;
        if self.get(sensor.name()).is_some() {
            return Err(SetupError::DuplicateName(sensor.name().to_owned()));
        }

        info!("added {}", sensor.name());
        let idx = self.sensors.len();
        self.sensors.push(sensor);
        Ok(&self.sensors[idx])
    }

    #[must_use]
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|sensor| sensor.name() == name)
    }

    /// Subscribes to every sensor, starting those that were not running.
    #[must_use]
    pub fn merged(&self) -> Merged {
        merge(self.sensors.iter().map(Sensor::subscribe))
    }

    /// Shuts the sensors down one by one, dependents before the sensors
    /// they depend on.
    pub async fn shutdown(self) {
        for sensor in self.sensors.into_iter().rev() {
            let name = sensor.name().to_owned();
            let state = sensor.shutdown().await;
            info!("{name} ended as {state:?}");
        }
    }
}
