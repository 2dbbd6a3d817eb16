use std::sync::{Arc, Mutex};
use std::time::Duration;

use i2c_bus::mock::{Fault, MockBus};
use i2c_bus::I2cBus;
use protocol::{crc8, Measure, SensorDependency};
use sensors::{
    Inputs, MeasurementStream, SensorInfo, SensorKind, SensorSet, Settings, SetupError,
    StreamState, VocIndexFn,
};

mod common;
use common::Shared;

#[tokio::test(start_paused = true)]
async fn barometer_compensates_co2_sensor() {
    let mock = MockBus::new();
    let scd = Shared::new(common::Scd4x::default());
    mock.attach(0x62, scd.clone());
    mock.attach(0x76, Shared::new(common::Bmp280::default()));
    let bus = I2cBus::new(mock.clone());

    let mut set = SensorSet::new();
    set.add(SensorKind::Bmp280, &bus, None, Settings::default())
        .unwrap();
    set.add(SensorKind::Scd4x, &bus, None, Settings::default())
        .unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(mock.transfers().is_empty(), "wiring touches no hardware");

    let mut co2 = set.sensors()[1].subscribe();
    co2.recv().await.unwrap().unwrap();
    assert!(matches!(
        set.sensors()[0].stream().state(),
        StreamState::Running
    ));

    // the barometer reads 100653.27 Pa, sent as whole hPa
    let hpa: u16 = 1006;
    let [hi, lo] = hpa.to_be_bytes();
    let expected = vec![0xE0, 0x00, hi, lo, crc8(&[hi, lo])];
    assert!(scd.state().writes.contains(&expected));

    set.shutdown().await;
    assert_eq!(mock.open_handles(0x62), 0);
    assert_eq!(mock.open_handles(0x76), 0);
}

#[tokio::test(start_paused = true)]
async fn pressure_is_sent_once_per_new_value() {
    let mock = MockBus::new();
    let scd = Shared::new(common::Scd4x::default());
    mock.attach(0x62, scd.clone());
    mock.attach(0x76, Shared::new(common::Bmp280::default()));
    let bus = I2cBus::new(mock.clone());

    let mut set = SensorSet::new();
    // barometer samples less often than the CO₂ sensor
    let slow = Settings {
        interval: Some(Duration::from_secs(60)),
        ..Settings::default()
    };
    set.add(SensorKind::Bmp280, &bus, None, slow).unwrap();
    set.add(SensorKind::Scd4x, &bus, None, Settings::default())
        .unwrap();

    let mut co2 = set.sensors()[1].subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(55);
    while tokio::time::Instant::now() < deadline {
        co2.recv().await.unwrap().unwrap();
    }

    let pressure_writes = scd
        .state()
        .commands()
        .iter()
        .filter(|c| **c == 0xE000)
        .count();
    assert_eq!(pressure_writes, 0, "no pressure value yet");

    tokio::time::sleep(Duration::from_secs(20)).await;
    let pressure_writes = scd
        .state()
        .commands()
        .iter()
        .filter(|c| **c == 0xE000)
        .count();
    assert_eq!(pressure_writes, 1);
}

#[tokio::test(start_paused = true)]
async fn last_pressure_of_a_failed_barometer_is_still_used() {
    let mock = MockBus::new();
    let scd = Shared::new(common::Scd4x::default());
    mock.attach(0x62, scd.clone());
    mock.attach(0x76, Shared::new(common::Bmp280::default()));
    let bus = I2cBus::new(mock.clone());

    let mut set = SensorSet::new();
    set.add(SensorKind::Bmp280, &bus, None, Settings::default())
        .unwrap();
    set.add(SensorKind::Scd4x, &bus, None, Settings::default())
        .unwrap();

    let mut co2 = set.sensors()[1].subscribe();
    let mut barometer = set.sensors()[0].subscribe();
    loop {
        let m = barometer.recv().await.unwrap().unwrap();
        if m.measure() == Measure::BarometricPressure {
            break;
        }
    }

    // the barometer dies before the CO₂ sensor takes its first sample
    mock.fail_next(0x76, Fault::Io(121));
    while let Some(Ok(_)) = barometer.recv().await {}
    assert!(matches!(
        set.sensors()[0].stream().state(),
        StreamState::Faulted(_)
    ));

    loop {
        let m = co2.recv().await.unwrap().unwrap();
        if m.measure() == Measure::Co2 {
            break;
        }
    }
    let pressure_writes: Vec<_> = scd
        .state()
        .writes
        .iter()
        .filter(|w| w.starts_with(&[0xE0, 0x00]))
        .cloned()
        .collect();
    let [hi, lo] = 1006u16.to_be_bytes();
    assert_eq!(pressure_writes, [vec![0xE0, 0x00, hi, lo, crc8(&[hi, lo])]]);
}

#[tokio::test(start_paused = true)]
async fn voc_sensor_uses_latest_humidity_and_temperature() {
    let mock = MockBus::new();
    mock.attach(0x44, Shared::new(common::Sht4x::default()));
    mock.attach(0x59, Shared::new(common::Sgp40::default()));
    let bus = I2cBus::new(mock.clone());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let algorithm: VocIndexFn = Arc::new(move |raw: u16, humidity: Option<f32>, temperature: Option<f32>| {
        recorded.lock().unwrap().push((raw, humidity, temperature));
        100.
    });

    let mut set = SensorSet::new().with_voc_index(algorithm);
    set.add(SensorKind::Sht4x, &bus, None, Settings::default())
        .unwrap();
    set.add(SensorKind::Sgp40, &bus, None, Settings::default())
        .unwrap();

    let mut voc = set.sensors()[1].subscribe();
    for _ in 0..5 {
        let index = voc.recv().await.unwrap().unwrap();
        assert_eq!(index.measure(), Measure::Voc);
        assert_eq!(index.value(), 100.);
    }

    let calls = calls.lock().unwrap();
    let (raw, humidity, temperature) = *calls.last().unwrap();
    assert_eq!(raw, 31000);
    assert!((humidity.unwrap() - 40.).abs() < 0.01);
    assert!((temperature.unwrap() - 25.).abs() < 0.01);
}

#[tokio::test]
async fn voc_sensor_needs_an_algorithm() {
    let mock = MockBus::new();
    mock.attach(0x59, Shared::new(common::Sgp40::default()));
    let bus = I2cBus::new(mock.clone());

    let mut set = SensorSet::new();
    let err = set
        .add(SensorKind::Sgp40, &bus, None, Settings::default())
        .unwrap_err();
    assert!(matches!(err, SetupError::MissingVocAlgorithm(_)));
    assert_eq!(mock.open_handles(0x59), 0);
}

static NEEDS_PRESSURE: SensorInfo = SensorInfo {
    kind: SensorKind::Scd4x,
    manufacturer: "test",
    name: "needs pressure",
    uri: "",
    default_address: 0x10,
    default_interval: Duration::from_secs(1),
    measures: &[Measure::Co2],
    dependencies: &[SensorDependency::required(Measure::BarometricPressure)],
    commands: &[],
};

#[test]
fn required_dependency_must_be_present() {
    let err = Inputs::resolve(
        &NEEDS_PRESSURE,
        std::iter::empty::<(&SensorInfo, &MeasurementStream)>(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SetupError::MissingDependency {
            measure: Measure::BarometricPressure,
            ..
        }
    ));
}

#[test]
fn optional_dependency_may_be_missing() {
    let mut inputs = Inputs::resolve(
        SensorKind::Scd4x.info(),
        std::iter::empty::<(&SensorInfo, &MeasurementStream)>(),
    )
    .unwrap();
    let pressure = inputs.take(Measure::BarometricPressure);
    assert!(!pressure.is_available());
    assert!(pressure.latest().is_none());
}
