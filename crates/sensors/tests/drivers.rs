use i2c_bus::mock::{Fault, MockBus};
use i2c_bus::{Address, I2cBus, I2cDevice};
use protocol::{Measure, ParticleSize};
use sensors::drivers::{Bmp280, Precision, Scd4x, Sgp40, Sht4x, Sps30};
use sensors::{Command, CommandOutput, Driver, Error, Input};

mod common;
use common::Shared;

fn device<S>(address: u8, sim: &Shared<S>) -> (MockBus, I2cDevice)
where
    Shared<S>: i2c_bus::mock::Target + 'static,
{
    let mock = MockBus::new();
    mock.attach(u16::from(address), sim.clone());
    let bus = I2cBus::new(mock.clone());
    let device = bus
        .open_device(Address::seven_bit(address).unwrap())
        .unwrap();
    (mock, device)
}

fn no_pressure() -> Input {
    Input::unavailable(Measure::BarometricPressure)
}

#[tokio::test(start_paused = true)]
async fn scd4x_drops_field_failing_checksum() {
    let sim = Shared::new(common::Scd4x {
        corrupt_humidity: true,
        ..Default::default()
    });
    let (_mock, device) = device(0x62, &sim);
    let mut scd = Scd4x::new(device, no_pressure());

    scd.start().await.unwrap();
    let reading = scd.read_measurement().await.unwrap();
    assert_eq!(reading.co2, Some(600.));
    assert!((reading.temperature.unwrap() - 25.).abs() < 0.01);
    assert_eq!(reading.humidity, None);

    let measures: Vec<_> = scd
        .try_measure()
        .await
        .unwrap()
        .iter()
        .map(|m| m.measure())
        .collect();
    assert_eq!(measures, [Measure::Co2, Measure::Temperature]);
}

#[tokio::test(start_paused = true)]
async fn scd4x_not_ready_gives_nothing() {
    let sim = Shared::new(common::Scd4x::default());
    let (mock, device) = device(0x62, &sim);
    let mut scd = Scd4x::new(device, no_pressure());

    // the sim only has data while measuring
    assert!(!scd.data_ready().await.unwrap());
    scd.start_periodic_measurement().await.unwrap();
    mock.clear_log();
    assert!(scd.data_ready().await.unwrap());
    assert_eq!(mock.transfers().len(), 2, "write then read");
}

#[tokio::test(start_paused = true)]
async fn scd4x_pressure_only_while_measuring() {
    let sim = Shared::new(common::Scd4x::default());
    let (mock, device) = device(0x62, &sim);
    let mut scd = Scd4x::new(device, no_pressure());

    let err = scd.set_ambient_pressure(101_325.).await.unwrap_err();
    assert!(matches!(err, Error::WrongState(_)));
    assert!(mock.transfers().is_empty());

    scd.start_periodic_measurement().await.unwrap();
    scd.set_ambient_pressure(101_325.).await.unwrap();
    let last = sim.state().writes.last().cloned().unwrap();
    assert_eq!(last, [0xE0, 0x00, 0x03, 0xF5, protocol::crc8(&[0x03, 0xF5])]);
}

#[tokio::test(start_paused = true)]
async fn scd4x_recalibration_restarts_measuring() {
    let sim = Shared::new(common::Scd4x {
        recalibration_response: 0x8000 + 12,
        ..Default::default()
    });
    let (_mock, device) = device(0x62, &sim);
    let mut scd = Scd4x::new(device, no_pressure());
    scd.start().await.unwrap();

    let output = scd
        .affect(Command::ForcedRecalibration { target_ppm: 420 })
        .await
        .unwrap();
    assert_eq!(output, CommandOutput::Correction { ppm: 12 });

    let commands = sim.state().commands();
    assert_eq!(
        commands[commands.len() - 3..],
        [0x3F86, 0x362F, 0x21B1],
        "stop, recalibrate, restart"
    );
    assert!(sim.state().measuring);
}

#[tokio::test(start_paused = true)]
async fn scd4x_failed_recalibration() {
    let sim = Shared::new(common::Scd4x {
        recalibration_response: 0xFFFF,
        ..Default::default()
    });
    let (_mock, device) = device(0x62, &sim);
    let mut scd = Scd4x::new(device, no_pressure());
    scd.start().await.unwrap();

    let err = scd
        .affect(Command::ForcedRecalibration { target_ppm: 420 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RecalibrationFailed));
    assert!(!err.is_fatal());
    assert!(sim.state().measuring);
}

#[tokio::test(start_paused = true)]
async fn scd4x_negative_temperature_offset_is_refused() {
    let sim = Shared::new(common::Scd4x::default());
    let (_mock, device) = device(0x62, &sim);
    let mut scd = Scd4x::new(device, no_pressure());
    scd.start().await.unwrap();
    let before = sim.state().writes.len();

    let err = scd
        .affect(Command::SetTemperatureOffset { celsius: -2.0 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
    assert!(!err.is_fatal());
    assert_eq!(sim.state().writes.len(), before, "measuring was not interrupted");
    assert!(sim.state().measuring);

    let output = scd
        .affect(Command::SetTemperatureOffset { celsius: 4.0 })
        .await
        .unwrap();
    assert_eq!(output, CommandOutput::Done);
    let [hi, lo] = 1497u16.to_be_bytes();
    assert!(sim
        .state()
        .writes
        .contains(&vec![0x24, 0x1D, hi, lo, protocol::crc8(&[hi, lo])]));
}

#[tokio::test(start_paused = true)]
async fn sht4x_precision_picks_command() {
    let sim = Shared::new(common::Sht4x::default());
    let (_mock, device) = device(0x44, &sim);
    let mut sht = Sht4x::new(device, Precision::Low);

    let (temperature, humidity) = sht.measure().await.unwrap();
    assert_eq!(sim.state().writes, [vec![0xE0]]);
    assert!((temperature.unwrap() - 25.).abs() < 0.01);
    assert!((humidity.unwrap() - 40.).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn sht4x_humidity_is_clamped() {
    let sim = Shared::new(common::Sht4x {
        humidity: u16::MAX,
        ..Default::default()
    });
    let (_mock, device) = device(0x44, &sim);
    let mut sht = Sht4x::new(device, Precision::High);

    let (_, humidity) = sht.measure().await.unwrap();
    assert_eq!(humidity, Some(100.));
}

#[tokio::test(start_paused = true)]
async fn bmp280_rejects_other_chips() {
    let sim = Shared::new(common::Bmp280 {
        chip_id: 0x60,
        ..Default::default()
    });
    let (_mock, device) = device(0x76, &sim);
    let mut bmp = Bmp280::new(device);

    let err = bmp.start().await.unwrap_err();
    assert!(matches!(
        err,
        Error::WrongChip {
            expected: 0x58,
            found: 0x60
        }
    ));
    assert!(err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn bmp280_forced_measurement() {
    let sim = Shared::new(common::Bmp280::default());
    let (_mock, device) = device(0x76, &sim);
    let mut bmp = Bmp280::new(device);
    bmp.start().await.unwrap();

    let measurements = bmp.try_measure().await.unwrap();
    assert_eq!(measurements[0].measure(), Measure::BarometricPressure);
    assert!((measurements[0].value() - 100_653.27).abs() < 1.);
    assert_eq!(measurements[1].measure(), Measure::Temperature);
    assert!((measurements[1].value() - 25.08).abs() < 0.01);
    assert!(sim.state().writes.contains(&vec![0xF4, 0b010_101_01]));

    bmp.stop().await.unwrap();
    assert_eq!(sim.state().writes.last().unwrap(), &[0xF4, 0x00]);
}

#[tokio::test(start_paused = true)]
async fn sgp40_turns_heater_off() {
    let sim = Shared::new(common::Sgp40::default());
    let (_mock, device) = device(0x59, &sim);
    let humidity = Input::unavailable(Measure::Humidity);
    let temperature = Input::unavailable(Measure::Temperature);
    let mut sgp = Sgp40::new(
        device,
        humidity,
        temperature,
        std::sync::Arc::new(|raw: u16, _: Option<f32>, _: Option<f32>| {
            f32::from(raw) / 1000.
        }),
    );

    let measurements = sgp.try_measure().await.unwrap();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0].measure(), Measure::Voc);
    assert_eq!(measurements[0].value(), 31.);
    // no compensation data, defaults are sent
    assert_eq!(
        sim.state().writes[0],
        [0x26, 0x0F, 0x80, 0x00, 0xA2, 0x66, 0x66, 0x93]
    );
    assert!(sim.state().heating);

    sgp.stop().await.unwrap();
    assert!(!sim.state().heating);
}

#[tokio::test(start_paused = true)]
async fn sgp40_self_test() {
    let sim = Shared::new(common::Sgp40::default());
    let (_mock, device) = device(0x59, &sim);
    let mut sgp = Sgp40::new(
        device,
        Input::unavailable(Measure::Humidity),
        Input::unavailable(Measure::Temperature),
        std::sync::Arc::new(|_: u16, _: Option<f32>, _: Option<f32>| 0.),
    );

    assert_eq!(
        sgp.affect(Command::SelfTest).await.unwrap(),
        CommandOutput::Done
    );
    sim.state().self_test = 0x4B00;
    let err = sgp.affect(Command::SelfTest).await.unwrap_err();
    assert!(matches!(err, Error::SelfTest(0x4B00)));
}

#[tokio::test(start_paused = true)]
async fn sps30_reports_all_concentrations() {
    let sim = Shared::new(common::Sps30::default());
    let (_mock, device) = device(0x69, &sim);
    let mut sps = Sps30::new(device);

    assert!(sps.try_measure().await.unwrap().is_empty(), "not started");
    sps.start().await.unwrap();
    let measurements = sps.try_measure().await.unwrap();
    assert_eq!(measurements.len(), 9);
    assert_eq!(
        measurements[1].measure(),
        Measure::ParticulateMass(ParticleSize::Pm2_5)
    );
    assert_eq!(measurements[1].value(), 2.5);
    assert_eq!(
        measurements[4].measure(),
        Measure::ParticulateNumber(ParticleSize::Pm0_5)
    );

    sps.stop().await.unwrap();
    assert!(!sim.state().measuring);
}

#[tokio::test(start_paused = true)]
async fn bus_failure_is_fatal() {
    let sim = Shared::new(common::Sht4x::default());
    let (mock, device) = device(0x44, &sim);
    let mut sht = Sht4x::new(device, Precision::High);

    mock.fail_next(0x44, Fault::Io(121));
    let err = sht.try_measure().await.unwrap_err();
    assert!(matches!(err, Error::Bus(_)));
    assert!(err.is_fatal());
}
