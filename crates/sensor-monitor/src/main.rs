use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::{Result, Section};
use futures::StreamExt;
use i2c_bus::I2cBus;
use sensors::{SensorKind, SensorSet};
use strum::VariantArray;
use tracing::{info, warn};

mod config;

#[derive(Parser)]
#[command(name = "sensor monitor")]
#[command(version = "1.0")]
#[command(about = "reads environmental sensors on i2c buses and prints their measurements")]
struct Cli {
    /// RON file listing the sensors to read
    #[arg(short, long, required_unless_present = "list_kinds")]
    config: Option<PathBuf>,

    /// print the supported sensors and exit
    #[arg(long)]
    list_kinds: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if cli.list_kinds {
        list_kinds();
        return Ok(());
    }

    logger::tracing::setup();
    let path = cli
        .config
        .ok_or_else(|| eyre!("no config file given"))?;
    let set = build(&config::load(&path)?)?;

    let mut feed = set.merged();
    let res = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                info!("ctrl-c pressed, shutting down");
                break signal.wrap_err("Could not listen for ctrl-c");
            }
            next = feed.next() => match next {
                Some(Ok(measurement)) => println!("{measurement}"),
                Some(Err(fault)) => {
                    break Err(color_eyre::Report::new(fault)
                        .wrap_err("A sensor stopped working"));
                }
                None => {
                    warn!("every sensor stopped");
                    break Ok(());
                }
            }
        }
    };

    drop(feed);
    set.shutdown().await;
    res
}

fn build(config: &[config::SensorConfig]) -> Result<SensorSet> {
    let mut buses: HashMap<&Path, I2cBus> = HashMap::new();
    let mut set = SensorSet::new();

    for sensor in config {
        let bus = match buses.get(sensor.bus.as_path()) {
            Some(bus) => bus.clone(),
            None => {
                let bus = open_bus(&sensor.bus)?;
                buses.insert(sensor.bus.as_path(), bus.clone());
                bus
            }
        };

        let added = set
            .add(sensor.kind, &bus, sensor.address()?, sensor.settings()?)
            .wrap_err_with(|| format!("Could not set up {}", sensor.kind));
        let added = if sensor.kind == SensorKind::Sgp40 {
            added.suggestion("the VOC index algorithm is not built in, use the sensors library with one")?
        } else {
            added?
        };
        info!("monitoring {}", added.name());
    }
    Ok(set)
}

#[cfg(target_os = "linux")]
fn open_bus(path: &Path) -> Result<I2cBus> {
    I2cBus::open(path)
        .wrap_err("Could not open i2c bus")
        .suggestion("is the i2c-dev kernel module loaded?")
}

#[cfg(not(target_os = "linux"))]
fn open_bus(path: &Path) -> Result<I2cBus> {
    Err(eyre!("i2c buses are only supported on linux, can not open {}", path.display()))
}

fn list_kinds() {
    for kind in SensorKind::VARIANTS {
        let info = kind.info();
        println!("{kind}: {} {} ({})", info.manufacturer, info.name, info.uri);
        println!("    default address: {:#04x}", info.default_address);
        println!("    default interval: {:?}", info.default_interval);
        let measures: Vec<_> = info.measures.iter().map(ToString::to_string).collect();
        println!("    measures: {}", measures.join(", "));
        for dependency in info.dependencies {
            let need = if dependency.required { "needs" } else { "uses" };
            println!("    {need}: {}", dependency.measure);
        }
        for command in info.commands {
            println!("    command: {command} {:?}", command.parameters());
        }
    }
}
