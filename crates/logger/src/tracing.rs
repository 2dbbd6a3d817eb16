use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;

use crate::Limiter;
use tracing_subscriber::filter;
use tracing_subscriber::fmt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use tracing_subscriber::{self, layer::SubscriberExt};

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_regex(true)
        .try_from_env()
        .unwrap_or_else(|_| {
            filter::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .parse_lossy("")
        })
}

/// Level set through `RUST_LOG` (default: info). Every output goes
/// through a [`Limiter`] so a failing sensor can not flood the log.
///
/// ### log every bus transfer of one sensor
/// `RUST_LOG='i2c_bus=trace,[poll{sensor=SCD4x.*}]=trace,info'`
///
/// for full docs see: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html
///
/// # Note
/// Under systemd this logs to the journal, otherwise to stderr. In the
/// journal CODE_FILE, CODE_LINE and TARGET are set for every event and
/// SPAN_NAME for events inside spans.
///
/// example: `journalctl -fu sensor-monitor
/// --output-fields=CODE_FILE,CODE_LINE,MESSAGE -o cat`
pub fn setup() {
    let fmt = fmt::layer()
        .pretty()
        .with_writer(std::io::stderr) // stdout carries the measurements
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let registry = tracing_subscriber::Registry::default().with(ErrorLayer::default());

    if !libsystemd::logging::connected_to_journal() {
        registry
            .with(fmt.with_filter(Limiter::default()).with_filter(env_filter()))
            .init();
        tracing::info!("Started logging & tracing to stderr");
        return;
    }

    match tracing_journald::layer() {
        Ok(journal) => {
            registry
                .with(journal.with_filter(Limiter::default()).with_filter(env_filter()))
                .init();
            tracing::info!("Started logging & tracing to journald");
        }
        Err(err) => {
            registry
                .with(fmt.with_filter(Limiter::default()).with_filter(env_filter()))
                .init();
            tracing::error!(
                "Could not connect to journald, logging to stderr instead: {err}"
            );
        }
    }
}

pub fn setup_for_tests() {
    use std::sync::Once;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = color_eyre::install();

        let fmt = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_ansi(true)
            .pretty()
            .with_filter(env_filter());
        let _ = tracing_subscriber::registry()
            .with(fmt)
            .with(ErrorLayer::default())
            .try_init();
    })
}
