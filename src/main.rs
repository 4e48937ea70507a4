pub mod config;
pub mod engine;
pub mod mqtt;
pub mod telemetry;

use crate::config::Settings;
use crate::engine::RelayEngine;
use crate::telemetry::EventContext;
use color_eyre::Result;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = Settings::load_or_init()?;
    let (mut engine, mut status_rx) = RelayEngine::new(settings);

    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            info!(color = status.color(), "Telemetry link: {status}");
        }
    });

    if let Err(e) = engine.connect() {
        // Status already shows the config error; keep the feed running so a
        // restart after reconfiguration can pick things up.
        error!("Broker connection not started: {e}");
    }

    info!("Reading host telemetry feed from stdin (one JSON record per line)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => dispatch(&mut engine, &line),
                None => {
                    info!("Telemetry feed ended");
                    break;
                }
            }
        }
    }

    engine.disconnect().await;
    Ok(())
}

/// Routes one feed line to the matching engine hook. Malformed lines are
/// logged and dropped; the feed must never take the relay down.
///
/// The stdin feed carries no aggregated host state, so the event context's
/// `state` stays null and the engine publishes nothing on the state topic.
fn dispatch(engine: &mut RelayEngine, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let entry = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(entry)) => entry,
        Ok(_) => {
            warn!("Discarding non-object feed line");
            return;
        }
        Err(e) => {
            warn!("Discarding malformed feed line: {e}");
            return;
        }
    };

    let event = entry.get("event").and_then(Value::as_str).unwrap_or("");
    if event == "Status" {
        engine.on_status_snapshot(&entry);
    } else {
        let ctx = EventContext {
            system: entry
                .get("StarSystem")
                .and_then(Value::as_str)
                .map(str::to_string),
            station: entry
                .get("StationName")
                .and_then(Value::as_str)
                .map(str::to_string),
            state: Value::Null,
        };
        engine.on_event(&entry, &ctx);
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_accepts_env_style_directives() {
        EnvFilter::try_new("warn,telemetry_relay=debug").expect("directives parse");
        let fallback = EnvFilter::try_new("info").expect("level parses");
        assert_eq!(fallback.to_string(), "info");
    }
}
