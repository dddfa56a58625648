//! Runs one evaluation pass over a sensor described by a JSON file and
//! prints each emitted record as a line of JSON.
//!
//! ```text
//! cargo run --example run_pass -- sensor.json
//! ```

use std::env;
use std::fs;

use anyhow::{bail, Context};
use async_trait::async_trait;
use monitor_engine::probe::{Probe, ShellProbe};
use monitor_engine::{ConfigError, Sensor};

fn no_snmp(
    _ip: &str,
    _community: &str,
    _version: &str,
    _timeout: std::time::Duration,
    _retries: u32,
) -> Result<Box<dyn Probe>, ConfigError> {
    struct AbsentProbe;
    #[async_trait]
    impl Probe for AbsentProbe {
        async fn probe(&self, _argument: &str) -> Option<monitor_engine::Value> {
            None
        }
    }
    Ok(Box::new(AbsentProbe))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = match env::args().nth(1) {
        Some(p) => p,
        None => bail!("usage: run_pass <sensor.json>"),
    };
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", path))?;

    let sensor = Sensor::from_json(&json, Box::new(ShellProbe::default()), no_snmp)
        .map_err(|e| anyhow::anyhow!("rejecting sensor: {}", e))?;

    let mut records = Vec::new();
    sensor.run_pass(&mut records).await;
    for record in &records {
        println!("{}", record.to_line());
    }
    Ok(())
}
