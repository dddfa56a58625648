//! A sensor: its SNMP session, its ordered monitors, and the one-pass
//! evaluation engine — `rb_sensor.c` / `rb_sensor_monitor.c` in the
//! original.

use std::net::ToSocketAddrs;
use std::time::Duration;

use serde_json::{Map, Value as Json};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error};

use crate::emit::{emit, Record};
use crate::error::{ConfigError, ProbeError};
use crate::monitor::{Monitor, MonitorKind};
use crate::probe::{LiveSnmpSession, Probe, SnmpGetProbe, SnmpParams, SnmpVersion};
use crate::resolver;
use crate::value::Value;

/// Builds a production `SnmpGetProbe` over a live `snmp::SyncSession`,
/// suitable as the `snmp_factory` argument to `Sensor::from_json` outside
/// of tests.
pub fn live_snmp_factory(
    ip: &str,
    community: &str,
    version: &str,
    timeout: Duration,
    retries: u32,
) -> Result<Box<dyn Probe>, ConfigError> {
    let peer = ip
        .to_socket_addrs()
        .map_err(|_| ConfigError::BadPeerAddress(ip.to_owned()))?
        .next()
        .ok_or_else(|| ConfigError::BadPeerAddress(ip.to_owned()))?;
    let version = SnmpVersion::parse(version).ok_or_else(|| ConfigError::BadSnmpVersion(version.to_owned()))?;
    let params = SnmpParams {
        peer,
        community: community.to_owned(),
        version,
        timeout,
        retries,
    };
    let session = LiveSnmpSession::connect(&params).map_err(ConfigError::BadPeerAddress)?;
    Ok(Box::new(SnmpGetProbe::new(session)))
}

/// One configured sensor: an optional SNMP probe, its monitors in
/// declaration order, and the precomputed dependency table from
/// `resolver::resolve`.
pub struct Sensor {
    pub name: String,
    pub id: Option<i64>,
    monitors: Vec<Monitor>,
    dependencies: Vec<Option<Vec<usize>>>,
    shell: Box<dyn Probe>,
    snmp: Option<Box<dyn Probe>>,
    /// Serializes passes on this sensor; also guards the (conceptually
    /// single-session) SNMP probe, which is used one GET at a time.
    lock: AsyncMutex<()>,
}

impl Sensor {
    /// Build a `Sensor` from its JSON description, resolving monitors and
    /// their dependency order but not yet probing anything.
    ///
    /// `sensor_name`, `sensor_ip`, `community`, and `monitors` are
    /// required keys (§4.D resolves the tension between `spec.md` §6's
    /// stated `sensor_ip` default and §8 scenario 6 / the original's
    /// invalid-sensor test in favor of "required").
    pub fn from_json(
        v: &Json,
        shell: Box<dyn Probe>,
        snmp_factory: impl FnOnce(&str, &str, &str, Duration, u32) -> Result<Box<dyn Probe>, ConfigError>,
    ) -> Result<Self, ConfigError> {
        let obj = v.as_object().ok_or(ConfigError::WrongType {
            field: "sensor",
            expected: "object",
        })?;

        let name = obj
            .get("sensor_name")
            .and_then(Json::as_str)
            .ok_or(ConfigError::MissingSensorField("sensor_name"))?
            .to_owned();
        let ip = obj
            .get("sensor_ip")
            .and_then(Json::as_str)
            .ok_or(ConfigError::MissingSensorField("sensor_ip"))?;
        let community = obj
            .get("community")
            .and_then(Json::as_str)
            .ok_or(ConfigError::MissingSensorField("community"))?;

        let id = obj.get("sensor_id").and_then(Json::as_i64);

        let snmp_version = obj
            .get("snmp_version")
            .and_then(Json::as_str)
            .unwrap_or("2c");
        if snmp_version != "1" && snmp_version != "2c" {
            return Err(ConfigError::BadSnmpVersion(snmp_version.to_owned()));
        }
        ip.to_socket_addrs()
            .map_err(|_| ConfigError::BadPeerAddress(ip.to_owned()))?;

        let timeout = Duration::from_secs(obj.get("timeout").and_then(Json::as_u64).unwrap_or(2));
        let retries = obj.get("retries").and_then(Json::as_u64).unwrap_or(3) as u32;

        let snmp = Some(snmp_factory(ip, community, snmp_version, timeout, retries)?);

        let mut base_enrichment = Map::new();
        base_enrichment.insert("sensor_name".to_owned(), Json::String(name.clone()));
        if let Some(id) = id {
            base_enrichment.insert("sensor_id".to_owned(), Json::from(id));
        }
        if let Some(extra) = obj.get("enrichment").and_then(Json::as_object) {
            for (k, v) in extra {
                base_enrichment.insert(k.clone(), v.clone());
            }
        }

        let monitors_json = obj
            .get("monitors")
            .and_then(Json::as_array)
            .filter(|a| !a.is_empty())
            .ok_or(ConfigError::EmptyMonitors)?;

        let monitors: Vec<Monitor> = monitors_json
            .iter()
            .map(|m| Monitor::from_json(m, &base_enrichment))
            .collect::<Result<_, _>>()?;

        let dependencies = resolver::resolve(&monitors);

        Ok(Self {
            name,
            id,
            monitors,
            dependencies,
            shell,
            snmp,
            lock: AsyncMutex::new(()),
        })
    }

    /// Run one evaluation pass over every monitor, strictly in declaration
    /// order, appending emitted records to `out`.
    ///
    /// Always returns `true` in safe Rust: an allocation failure aborts
    /// the process instead of producing a recoverable error, so the
    /// boolean exists only for interface parity with the original's
    /// `bool` return (§4.F, §9 "FatalError").
    pub async fn run_pass(&self, out: &mut Vec<Record>) -> bool {
        let _guard = self.lock.lock().await;

        let mut computed: Vec<Option<Value>> = Vec::with_capacity(self.monitors.len());
        let timestamp = unix_timestamp();

        for (i, monitor) in self.monitors.iter().enumerate() {
            let value = self.evaluate_one(monitor, i, &computed).await;

            if let Some(value) = &value {
                debug!("sensor `{}`, monitor `{}`: {:?}", self.name, monitor.name, value);
                if monitor.send {
                    emit(value, monitor, timestamp, out);
                }
            }
            computed.push(value);
        }

        true
    }

    async fn evaluate_one(
        &self,
        monitor: &Monitor,
        index: usize,
        computed: &[Option<Value>],
    ) -> Option<Value> {
        let raw = match &monitor.kind {
            MonitorKind::System(cmd) => self.shell.probe(cmd).await,
            MonitorKind::Oid(oid) => match &self.snmp {
                Some(probe) => probe.probe(oid).await,
                None => {
                    error!(
                        "sensor `{}`, monitor `{}`: {}",
                        self.name, monitor.name, ProbeError::NoSnmpSession
                    );
                    None
                }
            },
            MonitorKind::Op(expr) => {
                let names = monitor.dependency_names();
                let indices = self.dependencies.get(index).and_then(|d| d.clone())?;
                let deps: Option<Vec<(String, Value)>> = names
                    .iter()
                    .zip(indices.iter())
                    .map(|(name, &dep_idx)| {
                        computed
                            .get(dep_idx)
                            .and_then(|v| v.clone())
                            .map(|v| (name.clone(), v))
                    })
                    .collect();
                return deps.and_then(|deps| expr.evaluate(&deps, monitor.split_reduction));
            }
        };

        let raw = raw?;
        match (&monitor.split_token, &raw) {
            (Some(token), Value::String(bytes)) => Some(Value::split(bytes, token, monitor.split_reduction)),
            // `new_monitor_value_array_from_string` (`rb_value.c`) only
            // splits a `STRING`-typed value; a probe response that already
            // auto-promoted to `Number` (no occurrence of the split token)
            // is rejected outright rather than re-stringified into a
            // one-element vector — the monitor is absent this pass.
            (Some(_), Value::Number(_)) => {
                error!(
                    "sensor `{}`, monitor `{}`: split requested on a value that already parsed as a number",
                    self.name, monitor.name
                );
                None
            }
            (Some(_), Value::Vector { .. }) => Some(raw),
            (None, _) => Some(raw),
        }
    }
}

fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct ConstProbe(Option<Value>);

    #[async_trait]
    impl Probe for ConstProbe {
        async fn probe(&self, _argument: &str) -> Option<Value> {
            self.0.clone()
        }
    }

    fn no_snmp(
        _ip: &str,
        _community: &str,
        _version: &str,
        _timeout: Duration,
        _retries: u32,
    ) -> Result<Box<dyn Probe>, ConfigError> {
        Ok(Box::new(ConstProbe(None)))
    }

    #[tokio::test]
    async fn rejects_sensor_missing_required_fields() {
        let v = json!({"sensor_name": "s", "monitors": [{"name": "x", "system": "echo 1"}]});
        let err = Sensor::from_json(&v, Box::new(ConstProbe(None)), no_snmp).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSensorField("sensor_ip")));
    }

    #[tokio::test]
    async fn rejects_sensor_missing_sensor_name() {
        let v = json!({
            "sensor_ip": "localhost:161", "community": "public",
            "monitors": [{"name": "x", "system": "echo 1"}]
        });
        let err = Sensor::from_json(&v, Box::new(ConstProbe(None)), no_snmp).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSensorField("sensor_name")));
    }

    #[tokio::test]
    async fn rejects_sensor_missing_community() {
        let v = json!({
            "sensor_name": "s", "sensor_ip": "localhost:161",
            "monitors": [{"name": "x", "system": "echo 1"}]
        });
        let err = Sensor::from_json(&v, Box::new(ConstProbe(None)), no_snmp).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSensorField("community")));
    }

    #[tokio::test]
    async fn rejects_empty_monitors() {
        let v = json!({
            "sensor_name": "s", "sensor_ip": "localhost:161", "community": "public",
            "monitors": []
        });
        let err = Sensor::from_json(&v, Box::new(ConstProbe(None)), no_snmp).unwrap_err();
        assert_eq!(err, ConfigError::EmptyMonitors);
    }

    #[tokio::test]
    async fn one_pass_evaluates_in_order_and_emits() {
        let v = json!({
            "sensor_name": "arriba", "sensor_ip": "localhost:161", "community": "public",
            "monitors": [
                {"name": "load_1", "system": "echo 1", "send": true},
                {"name": "load_5", "system": "echo 5", "send": false},
                {"name": "ratio", "op": "load_5 / load_1", "send": true}
            ]
        });
        let shell = Box::new(ConstProbe(Some(Value::Number(2.0))));
        let sensor = Sensor::from_json(&v, shell, no_snmp).unwrap();

        let mut out = Vec::new();
        let ok = sensor.run_pass(&mut out).await;
        assert!(ok);
        // load_5 has send=false so only load_1 and ratio emit.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].field("monitor").unwrap(), "load_1");
        assert_eq!(out[1].field("monitor").unwrap(), "ratio");
        assert_eq!(out[1].field("value").unwrap(), "1.000000");
    }

    #[tokio::test]
    async fn scenario_math_ops() {
        // spec.md §8 scenario 1: load_1=echo 3, load_5=echo 2,
        // 100load_5=100*load_5, load_5_x_load_1=load_5*load_1.
        struct LineProbe(std::collections::HashMap<&'static str, f64>);
        #[async_trait]
        impl Probe for LineProbe {
            async fn probe(&self, argument: &str) -> Option<Value> {
                self.0.get(argument).copied().map(Value::Number)
            }
        }
        let mut lines = std::collections::HashMap::new();
        lines.insert("echo 3", 3.0);
        lines.insert("echo 2", 2.0);
        let shell = Box::new(LineProbe(lines));

        let v = json!({
            "sensor_name": "arriba", "sensor_ip": "localhost:161", "community": "public",
            "monitors": [
                {"name": "load_1", "system": "echo 3"},
                {"name": "load_5", "system": "echo 2"},
                {"name": "100load_5", "op": "100*load_5"},
                {"name": "load_5_x_load_1", "op": "load_5*load_1"}
            ]
        });
        let sensor = Sensor::from_json(&v, shell, no_snmp).unwrap();
        let mut out = Vec::new();
        assert!(sensor.run_pass(&mut out).await);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].field("value").unwrap(), "3.000000");
        assert_eq!(out[1].field("value").unwrap(), "2.000000");
        assert_eq!(out[2].field("value").unwrap(), "200.000000");
        assert_eq!(out[3].field("value").unwrap(), "6.000000");
    }

    #[tokio::test]
    async fn absent_snmp_response_yields_no_record_not_panic() {
        let v = json!({
            "sensor_name": "arriba", "sensor_ip": "localhost:161", "community": "public",
            "monitors": [{"name": "ifIn", "oid": "1.3.6.1.2.1.2.2.1.10.1"}]
        });
        let sensor = Sensor::from_json(&v, Box::new(ConstProbe(None)), no_snmp).unwrap();
        let mut out = Vec::new();
        assert!(sensor.run_pass(&mut out).await);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn split_on_an_already_numeric_response_is_absent_not_a_one_element_vector() {
        let v = json!({
            "sensor_name": "arriba", "sensor_ip": "localhost:161", "community": "public",
            "monitors": [{"name": "load_1", "system": "echo 3", "split": ";"}]
        });
        let shell = Box::new(ConstProbe(Some(Value::Number(3.0))));
        let sensor = Sensor::from_json(&v, shell, no_snmp).unwrap();
        let mut out = Vec::new();
        assert!(sensor.run_pass(&mut out).await);
        assert!(out.is_empty());
    }
}
