//! Turning an evaluated `Value` into emitted records — `rb_sensor_monitor.c`'s
//! `send_array`/`send_value`/`rb_monitor_printf` in the original.

use serde_json::{Map, Value as Json};
use tracing::warn;

use crate::monitor::Monitor;
use crate::value::Value;

/// One fully rendered measurement, ready to be serialized as a single
/// line of JSON. Field insertion order is the wire order (`serde_json`'s
/// `preserve_order` feature keeps it), matching `spec.md` §6: `timestamp`,
/// `monitor`, `instance` (vector elements only), `value`, then every
/// enrichment key.
#[derive(Debug, Clone)]
pub struct Record(Map<String, Json>);

impl Record {
    fn new(timestamp: i64, monitor_name: &str, instance: Option<String>, value: Json) -> Self {
        let mut fields = Map::new();
        fields.insert("timestamp".to_owned(), Json::from(timestamp));
        fields.insert("monitor".to_owned(), Json::String(monitor_name.to_owned()));
        if let Some(instance) = instance {
            fields.insert("instance".to_owned(), Json::String(instance));
        }
        fields.insert("value".to_owned(), value);
        Self(fields)
    }

    fn merge_enrichment(&mut self, enrichment: &Map<String, Json>) {
        for (k, v) in enrichment {
            self.0.insert(k.clone(), render_enrichment_value(k, v));
        }
    }

    /// Render this record as one compact JSON object, the unit emitted on
    /// the wire per line.
    pub fn to_line(&self) -> String {
        serde_json::to_string(&self.0).expect("a Map<String, Value> always serializes")
    }

    /// Look up a rendered field by name — used by tests and by callers
    /// (e.g. the trap listener) logging which monitor a rejected record
    /// belonged to.
    pub fn field(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }
}

/// Scalar numbers render with exactly six fractional digits, matching the
/// original's `%lf` format string.
fn render_number(n: f64) -> Json {
    Json::String(format!("{:.6}", n))
}

fn render_enrichment_value(key: &str, v: &Json) -> Json {
    match v {
        Json::String(_) | Json::Bool(_) | Json::Null => v.clone(),
        Json::Number(n) => {
            if n.is_i64() || n.is_u64() {
                v.clone()
            } else if let Some(f) = n.as_f64() {
                render_number(f)
            } else {
                v.clone()
            }
        }
        Json::Object(_) | Json::Array(_) => {
            warn!("enrichment key `{}` is a nested object/array, dropping", key);
            Json::Null
        }
    }
}

/// Build and append the record(s) for one evaluated monitor value, per
/// `spec.md` §4.G. A `send = false` monitor still computes (so later
/// monitors can reference it) but never reaches this function from the
/// engine.
pub fn emit(value: &Value, monitor: &Monitor, timestamp: i64, out: &mut Vec<Record>) {
    match value {
        Value::Number(n) => {
            let mut record = Record::new(timestamp, &monitor.name, None, render_number(*n));
            record.merge_enrichment(&monitor.enrichment);
            out.push(record);
        }
        Value::String(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            let mut record = Record::new(timestamp, &monitor.name, None, Json::String(text));
            record.merge_enrichment(&monitor.enrichment);
            out.push(record);
        }
        Value::Vector {
            children,
            reduction,
        } => {
            let suffixed_name = match &monitor.name_suffix {
                Some(suffix) => format!("{}{}", monitor.name, suffix),
                None => monitor.name.clone(),
            };
            for (k, child) in children.iter().enumerate() {
                let Some(n) = child else { continue };
                // Only attach an `instance` field when a prefix is
                // configured, matching `rb_value.c`'s
                // `NO_INSTANCE != instance && monitor_instance_prefix` guard
                // (spec.md §8 scenario 2: split without `instance_prefix`
                // emits no `instance` field at all).
                let instance = monitor
                    .instance_prefix
                    .as_deref()
                    .map(|prefix| format!("{}{}", prefix, k));
                let mut record = Record::new(
                    timestamp,
                    &suffixed_name,
                    instance,
                    render_number(*n),
                );
                record.merge_enrichment(&monitor.enrichment);
                out.push(record);
            }
            if let Some(r) = reduction {
                let mut record = Record::new(timestamp, &monitor.name, None, render_number(*r));
                record.merge_enrichment(&monitor.enrichment);
                out.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn monitor(extra: serde_json::Value) -> Monitor {
        let mut v = json!({"name": "load_1", "system": "echo 1"});
        for (k, val) in extra.as_object().unwrap() {
            v.as_object_mut().unwrap().insert(k.clone(), val.clone());
        }
        Monitor::from_json(&v, &Map::new()).unwrap()
    }

    #[test]
    fn scalar_number_renders_six_fractional_digits() {
        let m = monitor(json!({}));
        let mut out = Vec::new();
        emit(&Value::Number(3.0), &m, 1000, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field("value").unwrap(), "3.000000");
        assert_eq!(out[0].field("timestamp").unwrap(), 1000);
        assert_eq!(out[0].field("monitor").unwrap(), "load_1");
        assert!(out[0].field("instance").is_none());
    }

    #[test]
    fn string_value_renders_as_quoted_string() {
        let m = monitor(json!({}));
        let mut out = Vec::new();
        emit(&Value::String(b"idle".to_vec()), &m, 1000, &mut out);
        assert_eq!(out[0].field("value").unwrap(), "idle");
    }

    #[test]
    fn vector_emits_one_record_per_present_child_plus_reduction() {
        let m = monitor(json!({"name_split_suffix": "_iface", "instance_prefix": "eth"}));
        let v = Value::Vector {
            children: vec![Some(1.0), None, Some(3.0)],
            reduction: Some(4.0),
        };
        let mut out = Vec::new();
        emit(&v, &m, 1000, &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].field("monitor").unwrap(), "load_1_iface");
        assert_eq!(out[0].field("instance").unwrap(), "eth0");
        assert_eq!(out[1].field("instance").unwrap(), "eth2");
        assert_eq!(out[2].field("monitor").unwrap(), "load_1");
        assert!(out[2].field("instance").is_none());
        assert_eq!(out[2].field("value").unwrap(), "4.000000");
    }

    #[test]
    fn split_without_instance_prefix_emits_no_instance_field() {
        // spec.md §8 scenario 2: `load_1_ns: echo '3;2;1;0' split=';'`
        // emits four records named `load_1_ns` with no `instance`.
        let m = monitor(json!({}));
        let v = Value::Vector {
            children: vec![Some(3.0), Some(2.0), Some(1.0), Some(0.0)],
            reduction: None,
        };
        let mut out = Vec::new();
        emit(&v, &m, 1000, &mut out);
        assert_eq!(out.len(), 4);
        for record in &out {
            assert_eq!(record.field("monitor").unwrap(), "load_1");
            assert!(record.field("instance").is_none());
        }
        assert_eq!(out[0].field("value").unwrap(), "3.000000");
        assert_eq!(out[3].field("value").unwrap(), "0.000000");
    }

    #[test]
    fn enrichment_keys_are_merged_in_order() {
        let m = monitor(json!({"unit": "%", "group_name": "cpu"}));
        let mut out = Vec::new();
        emit(&Value::Number(1.0), &m, 1000, &mut out);
        assert_eq!(out[0].field("type").unwrap(), "system");
        assert_eq!(out[0].field("unit").unwrap(), "%");
        assert_eq!(out[0].field("group_name").unwrap(), "cpu");
    }
}
