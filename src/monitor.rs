//! Parsed monitor records — `rb_monitor_t` and `parse_rb_monitors` in the
//! original.

use serde_json::{Map, Value as Json};
use tracing::warn;

use crate::error::ConfigError;
use crate::expr::Expression;
use crate::value::Reduction;

/// What a monitor measures and how: exactly one of these populated per
/// monitor, determined at parse time by which of `system`/`oid`/`op` was
/// present in the JSON (checked in that order).
#[derive(Debug)]
pub enum MonitorKind {
    /// Run this shell command, through a shell, and read its first line.
    System(String),
    /// GET this SNMP OID.
    Oid(String),
    /// Evaluate this arithmetic expression against earlier monitors.
    Op(Expression),
}

impl MonitorKind {
    /// The canonical `type` enrichment value (§4.D), distinct from the
    /// JSON command key: an `Oid` monitor is parsed from `"oid"` but
    /// reports as `"snmp"`, matching the original's
    /// `_X(RB_MONITOR_T__OID, "oid", "snmp", …)` mapping.
    pub fn type_name(&self) -> &'static str {
        match self {
            MonitorKind::System(_) => "system",
            MonitorKind::Oid(_) => "snmp",
            MonitorKind::Op(_) => "op",
        }
    }
}

/// One parsed monitor: what to measure, how to post-process it, and how
/// to emit it.
#[derive(Debug)]
pub struct Monitor {
    pub name: String,
    pub kind: MonitorKind,
    pub split_token: Option<String>,
    pub split_reduction: Option<Reduction>,
    pub name_suffix: Option<String>,
    pub instance_prefix: Option<String>,
    pub send: bool,
    pub integer: bool,
    pub enrichment: Map<String, Json>,
}

impl Monitor {
    /// Parse one monitor out of its JSON object, given the sensor's
    /// already-built enrichment map to deep-copy and augment (§4.D, §9
    /// "Enrichment deep copy" — the copy here is a genuine `Map` clone,
    /// never an alias of the sensor's map).
    pub fn from_json(v: &Json, sensor_enrichment: &Map<String, Json>) -> Result<Self, ConfigError> {
        let obj = v.as_object().ok_or(ConfigError::WrongType {
            field: "monitor",
            expected: "object",
        })?;

        let name = obj
            .get("name")
            .and_then(Json::as_str)
            .ok_or(ConfigError::MissingName)?
            .to_owned();

        // Checked in this order, matching the original's MONITOR_CMDS_X
        // table: system, oid, op.
        let kind = if let Some(cmd) = obj.get("system").and_then(Json::as_str) {
            MonitorKind::System(cmd.to_owned())
        } else if let Some(oid) = obj.get("oid").and_then(Json::as_str) {
            MonitorKind::Oid(oid.to_owned())
        } else if let Some(expr) = obj.get("op").and_then(Json::as_str) {
            let parsed = Expression::parse(expr)
                .map_err(|e| ConfigError::BadExpression(e.to_string()))?;
            MonitorKind::Op(parsed)
        } else {
            return Err(ConfigError::MissingCommand);
        };

        let split_token = obj
            .get("split")
            .and_then(Json::as_str)
            .map(ToOwned::to_owned);

        let split_reduction = match obj.get("split_op").and_then(Json::as_str) {
            Some(s) => match Reduction::parse(s) {
                Some(r) => Some(r),
                None => {
                    warn!("monitor `{}`: unknown split_op `{}`, ignoring", name, s);
                    None
                }
            },
            None => None,
        };

        let name_suffix = obj
            .get("name_split_suffix")
            .and_then(Json::as_str)
            .map(ToOwned::to_owned);
        let instance_prefix = obj
            .get("instance_prefix")
            .and_then(Json::as_str)
            .map(ToOwned::to_owned);

        let send = obj.get("send").and_then(Json::as_bool).unwrap_or(true);
        let integer = obj.get("integer").and_then(Json::as_bool).unwrap_or(false);

        let mut enrichment = sensor_enrichment.clone();
        enrichment.insert("type".to_owned(), Json::String(kind.type_name().to_owned()));
        if let Some(unit) = obj.get("unit") {
            enrichment.insert("unit".to_owned(), unit.clone());
        }
        if let Some(group) = obj.get("group_name") {
            enrichment.insert("group_name".to_owned(), group.clone());
        }

        Ok(Self {
            name,
            kind,
            split_token,
            split_reduction,
            name_suffix,
            instance_prefix,
            send,
            integer,
            enrichment,
        })
    }

    /// Free variable names of this monitor's expression, or empty for
    /// non-`op` monitors.
    pub fn dependency_names(&self) -> Vec<String> {
        match &self.kind {
            MonitorKind::Op(expr) => expr.variables(),
            _ => Vec::new(),
        }
    }
}
