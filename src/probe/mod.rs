//! Probe adapters: the two ways a monitor reads a raw value from a sensor.

mod shell;
mod snmp_get;

pub use shell::ShellProbe;
pub use snmp_get::{
    parse_oid, LiveSnmpSession, RawSnmpValue, SnmpGetProbe, SnmpParams, SnmpSession, SnmpVersion,
};

use async_trait::async_trait;

use crate::value::Value;

/// Something that can fetch one raw value given a monitor's argument
/// (a shell command string, or an OID).
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, argument: &str) -> Option<Value>;
}
