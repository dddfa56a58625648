use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use super::Probe;
use crate::error::ProbeError;
use crate::value::Value;

/// The subset of `snmp::SyncSession` this crate relies on, pulled out as a
/// trait so tests can substitute a stub responder without a live SNMP
/// agent (`spec.md` §8's hermetic-test requirement).
pub trait SnmpSession: Send {
    fn get(&mut self, oid: &[u32]) -> Result<RawSnmpValue, String>;
}

/// A minimal reflection of `snmp::Value`, enough for the GET probe's
/// result mapping — avoids leaking the `snmp` crate's lifetime-bound
/// `Value<'_>` across the `spawn_blocking` boundary.
#[derive(Debug, Clone)]
pub enum RawSnmpValue {
    Integer(i64),
    Gauge32(u32),
    Counter32(u32),
    Counter64(u64),
    OctetString(Vec<u8>),
    Other,
}

/// GETs a single OID from a peer over SNMP v1/v2c.
pub struct SnmpGetProbe<S> {
    session: Arc<Mutex<S>>,
}

impl<S: SnmpSession> SnmpGetProbe<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }
}

/// Parse a dotted OID string (`"1.3.6.1.2.1.1.3.0"`) into its numeric
/// components. Invalid components are skipped, matching the original's
/// lenient `rb_snmp` OID parsing rather than rejecting the whole string.
pub fn parse_oid(s: &str) -> Vec<u32> {
    s.split('.').filter_map(|c| c.parse().ok()).collect()
}

#[async_trait]
impl<S: SnmpSession + 'static> Probe for SnmpGetProbe<S> {
    async fn probe(&self, argument: &str) -> Option<Value> {
        let oid = parse_oid(argument);
        if oid.is_empty() {
            warn!("couldn't parse OID `{}`", argument);
            return None;
        }

        // The real session is uninterruptible (no async API in the `snmp`
        // crate) so the GET call itself runs on spawn_blocking; per §5 a
        // pass is not cancellable mid-probe.
        let session = Arc::clone(&self.session);
        let raw = tokio::task::spawn_blocking(move || session.lock().unwrap().get(&oid)).await;

        match raw {
            Ok(Ok(RawSnmpValue::Integer(n))) => Some(Value::Number(n as f64)),
            Ok(Ok(RawSnmpValue::Gauge32(n))) => Some(Value::Number(n as f64)),
            Ok(Ok(RawSnmpValue::OctetString(bytes))) => {
                if bytes.is_empty() {
                    None
                } else {
                    Some(Value::from_bytes(bytes))
                }
            }
            // §4.B only names INTEGER/GAUGE/OCTET_STR; COUNTER32/COUNTER64 and
            // anything else is an unsupported type here, same as the catch-all.
            Ok(Ok(RawSnmpValue::Counter32(_) | RawSnmpValue::Counter64(_) | RawSnmpValue::Other)) => {
                warn!("OID `{}` returned an unsupported SNMP type", argument);
                None
            }
            Ok(Err(e)) => {
                error!("`{}`: {}", argument, ProbeError::Snmp(e));
                None
            }
            Err(e) => {
                error!("`{}`: {}", argument, ProbeError::Snmp(e.to_string()));
                None
            }
        }
    }
}

/// Connection parameters for an SNMP session, parsed from a sensor's JSON
/// description (§4.D).
#[derive(Debug, Clone)]
pub struct SnmpParams {
    pub peer: SocketAddr,
    pub community: String,
    pub version: SnmpVersion,
    pub timeout: Duration,
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1" => Some(Self::V1),
            "2c" => Some(Self::V2c),
            _ => None,
        }
    }
}

/// The live adapter over `snmp::SyncSession`, used outside of tests.
pub struct LiveSnmpSession {
    inner: ::snmp::SyncSession,
}

impl LiveSnmpSession {
    pub fn connect(params: &SnmpParams) -> Result<Self, String> {
        let version = match params.version {
            SnmpVersion::V1 => ::snmp::Version::V1,
            SnmpVersion::V2c => ::snmp::Version::V2c,
        };
        let inner = ::snmp::SyncSession::new_with_version(
            params.peer,
            params.community.as_bytes(),
            Some(params.timeout),
            0,
            version,
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { inner })
    }
}

impl SnmpSession for LiveSnmpSession {
    fn get(&mut self, oid: &[u32]) -> Result<RawSnmpValue, String> {
        let pdu = self.inner.get(oid).map_err(|e| e.to_string())?;
        let mut varbinds = pdu.varbinds;
        let (_, value) = varbinds.next().ok_or_else(|| "empty response PDU".to_owned())?;
        Ok(match value {
            ::snmp::Value::Integer(n) => RawSnmpValue::Integer(n),
            ::snmp::Value::Unsigned32(n) | ::snmp::Value::Gauge32(n) => RawSnmpValue::Gauge32(n),
            ::snmp::Value::Counter32(n) => RawSnmpValue::Counter32(n),
            ::snmp::Value::Counter64(n) => RawSnmpValue::Counter64(n),
            ::snmp::Value::OctetString(bytes) => RawSnmpValue::OctetString(bytes.to_vec()),
            _ => RawSnmpValue::Other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSession {
        responses: std::collections::HashMap<Vec<u32>, Result<RawSnmpValue, String>>,
    }

    impl SnmpSession for StubSession {
        fn get(&mut self, oid: &[u32]) -> Result<RawSnmpValue, String> {
            self.responses
                .get(oid)
                .cloned()
                .unwrap_or_else(|| Err("no such object".to_owned()))
        }
    }

    #[test]
    fn parses_dotted_oid() {
        assert_eq!(parse_oid("1.3.6.1.2.1.1.3.0"), vec![1, 3, 6, 1, 2, 1, 1, 3, 0]);
    }

    #[tokio::test]
    async fn integer_maps_to_number() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(vec![1, 3, 6, 1], Ok(RawSnmpValue::Integer(1)));
        let probe = SnmpGetProbe::new(StubSession { responses });
        assert_eq!(probe.probe("1.3.6.1").await, Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn counter_type_is_unsupported_and_absent() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(vec![1, 3, 6, 1], Ok(RawSnmpValue::Counter32(5)));
        let probe = SnmpGetProbe::new(StubSession { responses });
        assert_eq!(probe.probe("1.3.6.1").await, None);
    }

    #[tokio::test]
    async fn gauge_maps_to_number() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(vec![1, 3, 6, 1], Ok(RawSnmpValue::Gauge32(7)));
        let probe = SnmpGetProbe::new(StubSession { responses });
        assert_eq!(probe.probe("1.3.6.1").await, Some(Value::Number(7.0)));
    }

    #[tokio::test]
    async fn octet_string_runs_through_from_bytes() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(vec![1, 3, 6, 1], Ok(RawSnmpValue::OctetString(b"3.5".to_vec())));
        let probe = SnmpGetProbe::new(StubSession { responses });
        assert_eq!(probe.probe("1.3.6.1").await, Some(Value::Number(3.5)));
    }

    #[tokio::test]
    async fn empty_octet_string_is_absent() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(vec![1, 3, 6, 1], Ok(RawSnmpValue::OctetString(Vec::new())));
        let probe = SnmpGetProbe::new(StubSession { responses });
        assert_eq!(probe.probe("1.3.6.1").await, None);
    }

    #[tokio::test]
    async fn session_error_is_absent() {
        let probe = SnmpGetProbe::new(StubSession {
            responses: std::collections::HashMap::new(),
        });
        assert_eq!(probe.probe("1.3.6.1").await, None);
    }

    #[tokio::test]
    async fn unparseable_oid_is_absent() {
        let probe = SnmpGetProbe::new(StubSession {
            responses: std::collections::HashMap::new(),
        });
        assert_eq!(probe.probe("").await, None);
    }
}
