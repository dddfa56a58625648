//! The SNMP trap listener: a long-running worker that turns inbound
//! TRAP/TRAP2/INFORM PDUs into the same enriched-record shape a sensor
//! pass produces — `snmp_trap_callback` in `snmp/traps.c`.

mod pdu;

use std::sync::Arc;
use std::time::Duration;

use rasn_snmp::v2;
use rasn_snmp::v2c;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::emit::{emit, Record};
use crate::monitor::{Monitor, MonitorKind};
use crate::sink::MessageSink;
use crate::value::Value;

/// Default period at which the listener's `select!` wakes with no
/// inbound traffic, bounding how long cancellation can take to observe
/// (`spec.md` §5's "timed readiness wait").
const DEFAULT_TICK: Duration = Duration::from_secs(5);

pub struct TrapListener {
    socket: UdpSocket,
    tick: Duration,
    topic: String,
}

impl TrapListener {
    pub async fn bind(addr: &str, topic: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(addr).await?,
            tick: DEFAULT_TICK,
            topic: topic.into(),
        })
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run the listener until `cancel` fires. Each received datagram is
    /// decoded, turned into records, and handed to `sink` as a batch; a
    /// decode failure only drops that one datagram.
    pub async fn run(self, cancel: CancellationToken, sink: Arc<dyn MessageSink>) {
        let mut buf = vec![0u8; 65_535];
        let mut interval = tokio::time::interval(self.tick);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("trap listener cancelled");
                    break;
                }
                _ = interval.tick() => {
                    continue;
                }
                res = self.socket.recv_from(&mut buf) => {
                    match res {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer, &sink).await,
                        Err(e) => error!("trap listener recv error: {}", e),
                    }
                }
            }
        }
    }

    async fn handle_datagram(
        &self,
        data: &[u8],
        peer: std::net::SocketAddr,
        sink: &Arc<dyn MessageSink>,
    ) {
        let Some(decoded) = pdu::decode(data, &peer.to_string()) else {
            return;
        };

        if let Some(request_id) = decoded.inform_request_id {
            if let Err(e) = self.respond_to_inform(request_id, peer).await {
                error!("couldn't respond to INFORM from {}: {}", peer, e);
            }
        }

        let trap_oid_string = decoded
            .trap_oid
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");

        let monitor = synthetic_monitor(&trap_oid_string, decoded.enrichment);
        let mut records: Vec<Record> = Vec::new();
        emit(&Value::Number(1.0), &monitor, unix_timestamp(), &mut records);

        let accepted = sink.publish_batch(&self.topic, &records).await;
        if accepted < records.len() {
            crate::sink::log_rejected(&records, accepted);
        }
    }

    /// Build and send a bare RESPONSE PDU echoing the INFORM's request
    /// id, per `snmp_trap_callback`'s `snmp_clone_pdu` + `command =
    /// SNMP_MSG_RESPONSE` handling. `SyncSession` has no async
    /// clone-and-respond API, so the response is hand-built here rather
    /// than round-tripped through the `snmp` crate.
    async fn respond_to_inform(
        &self,
        request_id: i32,
        peer: std::net::SocketAddr,
    ) -> std::io::Result<()> {
        let response = v2c::Message {
            version: 1.into(),
            community: b"public".to_vec().into(),
            data: v2::Pdus::Response(v2::Response(v2::Pdu {
                request_id: request_id.into(),
                error_status: 0u32.into(),
                error_index: 0u32.into(),
                variable_bindings: Vec::new().into(),
            })),
        };
        let bytes = rasn::ber::encode(&response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket.send_to(&bytes, peer).await?;
        Ok(())
    }
}

fn synthetic_monitor(trap_oid: &str, enrichment: serde_json::Map<String, serde_json::Value>) -> Monitor {
    Monitor {
        name: trap_oid.to_owned(),
        kind: MonitorKind::Oid(trap_oid.to_owned()),
        split_token: None,
        split_reduction: None,
        name_suffix: None,
        instance_prefix: None,
        send: true,
        integer: false,
        enrichment,
    }
}

fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
