//! Decoding inbound SNMP TRAP/TRAP2/INFORM PDUs and turning them into
//! enriched records — `snmp_trap_callback` in `snmp/traps.c`.

use rasn_smi::v1 as smi_v1;
use rasn_smi::v2 as smi_v2;
use rasn_snmp::v1;
use rasn_snmp::v2;
use rasn_snmp::v2c;
use serde_json::{Map, Value as Json};
use tracing::warn;

const SNMP_TRAP_OID_ROOT: [u32; 9] = [1, 3, 6, 1, 6, 3, 1, 1, 5];
const SNMP_TRAP_OID: [u32; 11] = [1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0];
const SYS_UP_TIME_OID: [u32; 8] = [1, 3, 6, 1, 2, 1, 1, 3, 0];
const IF_INDEX_PREFIX: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 1];

/// What a decoded PDU tells the listener: the trap OID plus the
/// enrichment already built from its varbinds, and whether it was an
/// INFORM (needing a response) paired with its request id.
pub struct DecodedTrap {
    pub trap_oid: Vec<u32>,
    pub enrichment: Map<String, Json>,
    pub inform_request_id: Option<i32>,
}

/// Try to decode `data` as an SNMPv1 message first, then SNMPv2c.
/// Anything else (SNMPv3, garbage, unsupported PDU command) is `None`.
pub fn decode(data: &[u8], peer: &str) -> Option<DecodedTrap> {
    if let Ok(msg) = rasn::ber::decode::<v1::Message<v1::Pdus>>(data) {
        return decode_v1(msg, peer);
    }
    if let Ok(msg) = rasn::ber::decode::<v2c::Message<v2::Pdus>>(data) {
        return decode_v2c(msg, peer);
    }
    warn!("couldn't decode SNMP datagram from {} as v1 or v2c", peer);
    None
}

fn decode_v1(msg: v1::Message<v1::Pdus>, peer: &str) -> Option<DecodedTrap> {
    let v1::Pdus::Trap(trap) = msg.data else {
        return None;
    };

    let enterprise = oid_components(&trap.enterprise);
    let generic_trap = i64::try_from(&trap.generic_trap).unwrap_or(0);
    let trap_oid = if generic_trap == 6 {
        let mut oid = enterprise;
        if oid.last() != Some(&0) {
            oid.push(0);
        }
        oid.push(i64::try_from(&trap.specific_trap).unwrap_or(0) as u32);
        oid
    } else {
        let mut oid = SNMP_TRAP_OID_ROOT.to_vec();
        oid.push(generic_trap as u32 + 1);
        oid
    };

    let mut enrichment = Map::new();
    enrichment.insert("sensor_name".to_owned(), Json::String(peer.to_owned()));
    for vb in trap.variable_bindings.iter() {
        let oid = oid_components(&vb.name);
        add_varbind_enrichment(&mut enrichment, &oid, v1_value_to_json(&vb.value));
    }

    Some(DecodedTrap {
        trap_oid,
        enrichment,
        inform_request_id: None,
    })
}

fn decode_v2c(msg: v2c::Message<v2::Pdus>, peer: &str) -> Option<DecodedTrap> {
    let (varbinds, inform_request_id): (&v2::VarBindList, Option<i32>) = match &msg.data {
        v2::Pdus::Trap(pdu) => (&pdu.0.variable_bindings, None),
        v2::Pdus::InformRequest(pdu) => (
            &pdu.0.variable_bindings,
            Some(i64::try_from(&pdu.0.request_id).unwrap_or(0) as i32),
        ),
        _ => return None,
    };

    let trap_oid = find_trap_oid(varbinds)?;

    let mut enrichment = Map::new();
    enrichment.insert("sensor_name".to_owned(), Json::String(peer.to_owned()));
    for vb in varbinds.iter() {
        let oid = oid_components(&vb.name);
        if oid == SNMP_TRAP_OID {
            continue;
        }
        if let v2::VarBindValue::Value(value) = &vb.value {
            add_varbind_enrichment(&mut enrichment, &oid, v2_value_to_json(value));
        }
    }

    Some(DecodedTrap {
        trap_oid,
        enrichment,
        inform_request_id,
    })
}

/// Locate the `snmpTrapOID.0` varbind, preferring index 1 (the original's
/// "second varbind" fast path) and falling back to a linear scan.
fn find_trap_oid(varbinds: &v2::VarBindList) -> Option<Vec<u32>> {
    if let Some(vb) = varbinds.get(1) {
        if oid_components(&vb.name) == SNMP_TRAP_OID {
            if let v2::VarBindValue::Value(smi_v2::ObjectSyntax::Simple(
                smi_v2::SimpleSyntax::ObjectId(oid),
            )) = &vb.value
            {
                return Some(oid_components(oid));
            }
        }
    }
    for vb in varbinds.iter() {
        if oid_components(&vb.name) == SNMP_TRAP_OID {
            if let v2::VarBindValue::Value(smi_v2::ObjectSyntax::Simple(
                smi_v2::SimpleSyntax::ObjectId(oid),
            )) = &vb.value
            {
                return Some(oid_components(oid));
            }
        }
    }
    warn!("couldn't find snmpTrapOID varbind in TRAP2/INFORM PDU");
    None
}

fn add_varbind_enrichment(enrichment: &mut Map<String, Json>, oid: &[u32], value: Option<Json>) {
    if oid == SYS_UP_TIME_OID {
        return;
    }
    if let Some(suffix) = oid.strip_prefix(IF_INDEX_PREFIX.as_slice()) {
        let index = dotted(suffix);
        enrichment.insert("if_index".to_owned(), Json::String(index));
        return;
    }
    let Some(value) = value else { return };
    enrichment.insert(dotted(oid), value);
}

fn oid_components(oid: &rasn::types::ObjectIdentifier) -> Vec<u32> {
    oid.iter().map(|n| *n as u32).collect()
}

fn dotted(oid: &[u32]) -> String {
    oid.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
}

fn v1_value_to_json(syntax: &smi_v1::ObjectSyntax) -> Option<Json> {
    match syntax {
        smi_v1::ObjectSyntax::Simple(smi_v1::SimpleSyntax::Number(n)) => {
            Some(Json::from(i64::try_from(n).unwrap_or(0)))
        }
        smi_v1::ObjectSyntax::Simple(smi_v1::SimpleSyntax::String(s)) => {
            Some(Json::String(String::from_utf8_lossy(s).into_owned()))
        }
        smi_v1::ObjectSyntax::ApplicationWide(smi_v1::ApplicationSyntax::Gauge(g)) => {
            Some(Json::from(g.0))
        }
        smi_v1::ObjectSyntax::ApplicationWide(smi_v1::ApplicationSyntax::Counter(c)) => {
            Some(Json::from(c.0))
        }
        smi_v1::ObjectSyntax::ApplicationWide(smi_v1::ApplicationSyntax::Ticks(t)) => {
            Some(Json::from(t.0))
        }
        other => {
            warn!("unsupported SNMPv1 varbind type {:?}, dropping", other);
            None
        }
    }
}

fn v2_value_to_json(syntax: &smi_v2::ObjectSyntax) -> Option<Json> {
    match syntax {
        smi_v2::ObjectSyntax::Simple(smi_v2::SimpleSyntax::Integer(n)) => {
            Some(Json::from(i64::try_from(n).unwrap_or(0)))
        }
        smi_v2::ObjectSyntax::Simple(smi_v2::SimpleSyntax::String(s)) => {
            Some(Json::String(String::from_utf8_lossy(s).into_owned()))
        }
        smi_v2::ObjectSyntax::Simple(smi_v2::SimpleSyntax::ObjectId(oid)) => {
            Some(Json::String(dotted(&oid_components(oid))))
        }
        smi_v2::ObjectSyntax::ApplicationWide(smi_v2::ApplicationSyntax::Counter(c)) => {
            Some(Json::from(c.0))
        }
        smi_v2::ObjectSyntax::ApplicationWide(smi_v2::ApplicationSyntax::Unsigned(u)) => {
            Some(Json::from(u.0))
        }
        smi_v2::ObjectSyntax::ApplicationWide(smi_v2::ApplicationSyntax::Ticks(t)) => {
            Some(Json::from(t.0))
        }
        smi_v2::ObjectSyntax::ApplicationWide(smi_v2::ApplicationSyntax::BigCounter(c)) => {
            Some(Json::from(c.0))
        }
        other => {
            warn!("unsupported SNMPv2 varbind type {:?}, dropping", other);
            None
        }
    }
}
