//! Remote probe event model.
//!
//! A probe instance observing live traffic somewhere else serializes its
//! observations as discrete events: connection lifecycle transitions, RTT
//! samples, QUIC spin-bit changes and ECN congestion marks. This module is
//! the owned, typed form of one such event as it arrives off the wire.
//!
//! Kind tags are kebab-case strings on the wire. Unrecognized tags are kept
//! as `Unknown` so that a version mismatch between probe and analyzer
//! surfaces as a schema error at dispatch time instead of a deserialization
//! failure at the transport boundary.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// Capture time in microseconds on the probe's monotonic clock base.
pub type Timestamp = u64;

/// The kind of observation an event reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    NewConnection,
    ChangeConnection,
    ConnectionDelete,
    NewRttMeasurement,
    SpinFlip,
    SpinValue,
    EcnCongestionEvent,
    /// A tag this analyzer version does not know about.
    Unknown(String),
}

impl EventKind {
    /// Canonical wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewConnection => "new-connection",
            Self::ChangeConnection => "change-connection",
            Self::ConnectionDelete => "connection-delete",
            Self::NewRttMeasurement => "new-rtt-measurement",
            Self::SpinFlip => "spin-flip",
            Self::SpinValue => "spin-value",
            Self::EcnCongestionEvent => "ecn-congestion-event",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "new-connection" => Self::NewConnection,
            "change-connection" => Self::ChangeConnection,
            "connection-delete" => Self::ConnectionDelete,
            "new-rtt-measurement" => Self::NewRttMeasurement,
            "spin-flip" => Self::SpinFlip,
            "spin-value" => Self::SpinValue,
            "ecn-congestion-event" => Self::EcnCongestionEvent,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// The kind of connection an event refers to.
///
/// Six transport flows identified by a per-protocol session key, and four
/// aggregate groupings keyed purely by their address/network pair. Each kind
/// fixes the required shape of the event's addresses and the grammar of its
/// session field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionKind {
    Tcp,
    Udp,
    Dns,
    Coap,
    Quic,
    Icmp,
    HostPair,
    HostNetwork,
    NetworkNetwork,
    MulticastGroup,
    /// A tag this analyzer version does not know about.
    Unknown(String),
}

impl ConnectionKind {
    /// Canonical wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Dns => "dns",
            Self::Coap => "coap",
            Self::Quic => "quic",
            Self::Icmp => "icmp",
            Self::HostPair => "host-pair",
            Self::HostNetwork => "host-network",
            Self::NetworkNetwork => "network-network",
            Self::MulticastGroup => "multicast-group",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for ConnectionKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "tcp" => Self::Tcp,
            "udp" => Self::Udp,
            "dns" => Self::Dns,
            "coap" => Self::Coap,
            "quic" => Self::Quic,
            "icmp" => Self::Icmp,
            "host-pair" => Self::HostPair,
            "host-network" => Self::HostNetwork,
            "network-network" => Self::NetworkNetwork,
            "multicast-group" => Self::MulticastGroup,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<ConnectionKind> for String {
    fn from(kind: ConnectionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Which side of the connection an RTT sample was measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    FromInitiator,
    FromResponder,
}

/// Whether an RTT sample covers one direction or a full round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementKind {
    Unidirectional,
    Bidirectional,
}

/// Payload of a `new-rtt-measurement` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RttMeasurement {
    /// Measured RTT (or one-way delay) in microseconds.
    pub rtt: u64,
    pub direction: Direction,
    pub measurement: MeasurementKind,
}

/// One observation from a remote probe.
///
/// Immutable once constructed; the dispatcher borrows it for the duration of
/// a single `process_event` call. The session field is opaque text whose
/// grammar depends on `connection_type` (see the `session` module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventKind,
    pub connection_type: ConnectionKind,
    /// Address or network of the side that initiated the connection.
    pub initiator_address: IpNetwork,
    /// Address or network of the responding side.
    pub responder_address: IpNetwork,
    /// Protocol-specific session identifier (ports, ICMP id, or CID pair).
    #[serde(default)]
    pub session: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub packets_from_side1: u64,
    #[serde(default)]
    pub packets_from_side2: u64,
    #[serde(default)]
    pub bytes_from_side1: u64,
    #[serde(default)]
    pub bytes_from_side2: u64,
    /// Present only on `new-rtt-measurement` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_measurement: Option<RttMeasurement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_deserializes_from_probe_json() {
        let line = r#"{
            "eventType": "new-connection",
            "connectionType": "tcp",
            "initiatorAddress": "10.0.0.1",
            "responderAddress": "10.0.0.2",
            "session": "443:51000",
            "timestamp": 1000,
            "packetsFromSide1": 3,
            "packetsFromSide2": 2,
            "bytesFromSide1": 300,
            "bytesFromSide2": 128
        }"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(event.event_type, EventKind::NewConnection);
        assert_eq!(event.connection_type, ConnectionKind::Tcp);
        assert_eq!(event.session, "443:51000");
        assert_eq!(event.packets_from_side1, 3);
        assert!(event.rtt_measurement.is_none());
    }

    #[test]
    fn rtt_payload_deserializes() {
        let line = r#"{
            "eventType": "new-rtt-measurement",
            "connectionType": "icmp",
            "initiatorAddress": "10.0.0.1",
            "responderAddress": "10.0.0.2",
            "session": "1234",
            "timestamp": 1000,
            "rttMeasurement": {
                "rtt": 300,
                "direction": "from-responder",
                "measurement": "unidirectional"
            }
        }"#;
        let event: Event = serde_json::from_str(line).unwrap();
        let rtt = event.rtt_measurement.unwrap();
        assert_eq!(rtt.rtt, 300);
        assert_eq!(rtt.direction, Direction::FromResponder);
        assert_eq!(rtt.measurement, MeasurementKind::Unidirectional);
    }

    #[test]
    fn unknown_tags_are_preserved_not_rejected() {
        let line = r#"{
            "eventType": "flux-capacitor",
            "connectionType": "warp",
            "initiatorAddress": "10.0.0.1",
            "responderAddress": "10.0.0.2",
            "session": "",
            "timestamp": 0
        }"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(
            event.event_type,
            EventKind::Unknown("flux-capacitor".to_string())
        );
        assert_eq!(
            event.connection_type,
            ConnectionKind::Unknown("warp".to_string())
        );
    }

    #[test]
    fn network_addresses_accept_prefixes() {
        let line = r#"{
            "eventType": "change-connection",
            "connectionType": "network-network",
            "initiatorAddress": "10.0.0.0/16",
            "responderAddress": "192.168.0.0/24",
            "session": "",
            "timestamp": 5
        }"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(event.initiator_address.prefix(), 16);
        assert_eq!(event.responder_address.prefix(), 24);
    }
}
