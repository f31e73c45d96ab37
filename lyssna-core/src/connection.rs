//! Locally tracked connection records and their canonical identities.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::error::EventError;
use crate::events::{Event, Timestamp};

/// Maximum length of a QUIC connection ID in bytes.
pub const QUIC_CID_MAX_LEN: usize = 18;

/// ICMP echo reply type; remote echo sessions are keyed on the reply side.
pub const ICMP_ECHO_REPLY: u8 = 0;

/// A variable-length opaque QUIC connection identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    len: u8,
    bytes: [u8; QUIC_CID_MAX_LEN],
}

impl ConnectionId {
    pub fn from_bytes(raw: &[u8]) -> Result<Self, EventError> {
        if raw.len() > QUIC_CID_MAX_LEN {
            return Err(EventError::CidTooLong(raw.len()));
        }
        let mut bytes = [0u8; QUIC_CID_MAX_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self)
    }
}

/// Canonical identity of a tracked connection.
///
/// One variant per connection kind, so kind dispatch stays an exhaustive
/// `match` instead of a wide conditional. Transport flows are keyed by their
/// 5-tuple (QUIC by its CID pair, ICMP by peer id), aggregates by their
/// host/network relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    Tcp {
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    },
    Udp {
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    },
    Dns {
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    },
    Coap {
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    },
    /// QUIC connections are identified by their CID pair alone; the address
    /// five-tuple lives in [`Connection::quic_endpoints`].
    Quic {
        side1_cid: ConnectionId,
        side2_cid: ConnectionId,
    },
    Icmp {
        side1: IpAddr,
        side2: IpAddr,
        icmp_type: u8,
        peer_id: u16,
    },
    HostPair {
        side1: IpAddr,
        side2: IpAddr,
    },
    HostNetwork {
        side1: IpAddr,
        side2: IpNetwork,
    },
    NetworkNetwork {
        side1: IpNetwork,
        side2: IpNetwork,
    },
    MulticastGroup {
        group: IpAddr,
    },
}

impl ConnectionKey {
    /// Short label for logs and summaries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Udp { .. } => "udp",
            Self::Dns { .. } => "dns",
            Self::Coap { .. } => "coap",
            Self::Quic { .. } => "quic",
            Self::Icmp { .. } => "icmp",
            Self::HostPair { .. } => "host-pair",
            Self::HostNetwork { .. } => "host-network",
            Self::NetworkNetwork { .. } => "network-network",
            Self::MulticastGroup { .. } => "multicast-group",
        }
    }
}

/// Address five-tuple of a QUIC connection, kept outside the key because
/// lookups go by CID pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuicEndpoints {
    pub side1: IpAddr,
    pub side2: IpAddr,
    pub side1_port: u16,
    pub side2_port: u16,
}

/// Latest and smoothed RTT for one direction, in microseconds.
///
/// Smoothing is the classic 7/8 filter; the first sample seeds the estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RttTrack {
    pub latest: Option<u64>,
    pub smoothed: Option<u64>,
}

impl RttTrack {
    pub fn observe(&mut self, rtt: u64) {
        self.latest = Some(rtt);
        self.smoothed = Some(match self.smoothed {
            None => rtt,
            Some(smoothed) => {
                let delta = (rtt as i64 - smoothed as i64) / 8;
                (smoothed as i64 + delta) as u64
            }
        });
    }
}

/// One tracked connection.
///
/// Counters and "latest packet" timestamps never move backward under
/// [`Connection::absorb_remote_counters`]; a side's timestamp advances only
/// when that side's packet counter strictly increases.
#[derive(Debug, Clone)]
pub struct Connection {
    pub key: ConnectionKey,
    pub quic_endpoints: Option<QuicEndpoints>,
    pub created_at: Timestamp,
    pub packets_from_side1: u64,
    pub packets_from_side2: u64,
    pub bytes_from_side1: u64,
    pub bytes_from_side2: u64,
    pub latest_packet_from_side1: Option<Timestamp>,
    pub latest_packet_from_side2: Option<Timestamp>,
    pub rtt_from_initiator: RttTrack,
    pub rtt_from_responder: RttTrack,
}

impl Connection {
    pub fn new(key: ConnectionKey, when: Timestamp) -> Self {
        Self {
            key,
            quic_endpoints: None,
            created_at: when,
            packets_from_side1: 0,
            packets_from_side2: 0,
            bytes_from_side1: 0,
            bytes_from_side2: 0,
            latest_packet_from_side1: None,
            latest_packet_from_side2: None,
            rtt_from_initiator: RttTrack::default(),
            rtt_from_responder: RttTrack::default(),
        }
    }

    /// Fold the counters carried by every event into this record.
    ///
    /// The timestamp comparison must run against the old counter values, so
    /// it happens before the overwrite. The event's counters are taken as
    /// authoritative and copied without a clamp.
    pub fn absorb_remote_counters(&mut self, event: &Event) {
        if self.packets_from_side1 < event.packets_from_side1 {
            self.latest_packet_from_side1 = Some(event.timestamp);
        }
        if self.packets_from_side2 < event.packets_from_side2 {
            self.latest_packet_from_side2 = Some(event.timestamp);
        }

        self.packets_from_side1 = event.packets_from_side1;
        self.packets_from_side2 = event.packets_from_side2;
        self.bytes_from_side1 = event.bytes_from_side1;
        self.bytes_from_side2 = event.bytes_from_side2;
    }
}
