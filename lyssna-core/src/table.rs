//! Shared connection table.
//!
//! The table is mutated from two independent paths: this crate's remote-event
//! dispatcher and the live-capture analyzers that track local traffic. Access
//! is serialized with `parking_lot` locks, table-wide for index changes and
//! per-record for state merges, so a handle can be held and mutated without
//! pinning the whole table.
//!
//! One create/search pair per connection kind, mirroring the identity rules
//! in [`ConnectionKey`]. Creation is idempotent per identity: at most one
//! record ever exists for a given key.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use tracing::debug;

use crate::connection::{Connection, ConnectionId, ConnectionKey, QuicEndpoints};
use crate::events::Timestamp;

/// Shared, individually lockable reference to one connection record.
pub type ConnectionHandle = Arc<Mutex<Connection>>;

/// Table of all connections this analyzer instance is tracking.
#[derive(Default)]
pub struct ConnectionTable {
    connections: Mutex<HashMap<ConnectionKey, ConnectionHandle>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Snapshot of all current handles, for reporting.
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.lock().values().cloned().collect()
    }

    pub fn create_tcp(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(
            ConnectionKey::Tcp {
                side1,
                side2,
                side1_port,
                side2_port,
            },
            when,
        )
    }

    pub fn search_tcp(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::Tcp {
            side1,
            side2,
            side1_port,
            side2_port,
        })
    }

    pub fn create_udp(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(
            ConnectionKey::Udp {
                side1,
                side2,
                side1_port,
                side2_port,
            },
            when,
        )
    }

    pub fn search_udp(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::Udp {
            side1,
            side2,
            side1_port,
            side2_port,
        })
    }

    pub fn create_dns(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(
            ConnectionKey::Dns {
                side1,
                side2,
                side1_port,
                side2_port,
            },
            when,
        )
    }

    pub fn search_dns(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::Dns {
            side1,
            side2,
            side1_port,
            side2_port,
        })
    }

    pub fn create_coap(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(
            ConnectionKey::Coap {
                side1,
                side2,
                side1_port,
                side2_port,
            },
            when,
        )
    }

    pub fn search_coap(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::Coap {
            side1,
            side2,
            side1_port,
            side2_port,
        })
    }

    /// Create a QUIC connection from its full five-tuple plus CID pair.
    ///
    /// The key is the CID pair alone; the endpoints are stored on the record.
    #[allow(clippy::too_many_arguments)]
    pub fn create_quic(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        side1_port: u16,
        side2_port: u16,
        side1_cid: ConnectionId,
        side2_cid: ConnectionId,
        when: Timestamp,
    ) -> ConnectionHandle {
        let handle = self.create(
            ConnectionKey::Quic {
                side1_cid,
                side2_cid,
            },
            when,
        );
        handle.lock().quic_endpoints = Some(QuicEndpoints {
            side1,
            side2,
            side1_port,
            side2_port,
        });
        handle
    }

    /// Look up a QUIC connection by CID pair, in either orientation.
    ///
    /// Remote feeds and local capture may disagree about which CID they saw
    /// first, so both orderings name the same record.
    pub fn search_quic_cids(
        &self,
        side1_cid: ConnectionId,
        side2_cid: ConnectionId,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::Quic {
            side1_cid,
            side2_cid,
        })
    }

    pub fn create_icmp(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        icmp_type: u8,
        peer_id: u16,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(
            ConnectionKey::Icmp {
                side1,
                side2,
                icmp_type,
                peer_id,
            },
            when,
        )
    }

    pub fn search_icmp(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        icmp_type: u8,
        peer_id: u16,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::Icmp {
            side1,
            side2,
            icmp_type,
            peer_id,
        })
    }

    pub fn create_hostpair(
        &self,
        side1: IpAddr,
        side2: IpAddr,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(ConnectionKey::HostPair { side1, side2 }, when)
    }

    pub fn search_hostpair(&self, side1: IpAddr, side2: IpAddr) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::HostPair { side1, side2 })
    }

    pub fn create_hostnetwork(
        &self,
        side1: IpAddr,
        side2: IpNetwork,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(ConnectionKey::HostNetwork { side1, side2 }, when)
    }

    pub fn search_hostnetwork(&self, side1: IpAddr, side2: IpNetwork) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::HostNetwork { side1, side2 })
    }

    pub fn create_networknetwork(
        &self,
        side1: IpNetwork,
        side2: IpNetwork,
        when: Timestamp,
    ) -> ConnectionHandle {
        self.create(ConnectionKey::NetworkNetwork { side1, side2 }, when)
    }

    pub fn search_networknetwork(
        &self,
        side1: IpNetwork,
        side2: IpNetwork,
    ) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::NetworkNetwork { side1, side2 })
    }

    pub fn create_multicastgroup(&self, group: IpAddr, when: Timestamp) -> ConnectionHandle {
        self.create(ConnectionKey::MulticastGroup { group }, when)
    }

    pub fn search_multicastgroup(&self, group: IpAddr) -> Option<ConnectionHandle> {
        self.search(&ConnectionKey::MulticastGroup { group })
    }

    fn create(&self, key: ConnectionKey, when: Timestamp) -> ConnectionHandle {
        let mut connections = self.connections.lock();
        if let Some(existing) = Self::lookup(&connections, &key) {
            return existing;
        }
        debug!(kind = key.kind_label(), "tracking new remote connection");
        let handle = Arc::new(Mutex::new(Connection::new(key.clone(), when)));
        connections.insert(key, Arc::clone(&handle));
        handle
    }

    fn search(&self, key: &ConnectionKey) -> Option<ConnectionHandle> {
        Self::lookup(&self.connections.lock(), key)
    }

    fn lookup(
        connections: &HashMap<ConnectionKey, ConnectionHandle>,
        key: &ConnectionKey,
    ) -> Option<ConnectionHandle> {
        if let Some(handle) = connections.get(key) {
            return Some(Arc::clone(handle));
        }
        // QUIC keys match with their CID pair flipped as well.
        if let ConnectionKey::Quic {
            side1_cid,
            side2_cid,
        } = key
        {
            let flipped = ConnectionKey::Quic {
                side1_cid: *side2_cid,
                side2_cid: *side1_cid,
            };
            return connections.get(&flipped).map(Arc::clone);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn create_is_idempotent_per_identity() {
        let table = ConnectionTable::new();
        let first = table.create_tcp(addr("10.0.0.1"), addr("10.0.0.2"), 443, 51000, 100);
        let second = table.create_tcp(addr("10.0.0.1"), addr("10.0.0.2"), 443, 51000, 200);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
        // The original creation time stands.
        assert_eq!(first.lock().created_at, 100);
    }

    #[test]
    fn kinds_do_not_collide() {
        let table = ConnectionTable::new();
        table.create_tcp(addr("10.0.0.1"), addr("10.0.0.2"), 443, 51000, 0);
        table.create_udp(addr("10.0.0.1"), addr("10.0.0.2"), 443, 51000, 0);
        assert_eq!(table.len(), 2);
        assert!(table
            .search_dns(addr("10.0.0.1"), addr("10.0.0.2"), 443, 51000)
            .is_none());
    }

    #[test]
    fn quic_search_matches_either_cid_orientation() {
        let table = ConnectionTable::new();
        let cid_a = ConnectionId::from_bytes(&[0xab, 0x12]).unwrap();
        let cid_b = ConnectionId::from_bytes(&[0xcd, 0x34, 0xef]).unwrap();
        let created = table.create_quic(
            addr("10.0.0.1"),
            addr("10.0.0.2"),
            0,
            0,
            cid_a,
            cid_b,
            7,
        );

        let forward = table.search_quic_cids(cid_a, cid_b).unwrap();
        let flipped = table.search_quic_cids(cid_b, cid_a).unwrap();
        assert!(Arc::ptr_eq(&created, &forward));
        assert!(Arc::ptr_eq(&created, &flipped));

        let endpoints = created.lock().quic_endpoints.unwrap();
        assert_eq!(endpoints.side1_port, 0);
        assert_eq!(endpoints.side2_port, 0);
    }

    #[test]
    fn search_misses_report_none() {
        let table = ConnectionTable::new();
        assert!(table
            .search_icmp(addr("10.0.0.1"), addr("10.0.0.2"), 0, 77)
            .is_none());
        assert!(table.search_multicastgroup(addr("224.0.0.9")).is_none());
    }
}
