//! Remote event dispatcher and connection resolver.
//!
//! One entry point: [`RemoteAnalyzer::process_event`] takes a single probe
//! event, figures out which locally tracked connection it refers to (creating
//! one when the event announces a new connection), folds the event's counters
//! into that record, and for RTT events reconciles the sample into an
//! absolute timestamp pair for the RTT sink.
//!
//! Every failure is soft: the offending event is dropped with a log line and
//! the analyzer stays callable for the next one. No partial records are
//! created, and a failed event mutates nothing.

use std::sync::Arc;

use tracing::{error, warn};

use crate::connection::ICMP_ECHO_REPLY;
use crate::error::EventError;
use crate::events::{ConnectionKind, Direction, Event, EventKind, MeasurementKind};
use crate::rtt::{ConnectionRttSink, RttSample, RttSink};
use crate::session;
use crate::table::{ConnectionHandle, ConnectionTable};

/// Correlates events from remote probe instances into the shared table.
pub struct RemoteAnalyzer {
    table: Arc<ConnectionTable>,
    rtt_sink: Arc<dyn RttSink>,
}

impl RemoteAnalyzer {
    /// Analyzer with the default sink, which folds RTT samples into the
    /// connection records themselves.
    pub fn new(table: Arc<ConnectionTable>) -> Self {
        Self::with_rtt_sink(table, Arc::new(ConnectionRttSink))
    }

    pub fn with_rtt_sink(table: Arc<ConnectionTable>, rtt_sink: Arc<dyn RttSink>) -> Self {
        Self { table, rtt_sink }
    }

    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.table
    }

    /// Process one event from a remote probe.
    ///
    /// Returns the affected connection handle, or `None` when no connection
    /// could be identified or created (the failure has already been logged).
    pub fn process_event(&self, event: &Event) -> Option<ConnectionHandle> {
        let result = match &event.event_type {
            EventKind::NewConnection => self.on_new_connection(event),
            EventKind::ChangeConnection => self.on_change_connection(event),
            EventKind::ConnectionDelete => self.on_connection_delete(event),
            EventKind::NewRttMeasurement => self.on_new_rtt_measurement(event),
            EventKind::SpinFlip => self.on_spin_flip(event),
            EventKind::SpinValue => self.on_spin_value(event),
            EventKind::EcnCongestionEvent => self.on_ecn_congestion_event(event),
            EventKind::Unknown(tag) => Err(EventError::UnknownEventKind(tag.clone())),
        };
        match result {
            Ok(handle) => Some(handle),
            Err(err) if err.is_schema_error() => {
                error!(%err, "dropping remote event");
                None
            }
            Err(err) => {
                warn!(%err, "dropping remote event");
                None
            }
        }
    }

    fn on_new_connection(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        let handle = self.create_connection(event)?;
        handle.lock().absorb_remote_counters(event);
        Ok(handle)
    }

    fn on_change_connection(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        self.find_and_merge(event)
    }

    /// Deletion is two-phase: this only captures the event's final counters.
    /// Removal timing belongs to the table owner's lifecycle policy.
    fn on_connection_delete(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        self.find_and_merge(event)
    }

    fn on_new_rtt_measurement(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        let payload = event.rtt_measurement.ok_or(EventError::MissingRttPayload)?;
        let handle = self.find_and_merge(event)?;

        // Reconcile the scalar sample into an absolute timestamp pair. An
        // implausible sample (rtt larger than the capture timestamp, e.g. on
        // clock-base misalignment) floors the send time at zero instead of
        // wrapping.
        let received = event.timestamp;
        let sent = if payload.rtt <= received {
            received - payload.rtt
        } else {
            0
        };
        let sample = RttSample {
            from_responder: payload.direction == Direction::FromResponder,
            unidirectional: payload.measurement == MeasurementKind::Unidirectional,
            sent,
            received,
        };
        self.rtt_sink.record(&handle, sample, "remote update");
        Ok(handle)
    }

    // Spin and ECN signals carry nothing for the local record beyond the
    // statistics merge.
    fn on_spin_flip(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        self.find_and_merge(event)
    }

    fn on_spin_value(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        self.find_and_merge(event)
    }

    fn on_ecn_congestion_event(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        self.find_and_merge(event)
    }

    fn find_and_merge(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        let handle = self.find_connection(event)?;
        handle.lock().absorb_remote_counters(event);
        Ok(handle)
    }

    /// Create the connection announced by a new-connection event.
    fn create_connection(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        let when = event.timestamp;
        let handle = match &event.connection_type {
            ConnectionKind::Tcp => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table
                    .create_tcp(side1, side2, side1_port, side2_port, when)
            }
            ConnectionKind::Udp => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table
                    .create_udp(side1, side2, side1_port, side2_port, when)
            }
            ConnectionKind::Dns => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table
                    .create_dns(side1, side2, side1_port, side2_port, when)
            }
            ConnectionKind::Coap => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table
                    .create_coap(side1, side2, side1_port, side2_port, when)
            }
            ConnectionKind::Quic => {
                let (side1, side2) = session::host_pair(event)?;
                let (first_cid, second_cid) = session::parse_cid_pair(&event.session)?;
                // The event schema does not carry QUIC ports yet; zero-fill
                // until it does.
                let side1_port = 0;
                let side2_port = 0;
                // The second textual CID is the initiator-facing one, so the
                // pair goes to the table swapped relative to the session
                // text. TODO: confirm the half ordering against the probe's
                // event encoder before changing it; it is wire compatibility.
                self.table.create_quic(
                    side1,
                    side2,
                    side1_port,
                    side2_port,
                    second_cid,
                    first_cid,
                    when,
                )
            }
            ConnectionKind::Icmp => {
                let (side1, side2) = session::host_pair(event)?;
                let peer_id = session::parse_icmp_session_id(&event.session)?;
                self.table
                    .create_icmp(side1, side2, ICMP_ECHO_REPLY, peer_id, when)
            }
            ConnectionKind::HostPair => {
                let (side1, side2) = session::host_pair(event)?;
                self.table.create_hostpair(side1, side2, when)
            }
            ConnectionKind::HostNetwork => {
                let side1 = session::side1_host(event)?;
                self.table
                    .create_hostnetwork(side1, event.responder_address, when)
            }
            ConnectionKind::NetworkNetwork => self.table.create_networknetwork(
                event.initiator_address,
                event.responder_address,
                when,
            ),
            ConnectionKind::MulticastGroup => {
                let group = session::side1_host(event)?;
                self.table.create_multicastgroup(group, when)
            }
            ConnectionKind::Unknown(tag) => {
                return Err(EventError::UnknownConnectionKind(tag.clone()))
            }
        };
        Ok(handle)
    }

    /// Find the already tracked connection an event refers to.
    ///
    /// By the time the table is consulted the event is structurally valid, so
    /// a miss is a distinct lookup error rather than a decode failure.
    fn find_connection(&self, event: &Event) -> Result<ConnectionHandle, EventError> {
        let found = match &event.connection_type {
            ConnectionKind::Tcp => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table.search_tcp(side1, side2, side1_port, side2_port)
            }
            ConnectionKind::Udp => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table.search_udp(side1, side2, side1_port, side2_port)
            }
            ConnectionKind::Dns => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table.search_dns(side1, side2, side1_port, side2_port)
            }
            ConnectionKind::Coap => {
                let (side1, side2) = session::host_pair(event)?;
                let (side1_port, side2_port) = session::parse_port_pair(&event.session)?;
                self.table.search_coap(side1, side2, side1_port, side2_port)
            }
            ConnectionKind::Quic => {
                session::host_pair(event)?;
                let (first_cid, second_cid) = session::parse_cid_pair(&event.session)?;
                self.table.search_quic_cids(first_cid, second_cid)
            }
            ConnectionKind::Icmp => {
                let (side1, side2) = session::host_pair(event)?;
                let peer_id = session::parse_icmp_session_id(&event.session)?;
                self.table
                    .search_icmp(side1, side2, ICMP_ECHO_REPLY, peer_id)
            }
            ConnectionKind::HostPair => {
                let (side1, side2) = session::host_pair(event)?;
                self.table.search_hostpair(side1, side2)
            }
            ConnectionKind::HostNetwork => {
                let side1 = session::side1_host(event)?;
                self.table.search_hostnetwork(side1, event.responder_address)
            }
            ConnectionKind::NetworkNetwork => self
                .table
                .search_networknetwork(event.initiator_address, event.responder_address),
            ConnectionKind::MulticastGroup => {
                let group = session::side1_host(event)?;
                self.table.search_multicastgroup(group)
            }
            ConnectionKind::Unknown(tag) => {
                return Err(EventError::UnknownConnectionKind(tag.clone()))
            }
        };
        found.ok_or(EventError::UnknownConnection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionKey;
    use crate::events::RttMeasurement;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn analyzer() -> RemoteAnalyzer {
        RemoteAnalyzer::new(Arc::new(ConnectionTable::new()))
    }

    fn event(
        event_type: EventKind,
        connection_type: ConnectionKind,
        session: &str,
        timestamp: u64,
    ) -> Event {
        Event {
            event_type,
            connection_type,
            initiator_address: "10.0.0.1".parse().unwrap(),
            responder_address: "10.0.0.2".parse().unwrap(),
            session: session.to_string(),
            timestamp,
            packets_from_side1: 0,
            packets_from_side2: 0,
            bytes_from_side1: 0,
            bytes_from_side2: 0,
            rtt_measurement: None,
        }
    }

    #[test]
    fn tcp_new_connection_creates_and_seeds_counters() {
        let analyzer = analyzer();
        let mut new_connection =
            event(EventKind::NewConnection, ConnectionKind::Tcp, "443:51000", 100);
        new_connection.packets_from_side1 = 3;
        new_connection.bytes_from_side1 = 512;

        let handle = analyzer.process_event(&new_connection).unwrap();
        let connection = handle.lock();
        assert_eq!(
            connection.key,
            ConnectionKey::Tcp {
                side1: "10.0.0.1".parse().unwrap(),
                side2: "10.0.0.2".parse().unwrap(),
                side1_port: 443,
                side2_port: 51000,
            }
        );
        assert_eq!(connection.created_at, 100);
        assert_eq!(connection.packets_from_side1, 3);
        assert_eq!(connection.bytes_from_side1, 512);
        assert_eq!(connection.latest_packet_from_side1, Some(100));
    }

    #[test]
    fn tcp_new_connection_between_networks_is_rejected() {
        let analyzer = analyzer();
        let mut bad = event(EventKind::NewConnection, ConnectionKind::Tcp, "443:51000", 0);
        bad.initiator_address = "10.0.0.0/24".parse().unwrap();
        assert!(analyzer.process_event(&bad).is_none());
        assert!(analyzer.table().is_empty());
    }

    #[test]
    fn malformed_session_creates_nothing() {
        let analyzer = analyzer();
        let bad = event(EventKind::NewConnection, ConnectionKind::Udp, "443-51000", 0);
        assert!(analyzer.process_event(&bad).is_none());
        assert!(analyzer.table().is_empty());
    }

    #[test]
    fn quic_create_stores_cids_swapped() {
        let analyzer = analyzer();
        let new_connection =
            event(EventKind::NewConnection, ConnectionKind::Quic, "ab12-cd34ef", 5);
        let handle = analyzer.process_event(&new_connection).unwrap();

        let connection = handle.lock();
        match &connection.key {
            ConnectionKey::Quic {
                side1_cid,
                side2_cid,
            } => {
                // The second textual half becomes side1 (initiator-facing).
                assert_eq!(side1_cid.as_bytes(), &[0xcd, 0x34, 0xef]);
                assert_eq!(side2_cid.as_bytes(), &[0xab, 0x12]);
            }
            other => panic!("expected a QUIC key, got {other:?}"),
        }
        // Ports are zero-filled: the event schema has no QUIC port fields.
        let endpoints = connection.quic_endpoints.unwrap();
        assert_eq!(endpoints.side1_port, 0);
        assert_eq!(endpoints.side2_port, 0);
    }

    #[test]
    fn quic_change_finds_the_connection_despite_the_create_swap() {
        let analyzer = analyzer();
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Quic, "ab12-cd34ef", 5))
            .unwrap();
        let change = event(EventKind::ChangeConnection, ConnectionKind::Quic, "ab12-cd34ef", 9);
        assert!(analyzer.process_event(&change).is_some());
        assert_eq!(analyzer.table().len(), 1);
    }

    #[test]
    fn icmp_new_connection_uses_the_peer_id() {
        let analyzer = analyzer();
        let handle = analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Icmp, "1234", 0))
            .unwrap();
        assert_eq!(
            handle.lock().key,
            ConnectionKey::Icmp {
                side1: "10.0.0.1".parse().unwrap(),
                side2: "10.0.0.2".parse().unwrap(),
                icmp_type: ICMP_ECHO_REPLY,
                peer_id: 1234,
            }
        );
    }

    #[test]
    fn aggregate_kinds_resolve_without_session_text() {
        let analyzer = analyzer();
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::HostPair, "", 0))
            .unwrap();

        let mut host_network = event(EventKind::NewConnection, ConnectionKind::HostNetwork, "", 0);
        host_network.responder_address = "192.168.0.0/16".parse().unwrap();
        analyzer.process_event(&host_network).unwrap();

        let mut network_network =
            event(EventKind::NewConnection, ConnectionKind::NetworkNetwork, "", 0);
        network_network.initiator_address = "10.0.0.0/8".parse().unwrap();
        network_network.responder_address = "192.168.0.0/16".parse().unwrap();
        analyzer.process_event(&network_network).unwrap();

        let mut multicast = event(EventKind::NewConnection, ConnectionKind::MulticastGroup, "", 0);
        multicast.responder_address = "224.0.0.0/4".parse().unwrap();
        analyzer.process_event(&multicast).unwrap();

        assert_eq!(analyzer.table().len(), 4);
    }

    #[test]
    fn multicast_group_requires_a_host_initiator() {
        let analyzer = analyzer();
        let mut bad = event(EventKind::NewConnection, ConnectionKind::MulticastGroup, "", 0);
        bad.initiator_address = "10.0.0.0/24".parse().unwrap();
        assert!(analyzer.process_event(&bad).is_none());
    }

    #[traced_test]
    #[test]
    fn change_on_unknown_connection_reports_a_lookup_error() {
        let analyzer = analyzer();
        let change = event(EventKind::ChangeConnection, ConnectionKind::Tcp, "443:51000", 10);
        assert!(analyzer.process_event(&change).is_none());
        assert!(analyzer.table().is_empty());
        assert!(logs_contain(
            "cannot find the connection referred to by the event"
        ));
    }

    #[test]
    fn delete_merges_final_counters_but_keeps_the_record() {
        let analyzer = analyzer();
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Tcp, "443:51000", 0))
            .unwrap();

        let mut delete = event(EventKind::ConnectionDelete, ConnectionKind::Tcp, "443:51000", 50);
        delete.packets_from_side2 = 9;
        delete.bytes_from_side2 = 900;
        let handle = analyzer.process_event(&delete).unwrap();

        assert_eq!(analyzer.table().len(), 1);
        let connection = handle.lock();
        assert_eq!(connection.packets_from_side2, 9);
        assert_eq!(connection.bytes_from_side2, 900);
        assert_eq!(connection.latest_packet_from_side2, Some(50));
    }

    #[test]
    fn spin_and_ecn_events_only_merge_statistics() {
        let analyzer = analyzer();
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Quic, "ab12-cd34ef", 0))
            .unwrap();

        for (kind, timestamp, packets) in [
            (EventKind::SpinFlip, 10u64, 1u64),
            (EventKind::SpinValue, 20, 2),
            (EventKind::EcnCongestionEvent, 30, 3),
        ] {
            let mut signal = event(kind, ConnectionKind::Quic, "ab12-cd34ef", timestamp);
            signal.packets_from_side1 = packets;
            let handle = analyzer.process_event(&signal).unwrap();
            let connection = handle.lock();
            assert_eq!(connection.packets_from_side1, packets);
            assert_eq!(connection.latest_packet_from_side1, Some(timestamp));
        }
    }

    #[test]
    fn rtt_event_reconciles_sent_and_received_times() {
        let analyzer = analyzer();
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Icmp, "7", 0))
            .unwrap();

        let mut rtt = event(EventKind::NewRttMeasurement, ConnectionKind::Icmp, "7", 1000);
        rtt.rtt_measurement = Some(RttMeasurement {
            rtt: 300,
            direction: Direction::FromResponder,
            measurement: MeasurementKind::Bidirectional,
        });
        let handle = analyzer.process_event(&rtt).unwrap();
        // sent = 1000 - 300; the sink sees the 300us difference again.
        assert_eq!(handle.lock().rtt_from_responder.latest, Some(300));
        assert_eq!(handle.lock().rtt_from_initiator.latest, None);
    }

    #[test]
    fn implausible_rtt_floors_the_sent_time_at_zero() {
        struct Capture(Mutex<Vec<RttSample>>);
        impl RttSink for Capture {
            fn record(&self, _connection: &ConnectionHandle, sample: RttSample, _origin: &str) {
                self.0.lock().push(sample);
            }
        }

        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let analyzer = RemoteAnalyzer::with_rtt_sink(
            Arc::new(ConnectionTable::new()),
            Arc::<Capture>::clone(&sink),
        );
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Icmp, "7", 0))
            .unwrap();

        let mut rtt = event(EventKind::NewRttMeasurement, ConnectionKind::Icmp, "7", 1000);
        rtt.rtt_measurement = Some(RttMeasurement {
            rtt: 1500,
            direction: Direction::FromInitiator,
            measurement: MeasurementKind::Unidirectional,
        });
        analyzer.process_event(&rtt).unwrap();

        let samples = sink.0.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].sent, 0);
        assert_eq!(samples[0].received, 1000);
        assert!(!samples[0].from_responder);
        assert!(samples[0].unidirectional);
    }

    #[test]
    fn rtt_direction_and_measurement_map_to_sink_flags() {
        struct Capture(Mutex<Vec<RttSample>>);
        impl RttSink for Capture {
            fn record(&self, _connection: &ConnectionHandle, sample: RttSample, _origin: &str) {
                self.0.lock().push(sample);
            }
        }

        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let analyzer = RemoteAnalyzer::with_rtt_sink(
            Arc::new(ConnectionTable::new()),
            Arc::<Capture>::clone(&sink),
        );
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Icmp, "7", 0))
            .unwrap();

        let mut rtt = event(EventKind::NewRttMeasurement, ConnectionKind::Icmp, "7", 1000);
        rtt.rtt_measurement = Some(RttMeasurement {
            rtt: 300,
            direction: Direction::FromResponder,
            measurement: MeasurementKind::Unidirectional,
        });
        analyzer.process_event(&rtt).unwrap();

        let samples = sink.0.lock();
        assert!(samples[0].from_responder);
        assert!(samples[0].unidirectional);
        assert_eq!(samples[0].sent, 700);
        assert_eq!(samples[0].received, 1000);
    }

    #[test]
    fn rtt_event_without_payload_is_a_schema_error() {
        let analyzer = analyzer();
        analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Icmp, "7", 0))
            .unwrap();
        let handle = {
            let rtt = event(EventKind::NewRttMeasurement, ConnectionKind::Icmp, "7", 1000);
            analyzer.process_event(&rtt)
        };
        assert!(handle.is_none());
        // The missing payload is caught before any counter merge.
        let existing = analyzer.table().search_icmp(
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            ICMP_ECHO_REPLY,
            7,
        );
        assert_eq!(existing.unwrap().lock().latest_packet_from_side1, None);
    }

    #[traced_test]
    #[test]
    fn unknown_event_kind_mutates_nothing() {
        let analyzer = analyzer();
        let bad = event(
            EventKind::Unknown("flux-capacitor".to_string()),
            ConnectionKind::Tcp,
            "443:51000",
            0,
        );
        assert!(analyzer.process_event(&bad).is_none());
        assert!(analyzer.table().is_empty());
        assert!(logs_contain("invalid event type"));
    }

    #[test]
    fn unknown_connection_kind_mutates_nothing() {
        let analyzer = analyzer();
        let bad = event(
            EventKind::NewConnection,
            ConnectionKind::Unknown("warp".to_string()),
            "",
            0,
        );
        assert!(analyzer.process_event(&bad).is_none());
        assert!(analyzer.table().is_empty());
    }

    #[test]
    fn repeated_new_connection_yields_one_record() {
        let analyzer = analyzer();
        let first = analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Tcp, "443:51000", 0))
            .unwrap();
        let second = analyzer
            .process_event(&event(EventKind::NewConnection, ConnectionKind::Tcp, "443:51000", 10))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(analyzer.table().len(), 1);
    }
}
