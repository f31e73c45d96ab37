//! RTT sample hand-off.
//!
//! The dispatcher reconciles each remote RTT event into an absolute
//! sent/received timestamp pair and hands it to an [`RttSink`]. The default
//! sink folds the sample into the connection record's per-direction tracks;
//! a deployment wanting different aggregation plugs in its own sink.

use tracing::trace;

use crate::events::Timestamp;
use crate::table::ConnectionHandle;

/// One reconciled RTT observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    /// True when the sample was measured from the responder's side.
    pub from_responder: bool,
    /// True for one-way delay samples, false for full round trips.
    pub unidirectional: bool,
    /// When the measured packet was sent (floored at zero on underflow).
    pub sent: Timestamp,
    /// When the measured packet was received.
    pub received: Timestamp,
}

/// Consumer of reconciled RTT samples.
pub trait RttSink: Send + Sync {
    /// Record one sample against a connection. Fire-and-forget; must not fail.
    fn record(&self, connection: &ConnectionHandle, sample: RttSample, origin: &str);
}

/// Default sink: update the connection's own RTT tracks.
#[derive(Debug, Default)]
pub struct ConnectionRttSink;

impl RttSink for ConnectionRttSink {
    fn record(&self, connection: &ConnectionHandle, sample: RttSample, origin: &str) {
        let rtt = sample.received.saturating_sub(sample.sent);
        let mut connection = connection.lock();
        let track = if sample.from_responder {
            &mut connection.rtt_from_responder
        } else {
            &mut connection.rtt_from_initiator
        };
        track.observe(rtt);
        trace!(
            kind = connection.key.kind_label(),
            rtt_us = rtt,
            from_responder = sample.from_responder,
            unidirectional = sample.unidirectional,
            origin,
            "recorded RTT sample"
        );
    }
}
