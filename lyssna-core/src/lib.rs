//! # lyssna-core
//!
//! Event-correlation core of a passive, distributed network-measurement
//! tool. Remote probe instances watch live traffic and emit discrete events
//! (connection lifecycle, RTT samples, QUIC spin-bit transitions, ECN
//! congestion marks); this crate takes one event at a time, resolves which
//! locally tracked connection it refers to, and folds the event's payload
//! into that connection's authoritative state.
//!
//! ### Key Submodules:
//! - `events`: typed form of the probe wire events
//! - `session`: per-kind session-key grammar (ports, ICMP id, CID pair)
//! - `table`: shared connection table with per-kind create/search
//! - `analyzer`: the dispatcher, one `process_event` call per event
//! - `rtt`: reconciled RTT sample hand-off
//!
//! No operation here blocks on I/O; everything is in-memory decode, compare
//! and write. Failures are reported through `tracing` and never abort the
//! process.

pub mod analyzer;
pub mod connection;
pub mod error;
pub mod events;
pub mod net;
pub mod rtt;
pub mod session;
pub mod table;

pub use analyzer::RemoteAnalyzer;
pub use connection::{Connection, ConnectionId, ConnectionKey, QUIC_CID_MAX_LEN};
pub use error::EventError;
pub use events::{ConnectionKind, Event, EventKind, Timestamp};
pub use rtt::{ConnectionRttSink, RttSample, RttSink};
pub use table::{ConnectionHandle, ConnectionTable};

pub mod prelude {
    pub use crate::analyzer::RemoteAnalyzer;
    pub use crate::connection::{Connection, ConnectionId, ConnectionKey};
    pub use crate::error::EventError;
    pub use crate::events::{ConnectionKind, Event, EventKind, Timestamp};
    pub use crate::rtt::{ConnectionRttSink, RttSample, RttSink};
    pub use crate::table::{ConnectionHandle, ConnectionTable};
}
