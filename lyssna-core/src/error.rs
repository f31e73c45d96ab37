//! Failure taxonomy for remote event processing.
//!
//! Nothing here is ever fatal: every variant aborts processing of a single
//! event and leaves existing connection state untouched. The dispatcher maps
//! decode and lookup failures to `warn!` logs and schema failures (probe and
//! analyzer disagree about the vocabulary) to `error!` logs.

use thiserror::Error;

use crate::connection::QUIC_CID_MAX_LEN;

/// Everything that can go wrong while correlating one remote event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    // Decode errors: the event's addresses or session text do not fit the
    // shape its connection kind requires.
    #[error("a non-aggregate connection must be between hosts")]
    NonHostEndpoints,

    #[error("initiator in this aggregate connection must be a host address")]
    InitiatorNotHost,

    #[error("cannot parse port pair session identifier {0:?}")]
    MalformedPortPair(String),

    #[error("port values cannot be more than 16 bits")]
    PortOutOfRange(u64),

    #[error("cannot parse ICMP session identifier {0:?}")]
    MalformedIcmpId(String),

    #[error("ICMP session identifier must be 16 bits")]
    IcmpIdOutOfRange(u64),

    #[error("QUIC connection id pair {0:?} does not have a separator")]
    CidPairMissingSeparator(String),

    #[error("QUIC connection id string cannot have odd length")]
    OddCidLength(usize),

    #[error("QUIC connection id cannot be longer than {QUIC_CID_MAX_LEN} bytes, got {0}")]
    CidTooLong(usize),

    #[error("invalid character in QUIC connection id")]
    InvalidCidHex,

    // Lookup error: the event is structurally valid but refers to a
    // connection this analyzer is not tracking.
    #[error("cannot find the connection referred to by the event")]
    UnknownConnection,

    // Schema errors: version mismatch between probe and analyzer.
    #[error("invalid event type {0:?}")]
    UnknownEventKind(String),

    #[error("invalid connection type {0:?}")]
    UnknownConnectionKind(String),

    #[error("RTT measurement event is missing its payload")]
    MissingRttPayload,
}

impl EventError {
    /// Schema errors indicate a probe/analyzer version mismatch and are
    /// surfaced at higher visibility than per-event decode noise.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownEventKind(_) | Self::UnknownConnectionKind(_) | Self::MissingRttPayload
        )
    }
}
