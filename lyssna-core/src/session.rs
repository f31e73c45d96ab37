//! Session-key codec.
//!
//! The session field of a probe event is opaque text whose grammar depends on
//! the connection kind: `"<u16>:<u16>"` for port pairs, `"<u16>"` for ICMP
//! echo identifiers, and `"<hex>-<hex>"` (even-length halves) for QUIC CID
//! pairs. Each decode is pure and leaves no state behind; a failure aborts
//! processing of the one event it came from.

use std::net::IpAddr;

use crate::connection::{ConnectionId, QUIC_CID_MAX_LEN};
use crate::error::EventError;
use crate::events::Event;
use crate::net;

/// Require both endpoints of the event to be single hosts.
///
/// Used by every non-aggregate kind plus the host-pair aggregate.
pub fn host_pair(event: &Event) -> Result<(IpAddr, IpAddr), EventError> {
    match (
        net::host_address(&event.initiator_address),
        net::host_address(&event.responder_address),
    ) {
        (Some(side1), Some(side2)) => Ok((side1, side2)),
        _ => Err(EventError::NonHostEndpoints),
    }
}

/// Require the initiator endpoint to be a single host.
///
/// Used by the host-network and multicast-group aggregates, whose responder
/// side is a network (or absent) by definition.
pub fn side1_host(event: &Event) -> Result<IpAddr, EventError> {
    net::host_address(&event.initiator_address).ok_or(EventError::InitiatorNotHost)
}

/// Decode a `"<u16>:<u16>"` port pair session identifier.
pub fn parse_port_pair(session: &str) -> Result<(u16, u16), EventError> {
    let malformed = || EventError::MalformedPortPair(session.to_string());
    let (side1, side2) = session.split_once(':').ok_or_else(malformed)?;
    let side1: u64 = side1.parse().map_err(|_| malformed())?;
    let side2: u64 = side2.parse().map_err(|_| malformed())?;
    if side1 > u64::from(u16::MAX) {
        return Err(EventError::PortOutOfRange(side1));
    }
    if side2 > u64::from(u16::MAX) {
        return Err(EventError::PortOutOfRange(side2));
    }
    Ok((side1 as u16, side2 as u16))
}

/// Decode a `"<u16>"` ICMP echo identifier session.
pub fn parse_icmp_session_id(session: &str) -> Result<u16, EventError> {
    let id: u64 = session
        .parse()
        .map_err(|_| EventError::MalformedIcmpId(session.to_string()))?;
    if id > u64::from(u16::MAX) {
        return Err(EventError::IcmpIdOutOfRange(id));
    }
    Ok(id as u16)
}

/// Decode a `"<hex>-<hex>"` QUIC CID pair session identifier.
///
/// The split point is the first hyphen in the string; each half must be
/// even-length hex of at most [`QUIC_CID_MAX_LEN`] decoded bytes.
pub fn parse_cid_pair(session: &str) -> Result<(ConnectionId, ConnectionId), EventError> {
    let (first, second) = session
        .split_once('-')
        .ok_or_else(|| EventError::CidPairMissingSeparator(session.to_string()))?;
    Ok((parse_cid(first)?, parse_cid(second)?))
}

fn parse_cid(text: &str) -> Result<ConnectionId, EventError> {
    if text.len() % 2 != 0 {
        return Err(EventError::OddCidLength(text.len()));
    }
    if text.len() / 2 > QUIC_CID_MAX_LEN {
        return Err(EventError::CidTooLong(text.len() / 2));
    }
    let raw = hex::decode(text).map_err(|_| EventError::InvalidCidHex)?;
    ConnectionId::from_bytes(&raw)
}
