//! Address-or-network helpers.
//!
//! Probe events carry both endpoints as `IpNetwork` values so that a single
//! field can name either one host or an aggregate range. Connection kinds
//! that identify a single flow require full-prefix (single host) values.

use std::net::IpAddr;

use ipnetwork::IpNetwork;

/// True iff the value denotes exactly one host, not a wider range.
pub fn is_host(network: &IpNetwork) -> bool {
    match network {
        IpNetwork::V4(net) => net.prefix() == 32,
        IpNetwork::V6(net) => net.prefix() == 128,
    }
}

/// The single host address behind the value, if it is one.
pub fn host_address(network: &IpNetwork) -> Option<IpAddr> {
    is_host(network).then(|| network.ip())
}
