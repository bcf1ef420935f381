//! Collector address derivation from the mesh-local prefix.

use core::fmt;
use std::net::{Ipv6Addr, SocketAddrV6};

use serde::{Deserialize, Serialize};

/// Default CoAP port used for both requests and acknowledgements.
pub const COAP_DEFAULT_PORT: u16 = 5683;

/// Upper 64 bits of a mesh-local address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshLocalPrefix(pub [u8; 8]);

/// Lower 64 bits of an address: the interface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceId(pub [u8; 8]);

/// Well-known interface identifier the collector claims (`::1`).
pub const COLLECTOR_IID: InterfaceId = InterfaceId([0, 0, 0, 0, 0, 0, 0, 1]);

impl MeshLocalPrefix {
    /// Parse the first four hextets of an IPv6 prefix, e.g. `fdde:ad00:beef:0`.
    pub fn parse(input: &str) -> Option<Self> {
        let mut bytes = [0u8; 8];
        let mut groups = input.trim().trim_end_matches("::").split(':');
        for chunk in bytes.chunks_exact_mut(2) {
            let group = groups.next()?;
            if group.is_empty() || group.len() > 4 {
                return None;
            }
            let value = u16::from_str_radix(group, 16).ok()?;
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        if groups.next().is_some() {
            return None;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for MeshLocalPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hextets: Vec<String> = self
            .0
            .chunks_exact(2)
            .map(|pair| format!("{:x}", u16::from_be_bytes([pair[0], pair[1]])))
            .collect();
        write!(f, "{}::/64", hextets.join(":"))
    }
}

/// Concatenate `prefix` with `iid` into a full IPv6 address.
pub fn join_prefix(prefix: &MeshLocalPrefix, iid: &InterfaceId) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[..8].copy_from_slice(&prefix.0);
    octets[8..].copy_from_slice(&iid.0);
    Ipv6Addr::from(octets)
}

/// The collector's address on the current mesh: `prefix ∥ ::1`.
///
/// Callers resolve this per send; the prefix may change across reboots.
pub fn resolve_collector_address(prefix: &MeshLocalPrefix) -> Ipv6Addr {
    join_prefix(prefix, &COLLECTOR_IID)
}

/// Collector address plus port, ready to hand to a transport.
pub fn collector_endpoint(prefix: &MeshLocalPrefix, iid: &InterfaceId, port: u16) -> SocketAddrV6 {
    SocketAddrV6::new(join_prefix(prefix, iid), port, 0, 0)
}
