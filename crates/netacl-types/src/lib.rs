//! Network primitives used by ACL rule subjects and protocol criteria.
//!
//! - [`IpFamily`]: IPv4 or IPv6, rendered as the `ip4`/`ip6` match prefix
//! - [`IpCidr`]: a network in CIDR notation
//! - [`IpRange`]: an inclusive address range of a single family
//! - [`PortRange`]: a single L4 port or an inclusive port range
//! - [`IcmpValue`]: an ICMP type or code

mod ip;
mod port;

pub use ip::{IpCidr, IpFamily, IpRange};
pub use port::{IcmpValue, PortRange};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("invalid IP range {0:?}: must be <start>-<end>")]
    InvalidIpRange(String),

    #[error("IP range {0:?} mixes address families")]
    MixedFamilyRange(String),

    #[error("IP range {0:?} starts after it ends")]
    ReversedIpRange(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("port range {0:?} starts after it ends")]
    ReversedPortRange(String),

    #[error("invalid ICMP value {0:?}: must be 0-255")]
    InvalidIcmpValue(String),
}
