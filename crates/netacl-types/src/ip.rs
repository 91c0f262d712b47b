//! IP family, CIDR and address range types with safe parsing.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Address family of a concrete subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Returns the family of the given address.
    pub const fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// Maximum prefix length for this family.
    pub const fn max_prefix_len(&self) -> u8 {
        match self {
            IpFamily::V4 => 32,
            IpFamily::V6 => 128,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "ip4"),
            IpFamily::V6 => write!(f, "ip6"),
        }
    }
}

/// A network in CIDR notation (e.g. 10.0.0.0/24 or 2001:db8::/32).
///
/// The address is kept as written; host bits are not masked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpCidr {
    address: IpAddr,
    prefix_len: u8,
}

impl IpCidr {
    /// Creates a new CIDR, checking the prefix length against the family.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = IpFamily::of(&address).max_prefix_len();
        if prefix_len > max_len {
            return Err(ParseError::InvalidCidr(format!(
                "{}/{} (prefix length exceeds {})",
                address, prefix_len, max_len
            )));
        }

        Ok(IpCidr {
            address,
            prefix_len,
        })
    }

    pub const fn address(&self) -> &IpAddr {
        &self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn family(&self) -> IpFamily {
        IpFamily::of(&self.address)
    }
}

impl fmt::Display for IpCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpCidr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidCidr(s.to_string()))?;

        let address: IpAddr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidCidr(s.to_string()))?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidCidr(s.to_string()))?;

        IpCidr::new(address, prefix_len)
    }
}

/// An inclusive address range written as `<start>-<end>`.
///
/// Both ends share one family and `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpRange {
    start: IpAddr,
    end: IpAddr,
}

impl IpRange {
    pub const fn start(&self) -> &IpAddr {
        &self.start
    }

    pub const fn end(&self) -> &IpAddr {
        &self.end
    }

    pub const fn family(&self) -> IpFamily {
        IpFamily::of(&self.start)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for IpRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start_str, end_str) = s
            .split_once('-')
            .ok_or_else(|| ParseError::InvalidIpRange(s.to_string()))?;

        let start: IpAddr = start_str
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidIpRange(s.to_string()))?;
        let end: IpAddr = end_str
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidIpRange(s.to_string()))?;

        if IpFamily::of(&start) != IpFamily::of(&end) {
            return Err(ParseError::MixedFamilyRange(s.to_string()));
        }

        if start > end {
            return Err(ParseError::ReversedIpRange(s.to_string()));
        }

        Ok(IpRange { start, end })
    }
}
