//! L4 port ranges and ICMP type/code values.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single port (`80`) or an inclusive range (`1000-2000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Creates a range covering one port.
    pub const fn single(port: u16) -> Self {
        PortRange {
            start: port,
            end: port,
        }
    }

    pub const fn start(&self) -> u16 {
        self.start
    }

    pub const fn end(&self) -> u16 {
        self.end
    }

    /// Returns true if the range was written as a single port.
    pub const fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

fn parse_port(s: &str, whole: &str) -> Result<u16, ParseError> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidPort(whole.to_string()))
}

impl FromStr for PortRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((start, end)) => {
                let start = parse_port(start, s)?;
                let end = parse_port(end, s)?;
                if start > end {
                    return Err(ParseError::ReversedPortRange(s.to_string()));
                }
                Ok(PortRange { start, end })
            }
            None => parse_port(s, s).map(PortRange::single),
        }
    }
}

/// An ICMP type or code (0-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IcmpValue(u8);

impl IcmpValue {
    pub const fn new(value: u8) -> Self {
        IcmpValue(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for IcmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IcmpValue {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map(IcmpValue)
            .map_err(|_| ParseError::InvalidIcmpValue(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_port() {
        let port: PortRange = "443".parse().unwrap();
        assert!(port.is_single());
        assert_eq!(port, PortRange::single(443));
        assert_eq!(port.to_string(), "443");
    }

    #[test]
    fn test_port_range() {
        let range: PortRange = "1000-2000".parse().unwrap();
        assert_eq!((range.start(), range.end()), (1000, 2000));
        assert_eq!(range.to_string(), "1000-2000");
    }

    #[test]
    fn test_port_errors() {
        assert_eq!(
            "2000-1000".parse::<PortRange>(),
            Err(ParseError::ReversedPortRange("2000-1000".to_string()))
        );
        assert!("65536".parse::<PortRange>().is_err());
        assert!("http".parse::<PortRange>().is_err());
        assert!("80-".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_icmp_value() {
        assert_eq!("8".parse::<IcmpValue>().unwrap().value(), 8);
        assert!("256".parse::<IcmpValue>().is_err());
        assert!("-1".parse::<IcmpValue>().is_err());
    }
}
