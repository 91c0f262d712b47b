//! Rule subjects: one operand of a rule's Source or Destination list.

use netacl_types::{IpCidr, IpFamily, IpRange, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Current and deprecated spellings of the internal selector.
pub const INTERNAL_ALIASES: [&str; 2] = ["@internal", "#internal"];
/// Current and deprecated spellings of the external selector.
pub const EXTERNAL_ALIASES: [&str; 2] = ["@external", "#external"];

/// Splits a comma separated list, trimming items and skipping empty ones.
pub fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("Cannot parse subject as peer {0:?}")]
    InvalidPeer(String),

    #[error(transparent)]
    Address(#[from] ParseError),
}

/// Network-relative selector, expanded per network when rules are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservedSelector {
    /// All workload ports on the network's internal switch.
    Internal,
    /// The network's external-facing endpoint.
    External,
}

impl ReservedSelector {
    /// Recognises any spelling, including deprecated aliases.
    pub fn from_alias(s: &str) -> Option<Self> {
        if INTERNAL_ALIASES.contains(&s) {
            Some(Self::Internal)
        } else if EXTERNAL_ALIASES.contains(&s) {
            Some(Self::External)
        } else {
            None
        }
    }

    /// Placeholder emitted in compiled matches, substituted per network.
    pub const fn placeholder(&self) -> &'static str {
        match self {
            Self::Internal => "@internal",
            Self::External => "@external",
        }
    }
}

impl fmt::Display for ReservedSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.placeholder())
    }
}

/// A peering connection of a network, written `@<network>/<peer>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkPeer {
    pub network: String,
    pub peer: String,
}

impl NetworkPeer {
    pub fn new(network: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            peer: peer.into(),
        }
    }
}

impl fmt::Display for NetworkPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.peer)
    }
}

/// Parsed form of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Address(IpAddr),
    Cidr(IpCidr),
    Range(IpRange),
    Reserved(ReservedSelector),
    Peer(NetworkPeer),
    /// Reference to another ACL by name.
    Acl(String),
}

impl Subject {
    /// Parses a single, already trimmed subject.
    ///
    /// Anything that is not an address, CIDR, range, reserved selector or
    /// peer is taken as an ACL name; whether that ACL exists is checked by
    /// the caller against its name table.
    pub fn parse(s: &str) -> Result<Self, SubjectError> {
        if let Ok(addr) = s.parse::<IpAddr>() {
            return Ok(Subject::Address(addr));
        }

        if let Some(selector) = ReservedSelector::from_alias(s) {
            return Ok(Subject::Reserved(selector));
        }

        if let Some(rest) = s.strip_prefix('@') {
            return match rest.split_once('/') {
                Some((network, peer)) if !network.is_empty() && !peer.is_empty() => {
                    Ok(Subject::Peer(NetworkPeer::new(network, peer)))
                }
                _ => Err(SubjectError::InvalidPeer(s.to_string())),
            };
        }

        // ACL names never contain '/', so this can only be a broken CIDR.
        if s.contains('/') {
            return s.parse::<IpCidr>().map(Subject::Cidr).map_err(Into::into);
        }

        match s.parse::<IpRange>() {
            Ok(range) => return Ok(Subject::Range(range)),
            Err(err @ (ParseError::MixedFamilyRange(_) | ParseError::ReversedIpRange(_))) => {
                return Err(err.into())
            }
            // Not shaped like a range; hyphenated ACL names land here.
            Err(_) => {}
        }

        Ok(Subject::Acl(s.to_string()))
    }

    /// Address family of concrete subjects, `None` for named ones.
    pub fn family(&self) -> Option<IpFamily> {
        match self {
            Subject::Address(addr) => Some(IpFamily::of(addr)),
            Subject::Cidr(cidr) => Some(cidr.family()),
            Subject::Range(range) => Some(range.family()),
            Subject::Reserved(_) | Subject::Peer(_) | Subject::Acl(_) => None,
        }
    }

    /// Named subjects carry an identity rather than an address.
    pub fn is_named(&self) -> bool {
        self.family().is_none()
    }

    /// Referenced ACL name, if this subject is one.
    pub fn acl_name(&self) -> Option<&str> {
        match self {
            Subject::Acl(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Address(addr) => addr.fmt(f),
            Subject::Cidr(cidr) => cidr.fmt(f),
            Subject::Range(range) => range.fmt(f),
            Subject::Reserved(selector) => selector.fmt(f),
            Subject::Peer(peer) => write!(f, "@{}", peer),
            Subject::Acl(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_list_trims() {
        let items: Vec<&str> = split_list(" web, ,db ,").collect();
        assert_eq!(items, vec!["web", "db"]);
    }

    #[test]
    fn test_parse_concrete() {
        assert_eq!(
            Subject::parse("10.0.0.1").unwrap().family(),
            Some(IpFamily::V4)
        );
        assert_eq!(
            Subject::parse("2001:db8::/64").unwrap().family(),
            Some(IpFamily::V6)
        );
        assert!(matches!(
            Subject::parse("10.0.0.1-10.0.0.5").unwrap(),
            Subject::Range(_)
        ));
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(
            Subject::parse("#internal").unwrap(),
            Subject::Reserved(ReservedSelector::Internal)
        );
        assert_eq!(
            Subject::parse("@external").unwrap(),
            Subject::Reserved(ReservedSelector::External)
        );
        assert_eq!(
            Subject::parse("@lan/office").unwrap(),
            Subject::Peer(NetworkPeer::new("lan", "office"))
        );
        assert_eq!(
            Subject::parse("web-frontend").unwrap(),
            Subject::Acl("web-frontend".to_string())
        );
        assert!(Subject::parse("web").unwrap().is_named());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Subject::parse("@lan"),
            Err(SubjectError::InvalidPeer("@lan".to_string()))
        );
        assert!(matches!(
            Subject::parse("10.0.0.9-10.0.0.1"),
            Err(SubjectError::Address(ParseError::ReversedIpRange(_)))
        ));
        assert!(matches!(
            Subject::parse("10.0.0.1-::1"),
            Err(SubjectError::Address(ParseError::MixedFamilyRange(_)))
        ));
        assert!(Subject::parse("10.0.0.0/40").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["10.0.0.0/24", "@lan/office", "@internal", "web", "10.0.0.1-10.0.0.9"] {
            assert_eq!(Subject::parse(s).unwrap().to_string(), s);
        }
    }
}
