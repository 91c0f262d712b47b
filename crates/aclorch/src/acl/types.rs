//! ACL rule enums.
//!
//! String forms match the policy documents stored in the database, so every
//! enum round-trips through `Display`/`FromStr` and serde with the same
//! lowercase spelling.

use netacl_types::IpFamily;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule list an ACL rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic going to the workload.
    Ingress,
    /// Traffic leaving the workload.
    Egress,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Ingress, Direction::Egress];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "ingress"),
            Self::Egress => write!(f, "egress"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingress" => Ok(Self::Ingress),
            "egress" => Ok(Self::Egress),
            _ => Err(format!("Unknown rule direction: {}", s)),
        }
    }
}

/// What a matching rule does with the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Drop,
    Reject,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Drop => write!(f, "drop"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Action must be one of: allow, drop, reject (got {:?})", s)),
        }
    }
}

/// Whether a rule is compiled, and whether matches are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    #[default]
    Enabled,
    /// Stored and compared, but never compiled.
    Disabled,
    /// Compiled like `Enabled`, with a log label attached.
    Logged,
}

impl RuleState {
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Logged => write!(f, "logged"),
        }
    }
}

impl FromStr for RuleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            "logged" => Ok(Self::Logged),
            _ => Err(format!(
                "State must be one of: enabled, disabled, logged (got {:?})",
                s
            )),
        }
    }
}

/// L4 or ICMP protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp4,
    Icmp6,
}

impl Protocol {
    /// Protocols that carry source/destination ports.
    pub const fn has_ports(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }

    /// The only address family an ICMP protocol can match.
    pub const fn icmp_family(&self) -> Option<IpFamily> {
        match self {
            Self::Icmp4 => Some(IpFamily::V4),
            Self::Icmp6 => Some(IpFamily::V6),
            Self::Tcp | Self::Udp => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmp4 => write!(f, "icmp4"),
            Self::Icmp6 => write!(f, "icmp6"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp4" => Ok(Self::Icmp4),
            "icmp6" => Ok(Self::Icmp6),
            _ => Err(format!(
                "Protocol must be one of: icmp4, icmp6, tcp, udp (got {:?})",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(direction.to_string().parse::<Direction>(), Ok(direction));
        }
        assert!("INGRESS".parse::<Direction>().is_err());
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("allow".parse::<RuleAction>(), Ok(RuleAction::Allow));
        assert_eq!("reject".parse::<RuleAction>(), Ok(RuleAction::Reject));
        assert!("accept".parse::<RuleAction>().is_err());
    }

    #[test]
    fn test_state_default_and_activity() {
        assert_eq!(RuleState::default(), RuleState::Enabled);
        assert!(RuleState::Logged.is_active());
        assert!(!RuleState::Disabled.is_active());
        assert!("paused".parse::<RuleState>().is_err());
    }

    #[test]
    fn test_protocol_classes() {
        assert!(Protocol::Tcp.has_ports());
        assert!(!Protocol::Icmp4.has_ports());
        assert_eq!(Protocol::Icmp4.icmp_family(), Some(IpFamily::V4));
        assert_eq!(Protocol::Udp.icmp_family(), None);
    }

    #[test]
    fn test_serde_spelling() {
        let json = serde_json::to_string(&Protocol::Icmp6).unwrap();
        assert_eq!(json, "\"icmp6\"");
        let state: RuleState = serde_json::from_str("\"logged\"").unwrap();
        assert_eq!(state, RuleState::Logged);
    }
}
