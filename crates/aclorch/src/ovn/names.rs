//! Deterministic control-plane object names.
//!
//! Every name is a pure function of database identifiers, never of
//! user-supplied text, so renaming an ACL or network leaves its control-plane
//! objects untouched. Port-group names are limited to `[a-zA-Z_.][a-zA-Z_.0-9]*`.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! ovn_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }
    };
}

ovn_name!(
    /// Name of a port group.
    PortGroupName
);
ovn_name!(
    /// Name of a logical switch.
    SwitchName
);
ovn_name!(
    /// Name of a logical switch port.
    SwitchPortName
);
ovn_name!(
    /// Prefix of a pair of `<prefix>_ip4`/`<prefix>_ip6` address sets.
    AddressSetPrefix
);

/// Prefix shared by every port group owned by an ACL.
pub const ACL_PORT_GROUP_PREFIX: &str = "acl";
const NETWORK_INFIX: &str = "_net";

/// Port group holding an ACL's direction-agnostic rules.
pub fn acl_port_group(acl_id: i64) -> PortGroupName {
    PortGroupName(format!("{}{}", ACL_PORT_GROUP_PREFIX, acl_id))
}

/// Port group holding an ACL's network-relative rules for one network.
pub fn acl_network_port_group(acl_id: i64, network_id: i64) -> PortGroupName {
    PortGroupName(format!(
        "{}{}{}{}",
        ACL_PORT_GROUP_PREFIX, acl_id, NETWORK_INFIX, network_id
    ))
}

/// Prefix of every object belonging to a network.
pub fn network_prefix(network_id: i64) -> String {
    format!("net{}", network_id)
}

/// Port group of all workload ports on a network's internal switch.
pub fn int_switch_port_group(network_id: i64) -> PortGroupName {
    PortGroupName(network_prefix(network_id))
}

/// Address sets of the routes reachable through a network's internal switch.
pub fn int_switch_address_set_prefix(network_id: i64) -> AddressSetPrefix {
    AddressSetPrefix(format!("{}_routes", network_prefix(network_id)))
}

pub fn int_switch(network_id: i64) -> SwitchName {
    SwitchName(format!("{}-ls-int", network_prefix(network_id)))
}

/// The switch port facing the network's router: its external endpoint.
pub fn int_switch_router_port(network_id: i64) -> SwitchPortName {
    SwitchPortName(format!("{}-ls-int-lsp-router", network_prefix(network_id)))
}

/// Kind of an ACL-owned port group, recovered from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortGroupKind {
    Acl { acl_id: i64 },
    AclNetwork { acl_id: i64, network_id: i64 },
}

impl PortGroupKind {
    /// Classifies a port group name; `None` if no ACL owns it.
    pub fn parse(name: &PortGroupName) -> Option<Self> {
        let rest = name.as_str().strip_prefix(ACL_PORT_GROUP_PREFIX)?;
        match rest.split_once(NETWORK_INFIX) {
            Some((acl_id, network_id)) => Some(PortGroupKind::AclNetwork {
                acl_id: parse_id(acl_id)?,
                network_id: parse_id(network_id)?,
            }),
            None => Some(PortGroupKind::Acl {
                acl_id: parse_id(rest)?,
            }),
        }
    }

    pub const fn acl_id(&self) -> i64 {
        match self {
            PortGroupKind::Acl { acl_id } | PortGroupKind::AclNetwork { acl_id, .. } => *acl_id,
        }
    }
}

/// Parses an ID exactly as [`acl_port_group`] renders it, so `acl01` is not
/// mistaken for `acl1`.
fn parse_id(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names() {
        assert_eq!(acl_port_group(4).as_str(), "acl4");
        assert_eq!(acl_network_port_group(4, 9).as_str(), "acl4_net9");
        assert_eq!(int_switch_port_group(9).as_str(), "net9");
        assert_eq!(int_switch(9).as_str(), "net9-ls-int");
        assert_eq!(int_switch_router_port(9).as_str(), "net9-ls-int-lsp-router");
        assert_eq!(int_switch_address_set_prefix(9).as_str(), "net9_routes");
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            PortGroupKind::parse(&acl_port_group(12)),
            Some(PortGroupKind::Acl { acl_id: 12 })
        );
        assert_eq!(
            PortGroupKind::parse(&acl_network_port_group(12, 3)),
            Some(PortGroupKind::AclNetwork {
                acl_id: 12,
                network_id: 3
            })
        );
        assert_eq!(PortGroupKind::parse(&int_switch_port_group(3)), None);
        assert_eq!(PortGroupKind::parse(&PortGroupName::from("acl")), None);
        assert_eq!(PortGroupKind::parse(&PortGroupName::from("aclx_net1")), None);
        assert_eq!(PortGroupKind::parse(&PortGroupName::from("acl-1")), None);
    }

    #[test]
    fn test_classify_rejects_non_canonical_ids() {
        for name in ["acl01", "acl00", "acl1_net07", "acl01_net7", "acl+1"] {
            assert_eq!(PortGroupKind::parse(&PortGroupName::from(name)), None, "{}", name);
        }
        assert_eq!(
            PortGroupKind::parse(&PortGroupName::from("acl0_net0")),
            Some(PortGroupKind::AclNetwork {
                acl_id: 0,
                network_id: 0
            })
        );
    }
}
