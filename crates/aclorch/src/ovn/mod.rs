//! Control-plane side of the engine: the client boundary, deterministic
//! object naming, rule priorities and the non-ACL rule sets (switch baseline
//! and per-NIC defaults).

pub mod client;
pub mod defaults;
pub mod names;

pub use client::{
    MatchSubstitutions, OvnAclRule, OvnAction, OvnClient, OvnError, OvnResult, PortGroupState,
};
pub use defaults::{
    apply_instance_nic_default_rules, apply_network_baseline_rules, network_baseline_rules,
    nic_default_rules, schedule_nic_port_groups, NicDefaults, PortGroupChangeSet,
};
pub use names::{
    AddressSetPrefix, PortGroupKind, PortGroupName, SwitchName, SwitchPortName,
};

/// Rule priorities. Higher is evaluated first.
pub mod priority {
    pub const PORT_GROUP_DEFAULT_ACTION: u16 = 0;
    pub const NIC_DEFAULT_INGRESS: u16 = 100;
    /// Must stay more than 10 above [`NIC_DEFAULT_INGRESS`]; the control plane
    /// adds 10 to the priority of reject rules.
    pub const NIC_DEFAULT_EGRESS: u16 = 111;
    pub const SWITCH_ALLOW: u16 = 200;
    pub const PORT_GROUP_DROP: u16 = 300;
    pub const PORT_GROUP_REJECT: u16 = 400;
    pub const PORT_GROUP_ALLOW: u16 = 500;
}
