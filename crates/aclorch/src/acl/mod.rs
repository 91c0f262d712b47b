//! Network ACLs: model, validation, compilation and reconciliation.
//!
//! An ACL is a named, project-scoped pair of ordered ingress and egress rule
//! lists. On OVN networks each ACL becomes a control-plane port group
//! holding its compiled rules; on bridge networks its rules are flattened
//! into the host firewall.
//!
//! # Architecture
//!
//! ```text
//! AclPut ──> validate ──> AclDatabase
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         compile_firewall_rules     Reconciler::ensure_acls
//!                  │                  │  resolve_references
//!                  ▼                  │  compile_rule
//!           FirewallDriver            ▼
//!                                 OvnClient <── Reconciler::delete_if_unused
//! ```
//!
//! # Key Components
//!
//! - [`Acl`], [`Rule`]: the stored model, normalized before comparison
//! - [`Subject`]: one parsed source or destination operand
//! - [`compile_rule`]: pure rule to match-expression compiler
//! - [`Reconciler`]: port-group creation, rule application, NIC membership,
//!   rollback and GC
//! - [`AclOrch`]: create, update, rename and delete entry points

mod compile;
mod ensure;
mod error;
mod firewall;
mod gc;
mod members;
mod orch;
mod resolve;
mod rule;
mod subject;
mod types;
mod usage;
mod validate;

pub use compile::{
    compile_acl, compile_rule, default_rule, log_label, port_group_filter, rule_priority,
    CompiledAcl, CompiledRule, PeerTargets,
};
pub use ensure::{network_substitutions, AclNetworks, Reconciler, RevertHandle, UndoAction};
pub use error::{AclError, AclResult, ErrorKind, RuleError};
pub use firewall::{compile_firewall_rules, FirewallDriver, FirewallRule};
pub use members::nic_port_groups;
pub use orch::{AclOrch, AclOrchStats, UpdateOrigin};
pub use resolve::{direct_references, resolve_references, AclLookup};
pub use rule::{default_project, Acl, AclPut, Rule};
pub use subject::{
    split_list, NetworkPeer, ReservedSelector, Subject, SubjectError, EXTERNAL_ALIASES,
    INTERNAL_ALIASES,
};
pub use types::{Direction, Protocol, RuleAction, RuleState};
pub use usage::{network_usage, usage_urls, used_by, NicOwner, Usage, UsageIgnore};
pub use validate::{validate_config, validate_name, validate_put, validate_rule, USER_CONFIG_PREFIX};
