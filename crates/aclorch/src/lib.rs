//! Network ACL orchestration.
//!
//! Compiles user-defined network ACLs into control-plane port groups for
//! OVN networks and into flat firewall rule lists for bridge networks, and
//! keeps both in step with the database.
//!
//! # Architecture
//!
//! ```text
//! [AclDatabase] ──> [AclOrch] ──┬──> [Reconciler] ──> [OvnClient]
//!                               ├──> [FirewallDriver]
//!                               └──> [ClusterNotifier]
//! ```
//!
//! # Key Components
//!
//! - [`acl`]: rule model, validation, compilation, reconciliation and GC
//! - [`ovn`]: control-plane client trait, object naming and baseline rules
//! - [`db`]: database collaborator and the records the usage walk reads
//! - [`policy`]: offline policy documents for the `aclorch` tool

pub mod acl;
pub mod config;
pub mod db;
pub mod notify;
pub mod ovn;
pub mod policy;

pub use acl::{
    Acl, AclError, AclOrch, AclPut, AclResult, Direction, Reconciler, Rule, RuleAction,
    RuleState, UpdateOrigin,
};
pub use config::AclOrchConfig;
pub use db::{AclDatabase, NetworkRecord, NetworkType};
pub use notify::ClusterNotifier;
pub use ovn::OvnClient;
pub use policy::PolicyDocument;
