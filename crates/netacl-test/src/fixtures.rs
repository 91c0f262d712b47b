//! Test fixtures for common ACL scenarios
//!
//! Provides reusable ACLs, networks and NIC records, and a [`Scenario`]
//! bundling the in-memory collaborators behind an `AclOrch`.

use std::collections::BTreeMap;
use std::sync::Arc;

use netacl_aclorch::acl::{AclOrch, AclPut, Protocol, Rule, RuleAction};
use netacl_aclorch::db::{DeviceConfig, InstanceRecord, NetworkRecord, NetworkType, ProfileRecord};
use netacl_aclorch::AclOrchConfig;
use tokio_util::sync::CancellationToken;

use crate::mock_db::MemoryDatabase;
use crate::mock_ovn::MockOvnClient;
use crate::recording::{RecordingFirewall, RecordingNotifier};

/// Project every fixture lives in.
pub const PROJECT: &str = "default";

/// Common ACL definitions
pub mod acl_fixtures {
    use super::*;

    /// Allows HTTP and HTTPS from 10.0.0.0/24.
    pub fn web() -> AclPut {
        AclPut {
            description: "Web servers".to_string(),
            ingress: vec![Rule::new(RuleAction::Allow)
                .with_source("10.0.0.0/24")
                .with_protocol(Protocol::Tcp)
                .with_destination_port("80,443")],
            ..AclPut::default()
        }
    }

    /// Allows ingress from members of `source_acl`.
    pub fn allow_from(source_acl: &str) -> AclPut {
        AclPut {
            ingress: vec![Rule::new(RuleAction::Allow).with_source(source_acl)],
            ..AclPut::default()
        }
    }

    /// Allows ingress from the network's own workloads and egress to the
    /// outside.
    pub fn internal_only() -> AclPut {
        AclPut {
            ingress: vec![Rule::new(RuleAction::Allow).with_source("@internal")],
            egress: vec![Rule::new(RuleAction::Allow).with_destination("@external")],
            ..AclPut::default()
        }
    }

    /// Drops SSH from anywhere.
    pub fn no_ssh() -> AclPut {
        AclPut {
            ingress: vec![Rule::new(RuleAction::Drop)
                .with_protocol(Protocol::Tcp)
                .with_destination_port("22")],
            ..AclPut::default()
        }
    }
}

/// Common network and NIC records
pub mod network_fixtures {
    use super::*;

    fn with_acls(network: NetworkRecord, acls: &str) -> NetworkRecord {
        if acls.is_empty() {
            network
        } else {
            network.with_config("security.acls", acls)
        }
    }

    pub fn ovn(id: i64, name: &str, acls: &str) -> NetworkRecord {
        with_acls(NetworkRecord::new(id, name, NetworkType::Ovn), acls)
    }

    pub fn bridge(id: i64, name: &str, acls: &str) -> NetworkRecord {
        with_acls(NetworkRecord::new(id, name, NetworkType::Bridge), acls)
    }

    pub fn nic(network: &str, acls: &str) -> DeviceConfig {
        [
            ("type", "nic"),
            ("network", network),
            ("security.acls", acls),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    pub fn instance(name: &str, device: &str, config: DeviceConfig) -> InstanceRecord {
        InstanceRecord {
            project: PROJECT.to_string(),
            name: name.to_string(),
            devices: BTreeMap::from([(device.to_string(), config)]),
        }
    }

    pub fn profile(name: &str, device: &str, config: DeviceConfig) -> ProfileRecord {
        ProfileRecord {
            project: PROJECT.to_string(),
            name: name.to_string(),
            devices: BTreeMap::from([(device.to_string(), config)]),
        }
    }
}

/// In-memory collaborators shared by one test.
pub struct Scenario {
    pub db: Arc<MemoryDatabase>,
    pub ovn: Arc<MockOvnClient>,
    pub firewall: Arc<RecordingFirewall>,
    pub notifier: Arc<RecordingNotifier>,
    pub cancel: CancellationToken,
    pub config: AclOrchConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    pub fn new() -> Self {
        Self {
            db: Arc::new(MemoryDatabase::new()),
            ovn: Arc::new(MockOvnClient::new()),
            firewall: Arc::new(RecordingFirewall::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            cancel: CancellationToken::new(),
            config: AclOrchConfig::default(),
        }
    }

    /// Stores an ACL in the normalized form `create` would persist.
    pub fn with_acl(self, name: &str, mut put: AclPut) -> Self {
        put.normalize();
        self.db.add_acl(PROJECT, name, put);
        self
    }

    pub fn with_network(self, network: NetworkRecord) -> Self {
        self.db.add_network(PROJECT, network);
        self
    }

    pub fn with_instance(self, instance: InstanceRecord) -> Self {
        self.db.add_instance(PROJECT, instance);
        self
    }

    pub fn with_profile(self, profile: ProfileRecord) -> Self {
        self.db.add_profile(PROJECT, profile);
        self
    }

    /// An orchestrator wired to every collaborator of the scenario.
    pub fn orch(&self) -> AclOrch {
        AclOrch::new(self.db.clone())
            .with_config(self.config.clone())
            .with_cancellation(self.cancel.clone())
            .with_ovn(self.ovn.clone())
            .with_firewall(self.firewall.clone())
            .with_notifier(self.notifier.clone())
    }

    /// Identifier of an ACL stored in the scenario.
    pub fn acl_id(&self, name: &str) -> i64 {
        self.db
            .acl(PROJECT, name)
            .map(|acl| acl.id)
            .unwrap_or_else(|| panic!("ACL {} not in scenario", name))
    }
}

/// `web` applied to OVN network `ovn0` (id 7), and `db` allowing traffic
/// from `web` members but applied nowhere.
pub fn web_db_scenario() -> Scenario {
    Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_acl("db", acl_fixtures::allow_from("web"))
        .with_network(network_fixtures::ovn(7, "ovn0", "web"))
}

/// Three ACLs referencing each other in a cycle: a → b → c → a.
pub fn cycle_scenario() -> Scenario {
    Scenario::new()
        .with_acl("a", acl_fixtures::allow_from("b"))
        .with_acl("b", acl_fixtures::allow_from("c"))
        .with_acl("c", acl_fixtures::allow_from("a"))
}
