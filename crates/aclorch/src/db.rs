//! Database collaborator.
//!
//! ACL definitions, identifier allocation, networks, profiles and instances
//! live in an external database. Implementations run each call inside the
//! caller's transaction; the engine never retries a failed call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use netacl_orch_common::IdTable;

use crate::acl::{Acl, AclLookup, AclPut, AclResult, PeerTargets};

/// Device or network config map.
pub type DeviceConfig = BTreeMap<String, String>;

/// Config key listing the ACLs applied to a network or NIC.
pub const SECURITY_ACLS_KEY: &str = "security.acls";

/// Backing technology of a network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkType {
    /// Host bridge, filtered by the legacy firewall.
    Bridge,
    /// SDN network, filtered by control-plane port groups.
    Ovn,
    Other(String),
}

impl NetworkType {
    /// Network types that can apply ACLs.
    pub fn supports_acls(&self) -> bool {
        matches!(self, NetworkType::Bridge | NetworkType::Ovn)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Ovn => write!(f, "ovn"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl From<String> for NetworkType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "bridge" => Self::Bridge,
            "ovn" => Self::Ovn,
            _ => Self::Other(s),
        }
    }
}

impl From<NetworkType> for String {
    fn from(t: NetworkType) -> Self {
        t.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    #[serde(default)]
    pub config: DeviceConfig,
}

impl NetworkRecord {
    pub fn new(id: i64, name: impl Into<String>, network_type: NetworkType) -> Self {
        Self {
            id,
            name: name.into(),
            network_type,
            config: DeviceConfig::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// ACL names listed in `security.acls`.
    pub fn acl_names(&self) -> Vec<&str> {
        acl_list(&self.config)
    }
}

/// Profile whose effective network project is the one queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub project: String,
    pub name: String,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
}

/// Instance whose effective network project is the one queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub project: String,
    pub name: String,
    /// Devices after profile expansion.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
}

/// ACL names listed in a config map's `security.acls` key.
pub fn acl_list(config: &DeviceConfig) -> Vec<&str> {
    config
        .get(SECURITY_ACLS_KEY)
        .map(|list| crate::acl::split_list(list).collect())
        .unwrap_or_default()
}

/// Persistent store of ACLs and of the records that use them.
#[async_trait]
pub trait AclDatabase: Send + Sync {
    async fn get_project_id(&self, project: &str) -> AclResult<i64>;

    /// Loads one ACL; `AclError::NotFound` if it does not exist.
    async fn get_acl(&self, project: &str, name: &str) -> AclResult<Acl>;

    /// Every ACL of the project, ordered by name.
    async fn get_acls(&self, project: &str) -> AclResult<Vec<Acl>>;

    async fn get_acl_name_to_id_map(&self, project: &str) -> AclResult<IdTable>;

    /// Inserts a new ACL and returns its allocated identifier.
    async fn create_acl(&self, project: &str, name: &str, put: &AclPut) -> AclResult<i64>;

    async fn update_acl(&self, id: i64, put: &AclPut) -> AclResult<()>;

    async fn rename_acl(&self, id: i64, new_name: &str) -> AclResult<()>;

    async fn delete_acl(&self, id: i64) -> AclResult<()>;

    /// Created networks of the project, ordered by name.
    async fn get_networks(&self, project: &str) -> AclResult<Vec<NetworkRecord>>;

    /// Loads one network in any state; `AclError::NotFound` if missing.
    async fn get_network(&self, project: &str, name: &str) -> AclResult<NetworkRecord>;

    async fn get_profiles(&self, project: &str) -> AclResult<Vec<ProfileRecord>>;

    async fn get_instances(&self, project: &str) -> AclResult<Vec<InstanceRecord>>;

    /// Target network of every peer connection from OVN networks in the project.
    async fn get_peer_targets(&self, project: &str) -> AclResult<PeerTargets>;
}

/// ACL lookup backed by the database, scoped to one project.
pub struct ProjectAcls<'a> {
    db: &'a dyn AclDatabase,
    project: &'a str,
}

impl<'a> ProjectAcls<'a> {
    pub fn new(db: &'a dyn AclDatabase, project: &'a str) -> Self {
        Self { db, project }
    }
}

#[async_trait]
impl AclLookup for ProjectAcls<'_> {
    async fn lookup_acl(&self, name: &str) -> AclResult<Acl> {
        self.db.get_acl(self.project, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_network_type_round_trip() {
        assert_eq!("ovn".parse::<NetworkType>(), Ok(NetworkType::Ovn));
        assert_eq!(
            "macvlan".parse::<NetworkType>(),
            Ok(NetworkType::Other("macvlan".to_string()))
        );
        assert!(NetworkType::Bridge.supports_acls());
        assert!(!NetworkType::Other("sriov".to_string()).supports_acls());

        let net: NetworkRecord =
            serde_json::from_str(r#"{"id": 1, "name": "lan", "type": "bridge"}"#).unwrap();
        assert_eq!(net.network_type, NetworkType::Bridge);
    }

    #[test]
    fn test_acl_list() {
        let net = NetworkRecord::new(1, "lan", NetworkType::Ovn)
            .with_config(SECURITY_ACLS_KEY, "web, db,,");
        assert_eq!(net.acl_names(), vec!["web", "db"]);
        assert!(NetworkRecord::new(2, "wan", NetworkType::Ovn).acl_names().is_empty());
    }
}
