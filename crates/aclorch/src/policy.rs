//! Offline policy documents.
//!
//! A policy document is a snapshot of one project's ACLs, networks and peer
//! connections, read from YAML or JSON. The `aclorch` tool validates and
//! compiles it without a database or control plane.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use netacl_orch_common::IdTable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::acl::{
    default_project, validate_name, validate_put, Acl, AclResult, NetworkPeer, PeerTargets,
};
use crate::db::NetworkRecord;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML policy: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON policy: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ACL {name:?} defined more than once")]
    DuplicateAcl { name: String },

    #[error("ACL identifier {id} used by both {first:?} and {second:?}")]
    DuplicateId { id: i64, first: String, second: String },

    #[error("Network {name:?} not found in policy")]
    UnknownNetwork { name: String },
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Target network of one peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTarget {
    pub network: String,
    pub peer: String,
    pub target_network_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub acls: Vec<Acl>,
    #[serde(default)]
    pub networks: Vec<NetworkRecord>,
    #[serde(default)]
    pub peers: Vec<PeerTarget>,
}

impl PolicyDocument {
    /// Reads a document, as JSON for `.json` files and YAML otherwise.
    pub fn load(path: &Path) -> PolicyResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let doc = if is_json {
            Self::from_json(&text)?
        } else {
            Self::from_yaml(&text)?
        };

        Ok(doc)
    }

    pub fn from_yaml(text: &str) -> PolicyResult<Self> {
        let doc: Self = serde_yaml::from_str(text)?;
        doc.check()?;
        Ok(doc)
    }

    pub fn from_json(text: &str) -> PolicyResult<Self> {
        let doc: Self = serde_json::from_str(text)?;
        doc.check()?;
        Ok(doc)
    }

    fn check(&self) -> PolicyResult<()> {
        let mut ids: BTreeMap<i64, &str> = BTreeMap::new();
        let mut names: BTreeMap<&str, i64> = BTreeMap::new();

        for acl in &self.acls {
            if names.insert(&acl.name, acl.id).is_some() {
                return Err(PolicyError::DuplicateAcl {
                    name: acl.name.clone(),
                });
            }
            if let Some(first) = ids.insert(acl.id, &acl.name) {
                return Err(PolicyError::DuplicateId {
                    id: acl.id,
                    first: first.to_string(),
                    second: acl.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Name to identifier table of the document's ACLs.
    pub fn id_table(&self) -> IdTable {
        self.acls.iter().map(|acl| (acl.name.clone(), acl.id)).collect()
    }

    /// The ACLs keyed by name, usable as an `AclLookup`.
    pub fn acl_map(&self) -> BTreeMap<String, Acl> {
        self.acls
            .iter()
            .map(|acl| (acl.name.clone(), acl.clone()))
            .collect()
    }

    pub fn acl(&self, name: &str) -> Option<&Acl> {
        self.acls.iter().find(|acl| acl.name == name)
    }

    /// Checks the name and rules of `acl` against the document's ACLs and
    /// returns it normalized, the form `create` would store.
    pub fn validated_acl(&self, acl: &Acl) -> AclResult<Acl> {
        validate_name(&acl.name)?;
        let mut acl = acl.clone();
        validate_put(&mut acl.writable, &self.id_table())?;
        Ok(acl)
    }

    pub fn network(&self, name: &str) -> PolicyResult<&NetworkRecord> {
        self.networks
            .iter()
            .find(|network| network.name == name)
            .ok_or_else(|| PolicyError::UnknownNetwork {
                name: name.to_string(),
            })
    }

    pub fn peer_targets(&self) -> PeerTargets {
        self.peers
            .iter()
            .map(|p| (NetworkPeer::new(&p.network, &p.peer), p.target_network_id))
            .collect()
    }
}
