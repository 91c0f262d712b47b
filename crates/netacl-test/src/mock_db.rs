//! In-memory database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use netacl_aclorch::acl::{Acl, AclError, AclPut, AclResult, NetworkPeer, PeerTargets};
use netacl_aclorch::db::{AclDatabase, InstanceRecord, NetworkRecord, ProfileRecord};
use netacl_orch_common::IdTable;

#[derive(Default)]
struct State {
    projects: BTreeMap<String, i64>,
    acls: BTreeMap<i64, Acl>,
    next_id: i64,
    networks: BTreeMap<String, BTreeMap<String, NetworkRecord>>,
    profiles: BTreeMap<String, Vec<ProfileRecord>>,
    instances: BTreeMap<String, Vec<InstanceRecord>>,
    peers: BTreeMap<String, PeerTargets>,
    fail_on: BTreeSet<&'static str>,
}

/// [`AclDatabase`] over plain maps. The `default` project exists with
/// identifier 1.
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        let mut state = State {
            next_id: 1,
            ..State::default()
        };
        state.projects.insert("default".to_string(), 1);
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, operation: &'static str) -> AclResult<()> {
        if self.lock().fail_on.contains(operation) {
            return Err(AclError::database(operation, "injected failure"));
        }
        Ok(())
    }

    /// Makes every later call of `operation` fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().fail_on.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.lock().fail_on.clear();
    }

    pub fn add_project(&self, name: &str, id: i64) {
        self.lock().projects.insert(name.to_string(), id);
    }

    /// Stores an ACL as is, without validation, and returns its identifier.
    pub fn add_acl(&self, project: &str, name: &str, put: AclPut) -> i64 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.acls.insert(
            id,
            Acl {
                id,
                project: project.to_string(),
                name: name.to_string(),
                writable: put,
            },
        );
        id
    }

    pub fn add_network(&self, project: &str, network: NetworkRecord) {
        self.lock()
            .networks
            .entry(project.to_string())
            .or_default()
            .insert(network.name.clone(), network);
    }

    /// Sets or, with `None`, removes one config key of a network.
    pub fn set_network_config(&self, project: &str, network: &str, key: &str, value: Option<&str>) {
        let mut state = self.lock();
        if let Some(record) = state
            .networks
            .get_mut(project)
            .and_then(|networks| networks.get_mut(network))
        {
            match value {
                Some(value) => {
                    record.config.insert(key.to_string(), value.to_string());
                }
                None => {
                    record.config.remove(key);
                }
            }
        }
    }

    pub fn add_profile(&self, project: &str, profile: ProfileRecord) {
        self.lock()
            .profiles
            .entry(project.to_string())
            .or_default()
            .push(profile);
    }

    pub fn add_instance(&self, project: &str, instance: InstanceRecord) {
        self.lock()
            .instances
            .entry(project.to_string())
            .or_default()
            .push(instance);
    }

    pub fn add_peer(&self, project: &str, peer: NetworkPeer, target_network_id: i64) {
        self.lock()
            .peers
            .entry(project.to_string())
            .or_default()
            .insert(peer, target_network_id);
    }

    /// Current stored copy of an ACL.
    pub fn acl(&self, project: &str, name: &str) -> Option<Acl> {
        self.lock()
            .acls
            .values()
            .find(|acl| acl.project == project && acl.name == name)
            .cloned()
    }

    fn acl_by_id<'a>(state: &'a mut State, id: i64) -> AclResult<&'a mut Acl> {
        state
            .acls
            .get_mut(&id)
            .ok_or_else(|| AclError::not_found("Network ACL", format!("#{}", id)))
    }
}

#[async_trait]
impl AclDatabase for MemoryDatabase {
    async fn get_project_id(&self, project: &str) -> AclResult<i64> {
        self.check("get_project_id")?;
        self.lock()
            .projects
            .get(project)
            .copied()
            .ok_or_else(|| AclError::not_found("Project", project))
    }

    async fn get_acl(&self, project: &str, name: &str) -> AclResult<Acl> {
        self.check("get_acl")?;
        self.acl(project, name)
            .ok_or_else(|| AclError::not_found("Network ACL", name))
    }

    async fn get_acls(&self, project: &str) -> AclResult<Vec<Acl>> {
        self.check("get_acls")?;
        let mut acls: Vec<Acl> = self
            .lock()
            .acls
            .values()
            .filter(|acl| acl.project == project)
            .cloned()
            .collect();
        acls.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(acls)
    }

    async fn get_acl_name_to_id_map(&self, project: &str) -> AclResult<IdTable> {
        self.check("get_acl_name_to_id_map")?;
        Ok(self
            .lock()
            .acls
            .values()
            .filter(|acl| acl.project == project)
            .map(|acl| (acl.name.clone(), acl.id))
            .collect())
    }

    async fn create_acl(&self, project: &str, name: &str, put: &AclPut) -> AclResult<i64> {
        self.check("create_acl")?;
        if self.acl(project, name).is_some() {
            return Err(AclError::database(
                "create_acl",
                format!("ACL {:?} already exists", name),
            ));
        }
        Ok(self.add_acl(project, name, put.clone()))
    }

    async fn update_acl(&self, id: i64, put: &AclPut) -> AclResult<()> {
        self.check("update_acl")?;
        let mut state = self.lock();
        Self::acl_by_id(&mut state, id)?.writable = put.clone();
        Ok(())
    }

    async fn rename_acl(&self, id: i64, new_name: &str) -> AclResult<()> {
        self.check("rename_acl")?;
        let mut state = self.lock();
        Self::acl_by_id(&mut state, id)?.name = new_name.to_string();
        Ok(())
    }

    async fn delete_acl(&self, id: i64) -> AclResult<()> {
        self.check("delete_acl")?;
        self.lock()
            .acls
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AclError::not_found("Network ACL", format!("#{}", id)))
    }

    async fn get_networks(&self, project: &str) -> AclResult<Vec<NetworkRecord>> {
        self.check("get_networks")?;
        Ok(self
            .lock()
            .networks
            .get(project)
            .map(|networks| networks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_network(&self, project: &str, name: &str) -> AclResult<NetworkRecord> {
        self.check("get_network")?;
        self.lock()
            .networks
            .get(project)
            .and_then(|networks| networks.get(name))
            .cloned()
            .ok_or_else(|| AclError::not_found("Network", name))
    }

    async fn get_profiles(&self, project: &str) -> AclResult<Vec<ProfileRecord>> {
        self.check("get_profiles")?;
        Ok(self.lock().profiles.get(project).cloned().unwrap_or_default())
    }

    async fn get_instances(&self, project: &str) -> AclResult<Vec<InstanceRecord>> {
        self.check("get_instances")?;
        Ok(self.lock().instances.get(project).cloned().unwrap_or_default())
    }

    async fn get_peer_targets(&self, project: &str) -> AclResult<PeerTargets> {
        self.check("get_peer_targets")?;
        Ok(self.lock().peers.get(project).cloned().unwrap_or_default())
    }
}
