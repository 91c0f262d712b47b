//! AclOrch - ACL lifecycle orchestration.
//!
//! Ties validation, persistence, the legacy firewall path and the OVN
//! reconciler together:
//!
//! ```text
//! create / update / rename / delete
//!        │
//!        ▼
//!    AclOrch ──> AclDatabase (persist, usage walk)
//!        │
//!        ├──> FirewallDriver   (bridge networks)
//!        ├──> Reconciler + GC  (OVN networks)
//!        └──> ClusterNotifier  (other members)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ensure::{AclNetworks, Reconciler, RevertHandle};
use super::error::{AclError, AclResult};
use super::firewall::{compile_firewall_rules, FirewallDriver};
use super::rule::{Acl, AclPut};
use super::usage::{network_usage, usage_urls};
use super::validate::{validate_name, validate_put};
use crate::config::AclOrchConfig;
use crate::db::{AclDatabase, NetworkRecord, NetworkType, ProjectAcls};
use crate::notify::ClusterNotifier;
use crate::ovn::{OvnClient, OvnError};

/// Where an update request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateOrigin {
    /// A user request handled by this member.
    #[default]
    Local,
    /// Re-application requested by the member that handled the user request.
    /// The database is already updated and OVN already reconciled.
    ClusterPeer,
}

/// Statistics for AclOrch operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclOrchStats {
    pub acls_created: u64,
    pub acls_updated: u64,
    pub acls_renamed: u64,
    pub acls_deleted: u64,
    /// Networks whose firewall rules were replaced.
    pub firewall_applies: u64,
    pub port_groups_deleted: u64,
    /// Updates that failed and were rolled back.
    pub rollbacks: u64,
}

/// AclOrch - main ACL orchestration structure.
pub struct AclOrch {
    config: AclOrchConfig,
    db: Arc<dyn AclDatabase>,
    reconciler: Option<Reconciler>,
    firewall: Option<Arc<dyn FirewallDriver>>,
    notifier: Option<Arc<dyn ClusterNotifier>>,
    cancel: CancellationToken,
    stats: AclOrchStats,
}

impl fmt::Debug for AclOrch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclOrch")
            .field("config", &self.config)
            .field("ovn", &self.reconciler.is_some())
            .field("firewall", &self.firewall.is_some())
            .field("notifier", &self.notifier.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl AclOrch {
    pub fn new(db: Arc<dyn AclDatabase>) -> Self {
        Self {
            config: AclOrchConfig::default(),
            db,
            reconciler: None,
            firewall: None,
            notifier: None,
            cancel: CancellationToken::new(),
            stats: AclOrchStats::default(),
        }
    }

    pub fn with_config(mut self, config: AclOrchConfig) -> Self {
        self.reconciler = self.reconciler.map(|r| r.with_config(config.clone()));
        self.config = config;
        self
    }

    pub fn with_ovn(mut self, ovn: Arc<dyn OvnClient>) -> Self {
        self.reconciler = Some(
            Reconciler::new(ovn, self.db.clone())
                .with_config(self.config.clone())
                .with_cancellation(self.cancel.clone()),
        );
        self
    }

    pub fn with_firewall(mut self, firewall: Arc<dyn FirewallDriver>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ClusterNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.reconciler = self.reconciler.map(|r| r.with_cancellation(cancel.clone()));
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AclOrchConfig {
        &self.config
    }

    pub fn stats(&self) -> &AclOrchStats {
        &self.stats
    }

    /// The OVN reconciler, if an OVN client is configured.
    pub fn reconciler(&self) -> Option<&Reconciler> {
        self.reconciler.as_ref()
    }

    fn checkpoint(&self) -> AclResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AclError::Cancelled);
        }
        Ok(())
    }

    fn require_reconciler(&self) -> AclResult<&Reconciler> {
        self.reconciler.as_ref().ok_or_else(|| {
            AclError::control_plane(
                "Failed to get OVN client",
                OvnError::new("connect", "no OVN client configured"),
            )
        })
    }

    /// Loads an ACL by name.
    pub async fn load(&self, project: &str, name: &str) -> AclResult<Acl> {
        self.checkpoint()?;
        self.db.get_acl(project, name).await
    }

    /// Validates and inserts a new ACL.
    #[instrument(skip(self, put))]
    pub async fn create(&mut self, project: &str, name: &str, mut put: AclPut) -> AclResult<Acl> {
        validate_name(name)?;

        self.checkpoint()?;
        let names = self.db.get_acl_name_to_id_map(project).await?;
        if names.contains(name) {
            return Err(AclError::AlreadyExists {
                name: name.to_string(),
            });
        }
        validate_put(&mut put, &names)?;

        self.checkpoint()?;
        let id = self.db.create_acl(project, name, &put).await?;
        self.stats.acls_created += 1;
        info!("Created ACL {} (id {}) in project {}", name, id, project);

        Ok(Acl {
            id,
            project: project.to_string(),
            name: name.to_string(),
            writable: put,
        })
    }

    /// Checks that every name exists in the project and none is listed twice.
    pub async fn exists(&self, project: &str, names: &[String]) -> AclResult<()> {
        self.checkpoint()?;
        let existing = self.db.get_acl_name_to_id_map(project).await?;

        let mut checked = Vec::with_capacity(names.len());
        for name in names {
            if !existing.contains(name) {
                return Err(AclError::not_found("Network ACL", name.clone()));
            }
            if checked.contains(&name) {
                return Err(AclError::DuplicateName { name: name.clone() });
            }
            checked.push(name);
        }

        Ok(())
    }

    /// Replaces an ACL's writable config and re-applies it wherever it is used.
    ///
    /// For a local update the new config is persisted first, then bridge
    /// networks get new firewall rules and OVN networks are reconciled and
    /// garbage collected. Any failure restores the old config and undoes the
    /// port groups the reconciler created. Peers are notified last; a notify
    /// failure is returned without rolling back.
    #[instrument(skip(self, put))]
    pub async fn update(
        &mut self,
        project: &str,
        name: &str,
        mut put: AclPut,
        origin: UpdateOrigin,
    ) -> AclResult<()> {
        self.checkpoint()?;
        let current = self.db.get_acl(project, name).await?;
        self.checkpoint()?;
        let names = self.db.get_acl_name_to_id_map(project).await?;
        validate_put(&mut put, &names)?;

        let restore = if origin == UpdateOrigin::Local {
            self.checkpoint()?;
            self.db.update_acl(current.id, &put).await?;
            Some(current.writable.clone())
        } else {
            None
        };

        let bridge_networks = match self.apply_update(project, name, origin).await {
            Ok(networks) => networks,
            Err((err, handle)) => {
                if !matches!(err, AclError::Cancelled) {
                    self.rollback(current.id, name, restore, handle).await;
                }
                return Err(err);
            }
        };

        self.stats.acls_updated += 1;
        info!("Updated ACL {} in project {}", name, project);

        if origin == UpdateOrigin::Local && self.config.notify_peers && !bridge_networks.is_empty()
        {
            if let Some(notifier) = &self.notifier {
                self.checkpoint()?;
                debug!("Notifying cluster members of ACL {} update", name);
                notifier.notify_acl_updated(project, name).await?;
            }
        }

        Ok(())
    }

    /// Applies the persisted config to every network using the ACL. Returns
    /// the bridge networks, or the error together with the reconciler's undo
    /// handle if one was already obtained.
    async fn apply_update(
        &mut self,
        project: &str,
        name: &str,
        origin: UpdateOrigin,
    ) -> Result<Vec<NetworkRecord>, (AclError, Option<RevertHandle>)> {
        let target = [name.to_string()];

        self.checkpoint().map_err(|e| (e, None))?;
        let networks = network_usage(self.db.as_ref(), project, &target)
            .await
            .map_err(|e| (e, None))?;

        let (bridge_networks, ovn_networks) = partition_networks(networks).map_err(|e| (e, None))?;

        for network in &bridge_networks {
            self.apply_firewall_rules(project, network)
                .await
                .map_err(|e| (e, None))?;
        }

        if ovn_networks.is_empty() || origin != UpdateOrigin::Local {
            return Ok(bridge_networks);
        }

        let reconciler = self.require_reconciler().map_err(|e| (e, None))?.clone();
        self.checkpoint().map_err(|e| (e, None))?;
        let names = self
            .db
            .get_acl_name_to_id_map(project)
            .await
            .map_err(|e| (e, None))?;

        let handle = reconciler
            .ensure_acls(project, &names, &ovn_networks, &target, true)
            .await
            .map_err(|e| (e, None))?;

        match reconciler.delete_if_unused(project, None, &target).await {
            Ok(deleted) => {
                self.stats.port_groups_deleted += deleted.len() as u64;
                Ok(bridge_networks)
            }
            Err(e) => Err((e, Some(handle))),
        }
    }

    async fn rollback(
        &mut self,
        acl_id: i64,
        name: &str,
        restore: Option<AclPut>,
        handle: Option<RevertHandle>,
    ) {
        self.stats.rollbacks += 1;

        if let Some(handle) = handle {
            let undone = handle.fail().await;
            debug!("Reverted {} port group creations for ACL {}", undone.len(), name);
        }

        if let Some(old) = restore {
            if let Err(e) = self.db.update_acl(acl_id, &old).await {
                warn!("Failed restoring previous config of ACL {}: {}", name, e);
            }
        }
    }

    /// Compiles and pushes the firewall rules of one bridge network.
    pub async fn apply_firewall_rules(
        &mut self,
        project: &str,
        network: &NetworkRecord,
    ) -> AclResult<()> {
        let firewall = self.firewall.clone().ok_or_else(|| AclError::Firewall {
            network: network.name.clone(),
            message: "no firewall driver configured".to_string(),
        })?;

        self.checkpoint()?;
        let lookup = ProjectAcls::new(self.db.as_ref(), project);
        let rules =
            compile_firewall_rules(network, &lookup, self.config.firewall_default_action).await?;

        self.checkpoint()?;
        debug!("Applying {} firewall rules to network {}", rules.len(), network.name);
        firewall.apply_acl_rules(&network.name, &rules).await?;
        self.stats.firewall_applies += 1;

        Ok(())
    }

    /// Renames an unused ACL. The identifier, and so every derived
    /// control-plane name, is unchanged.
    #[instrument(skip(self))]
    pub async fn rename(&mut self, project: &str, name: &str, new_name: &str) -> AclResult<()> {
        self.checkpoint()?;
        let current = self.db.get_acl(project, name).await?;

        self.checkpoint()?;
        let names = self.db.get_acl_name_to_id_map(project).await?;
        if names.contains(new_name) {
            return Err(AclError::AlreadyExists {
                name: new_name.to_string(),
            });
        }

        if self.is_used(project, name).await? {
            return Err(AclError::InUse {
                name: name.to_string(),
                operation: "rename",
            });
        }

        validate_name(new_name)?;

        self.checkpoint()?;
        self.db.rename_acl(current.id, new_name).await?;
        self.stats.acls_renamed += 1;
        info!("Renamed ACL {} to {} in project {}", name, new_name, project);

        Ok(())
    }

    /// Deletes an unused ACL.
    #[instrument(skip(self))]
    pub async fn delete(&mut self, project: &str, name: &str) -> AclResult<()> {
        self.checkpoint()?;
        let current = self.db.get_acl(project, name).await?;

        if self.is_used(project, name).await? {
            return Err(AclError::InUse {
                name: name.to_string(),
                operation: "delete",
            });
        }

        self.checkpoint()?;
        self.db.delete_acl(current.id).await?;
        self.stats.acls_deleted += 1;
        info!("Deleted ACL {} in project {}", name, project);

        Ok(())
    }

    /// API paths of every network, profile, ACL and instance using the ACL.
    pub async fn used_by(&self, project: &str, name: &str) -> AclResult<Vec<String>> {
        self.checkpoint()?;
        usage_urls(self.db.as_ref(), project, &[name.to_string()], false).await
    }

    /// Whether anything uses the ACL. Stops at the first usage.
    pub async fn is_used(&self, project: &str, name: &str) -> AclResult<bool> {
        self.checkpoint()?;
        let urls = usage_urls(self.db.as_ref(), project, &[name.to_string()], true).await?;
        Ok(!urls.is_empty())
    }

    /// Bridge and OVN networks using any of `names`.
    pub async fn network_usage(
        &self,
        project: &str,
        names: &[String],
    ) -> AclResult<BTreeMap<String, NetworkRecord>> {
        self.checkpoint()?;
        network_usage(self.db.as_ref(), project, names).await
    }
}

/// Splits networks into bridge networks and OVN networks.
fn partition_networks(
    networks: BTreeMap<String, NetworkRecord>,
) -> AclResult<(Vec<NetworkRecord>, AclNetworks)> {
    let mut bridge = Vec::new();
    let mut ovn = AclNetworks::new();

    for (name, network) in networks {
        match &network.network_type {
            NetworkType::Ovn => {
                ovn.insert(name, network);
            }
            NetworkType::Bridge => bridge.push(network),
            NetworkType::Other(other) => {
                return Err(AclError::UnsupportedNetworkType {
                    network_type: other.clone(),
                })
            }
        }
    }

    Ok((bridge, ovn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partition_networks() {
        let networks: BTreeMap<String, NetworkRecord> = [
            NetworkRecord::new(1, "br0", NetworkType::Bridge),
            NetworkRecord::new(2, "ovn0", NetworkType::Ovn),
            NetworkRecord::new(3, "ovn1", NetworkType::Ovn),
        ]
        .into_iter()
        .map(|n| (n.name.clone(), n))
        .collect();

        let (bridge, ovn) = partition_networks(networks).unwrap();
        assert_eq!(bridge.len(), 1);
        assert_eq!(bridge[0].name, "br0");
        assert_eq!(ovn.keys().collect::<Vec<_>>(), vec!["ovn0", "ovn1"]);
    }

    #[test]
    fn test_partition_rejects_unknown_types() {
        let networks: BTreeMap<String, NetworkRecord> = [(
            "mv0".to_string(),
            NetworkRecord::new(1, "mv0", NetworkType::Other("macvlan".to_string())),
        )]
        .into_iter()
        .collect();

        let err = partition_networks(networks).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported network ACL type \"macvlan\"");
    }

    #[test]
    fn test_update_origin_default() {
        assert_eq!(UpdateOrigin::default(), UpdateOrigin::Local);
    }
}
