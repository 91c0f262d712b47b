//! Port-group reconciliation.
//!
//! [`Reconciler::ensure_acls`] brings the control plane in line with a set of
//! ACLs: it creates missing ACL port groups and per-network port groups,
//! creates empty port groups for referenced ACLs, and replaces rules
//! wholesale where needed. Every creation is recorded as an [`UndoAction`];
//! on error the batch is unwound newest first before the error is returned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use netacl_orch_common::{IdTable, Revert};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::compile::{compile_acl, CompiledAcl, PeerTargets};
use super::error::{AclError, AclResult};
use super::resolve::resolve_references;
use super::rule::Acl;
use super::subject::ReservedSelector;
use crate::config::AclOrchConfig;
use crate::db::{AclDatabase, NetworkRecord, ProjectAcls};
use crate::ovn::names::{
    acl_network_port_group, acl_port_group, int_switch, int_switch_port_group,
    int_switch_router_port, PortGroupName, SwitchPortName,
};
use crate::ovn::{MatchSubstitutions, OvnClient};

/// Networks an ACL is applied to, keyed by network name.
pub type AclNetworks = BTreeMap<String, NetworkRecord>;

/// Inverse of one control-plane mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    DeletePortGroup(PortGroupName),
    /// Reverses a member addition.
    RemoveMember(PortGroupName, SwitchPortName),
    /// Reverses a member removal.
    AddMember(PortGroupName, SwitchPortName),
}

/// Undo list of a successful [`Reconciler::ensure_acls`] call, for callers
/// whose later steps fail.
pub struct RevertHandle {
    ovn: Arc<dyn OvnClient>,
    revert: Revert<UndoAction>,
}

impl std::fmt::Debug for RevertHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevertHandle")
            .field("actions", &self.revert.actions())
            .finish()
    }
}

impl RevertHandle {
    pub(super) fn new(ovn: Arc<dyn OvnClient>, revert: Revert<UndoAction>) -> Self {
        Self { ovn, revert }
    }

    /// Recorded actions, oldest first.
    pub fn actions(&self) -> &[UndoAction] {
        self.revert.actions()
    }

    pub fn is_empty(&self) -> bool {
        self.revert.is_empty()
    }

    /// Runs every recorded action, newest first, and returns them in the
    /// order they ran. Failures are logged and skipped.
    pub async fn fail(self) -> Vec<UndoAction> {
        let actions = self.revert.into_unwind_order();
        for action in &actions {
            let result = match action {
                UndoAction::DeletePortGroup(name) => {
                    self.ovn.port_group_delete(std::slice::from_ref(name)).await
                }
                UndoAction::RemoveMember(name, port) => {
                    self.ovn.port_group_member_remove(name, port).await
                }
                UndoAction::AddMember(name, port) => self.ovn.port_group_member_add(name, port).await,
            };
            if let Err(e) = result {
                warn!("Failed reverting {:?}: {}", action, e);
            }
        }
        actions
    }
}

/// An ACL whose port group already exists.
struct ExistingAcl {
    name: String,
    /// Loaded only when rules must be (re)applied.
    acl: Option<Acl>,
    /// Networks whose per-network port group is missing.
    add_networks: Vec<NetworkRecord>,
}

/// Drives port-group creation, rule application and garbage collection.
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) ovn: Arc<dyn OvnClient>,
    pub(crate) db: Arc<dyn AclDatabase>,
    pub(crate) config: AclOrchConfig,
    pub(crate) cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(ovn: Arc<dyn OvnClient>, db: Arc<dyn AclDatabase>) -> Self {
        Self {
            ovn,
            db,
            config: AclOrchConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: AclOrchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ovn(&self) -> &Arc<dyn OvnClient> {
        &self.ovn
    }

    /// Fails with [`AclError::Cancelled`] once the token fires. Called before
    /// every external call.
    pub(crate) fn checkpoint(&self) -> AclResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AclError::Cancelled);
        }
        Ok(())
    }

    /// Ensures the port groups of `acl_names` exist and carry their rules.
    ///
    /// `networks` are the networks needing per-network port groups. With
    /// `reapply` the rules of existing port groups are replaced even when
    /// nothing is missing. On success the returned handle undoes everything
    /// this call created. A cancelled call leaves its work in place.
    pub async fn ensure_acls(
        &self,
        project: &str,
        names: &IdTable,
        networks: &AclNetworks,
        acl_names: &[String],
        reapply: bool,
    ) -> AclResult<RevertHandle> {
        let mut revert = Revert::new();

        match self
            .ensure_acls_inner(project, names, networks, acl_names, reapply, &mut revert)
            .await
        {
            Ok(()) => Ok(RevertHandle::new(self.ovn.clone(), revert)),
            Err(AclError::Cancelled) => Err(AclError::Cancelled),
            Err(err) => {
                let undone = RevertHandle::new(self.ovn.clone(), revert).fail().await;
                debug!("Reverted {} port group creations after error: {}", undone.len(), err);
                Err(err)
            }
        }
    }

    async fn ensure_acls_inner(
        &self,
        project: &str,
        names: &IdTable,
        networks: &AclNetworks,
        acl_names: &[String],
        reapply: bool,
        revert: &mut Revert<UndoAction>,
    ) -> AclResult<()> {
        self.checkpoint()?;
        let project_id = self.db.get_project_id(project).await?;
        self.checkpoint()?;
        let peers = self.db.get_peer_targets(project).await?;

        for name in acl_names {
            names.require(name)?;
        }

        let mut create = Vec::new();
        let mut existing = Vec::new();

        for name in acl_names {
            let acl_id = names.require(name)?;
            let port_group = acl_port_group(acl_id);
            let state = self.port_group_state(&port_group, name).await?;

            if !state.exists {
                create.push(self.load_acl(project, name).await?);
                continue;
            }

            let mut add_networks = Vec::new();
            for network in networks.values() {
                let net_port_group = acl_network_port_group(acl_id, network.id);
                if !self.port_group_state(&net_port_group, name).await?.exists {
                    add_networks.push(network.clone());
                }
            }

            // An ACL port group without rules was only partially set up: the
            // default rule is always present once rules are applied.
            let acl = if reapply || !state.has_rules || !add_networks.is_empty() {
                Some(self.load_acl(project, name).await?)
            } else {
                None
            };

            existing.push(ExistingAcl {
                name: name.clone(),
                acl,
                add_networks,
            });
        }

        // Every ACL whose rules are about to be applied needs the port groups
        // its rules reference to exist first.
        let roots: Vec<&Acl> = create
            .iter()
            .chain(existing.iter().filter_map(|e| e.acl.as_ref()))
            .collect();
        let referenced = self.resolve(project, &roots).await?;
        let create_names: BTreeSet<&str> = create.iter().map(|acl| acl.name.as_str()).collect();

        for name in referenced.iter().filter(|n| !create_names.contains(n.as_str())) {
            let port_group = acl_port_group(names.require(name)?);
            if self.port_group_state(&port_group, name).await?.exists {
                continue;
            }

            debug!("Creating empty port group {} for referenced ACL {}", port_group, name);
            self.add_port_group(project_id, &port_group, None, revert)
                .await
                .map_err(|e| {
                    context(
                        e,
                        format!(
                            "Failed creating port group {:?} for referenced security ACL {:?} setup",
                            port_group.as_str(),
                            name
                        ),
                    )
                })?;
        }

        for acl in &create {
            let port_group = acl_port_group(acl.id);
            info!("Creating port group {} for ACL {}", port_group, acl.name);
            self.add_port_group(project_id, &port_group, None, revert)
                .await
                .map_err(|e| {
                    context(
                        e,
                        format!(
                            "Failed creating port group {:?} for security ACL {:?} setup",
                            port_group.as_str(),
                            acl.name
                        ),
                    )
                })?;

            for network in networks.values() {
                self.add_network_port_group(project_id, acl, &port_group, network, revert)
                    .await?;
            }

            self.apply_to_port_group(acl, &port_group, names, networks, &peers)
                .await?;
        }

        for status in &existing {
            let acl_id = names.require(&status.name)?;
            let port_group = acl_port_group(acl_id);

            if let Some(acl) = &status.acl {
                for network in &status.add_networks {
                    self.add_network_port_group(project_id, acl, &port_group, network, revert)
                        .await?;
                }

                debug!("Applying ACL {} rules to port group {}", acl.name, port_group);
                self.apply_to_port_group(acl, &port_group, names, networks, &peers)
                    .await?;
            }
        }

        Ok(())
    }

    async fn resolve(&self, project: &str, roots: &[&Acl]) -> AclResult<BTreeSet<String>> {
        if roots.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.checkpoint()?;
        let lookup = ProjectAcls::new(self.db.as_ref(), project);
        resolve_references(roots, &lookup).await
    }

    async fn load_acl(&self, project: &str, name: &str) -> AclResult<Acl> {
        self.checkpoint()?;
        self.db.get_acl(project, name).await
    }

    async fn port_group_state(
        &self,
        port_group: &PortGroupName,
        acl_name: &str,
    ) -> AclResult<crate::ovn::PortGroupState> {
        self.checkpoint()?;
        self.ovn.port_group_info(port_group).await.map_err(|e| {
            AclError::control_plane(
                format!(
                    "Failed getting port group {:?} for security ACL {:?} setup",
                    port_group.as_str(),
                    acl_name
                ),
                e,
            )
        })
    }

    /// Creates a port group and records its deletion. With `link` the group
    /// is created under the parent group and attached to the network's
    /// internal switch through its router port.
    async fn add_port_group(
        &self,
        project_id: i64,
        port_group: &PortGroupName,
        link: Option<(&PortGroupName, &NetworkRecord)>,
        revert: &mut Revert<UndoAction>,
    ) -> AclResult<()> {
        self.checkpoint()?;

        let result = match link {
            Some((parent, network)) => {
                let switch = int_switch(network.id);
                let router_port = int_switch_router_port(network.id);
                self.ovn
                    .port_group_add(
                        project_id,
                        port_group,
                        Some(parent),
                        Some(&switch),
                        std::slice::from_ref(&router_port),
                    )
                    .await
            }
            None => {
                self.ovn
                    .port_group_add(project_id, port_group, None, None, &[])
                    .await
            }
        };
        result.map_err(|e| AclError::control_plane("port_group_add", e))?;

        revert.add(UndoAction::DeletePortGroup(port_group.clone()));
        Ok(())
    }

    async fn add_network_port_group(
        &self,
        project_id: i64,
        acl: &Acl,
        port_group: &PortGroupName,
        network: &NetworkRecord,
        revert: &mut Revert<UndoAction>,
    ) -> AclResult<()> {
        let net_port_group = acl_network_port_group(acl.id, network.id);
        debug!(
            "Creating port group {} for ACL {} on network {}",
            net_port_group, acl.name, network.name
        );

        self.add_port_group(project_id, &net_port_group, Some((port_group, network)), revert)
            .await
            .map_err(|e| {
                context(
                    e,
                    format!(
                        "Failed creating port group {:?} for security ACL {:?} and network {:?} setup",
                        net_port_group.as_str(),
                        acl.name,
                        network.name
                    ),
                )
            })
    }

    /// Compiles `acl` and replaces the rules of its port group and of its
    /// per-network port group on every network in `networks`.
    ///
    /// Disabled rules are skipped. Network-relative rules go to the
    /// per-network groups with `@internal`/`@external` substituted; all
    /// other rules, plus the default rule, go to `port_group`.
    pub async fn apply_to_port_group(
        &self,
        acl: &Acl,
        port_group: &PortGroupName,
        names: &IdTable,
        networks: &AclNetworks,
        peers: &PeerTargets,
    ) -> AclResult<()> {
        let CompiledAcl {
            port_group_rules,
            network_rules,
            required_peers,
        } = compile_acl(acl, port_group, names, peers, &self.config)?;

        for network in networks.values() {
            if let Some(peer) = required_peers.iter().find(|p| p.network != network.name) {
                return Err(AclError::PeerNetworkMismatch {
                    peer: peer.to_string(),
                    network: network.name.clone(),
                });
            }
        }

        self.checkpoint()?;
        self.ovn
            .port_group_set_acl_rules(port_group, &MatchSubstitutions::new(), &port_group_rules)
            .await
            .map_err(|e| {
                AclError::control_plane(
                    format!(
                        "Failed applying ACL {:?} rules to port group {:?}",
                        acl.name,
                        port_group.as_str()
                    ),
                    e,
                )
            })?;

        // Applied even when empty so stale network rules are cleared.
        for network in networks.values() {
            let net_port_group = acl_network_port_group(acl.id, network.id);
            let substitutions = network_substitutions(network.id);

            self.checkpoint()?;
            self.ovn
                .port_group_set_acl_rules(&net_port_group, &substitutions, &network_rules)
                .await
                .map_err(|e| {
                    AclError::control_plane(
                        format!(
                            "Failed applying ACL {:?} rules to port group {:?} for network {:?}",
                            acl.name,
                            net_port_group.as_str(),
                            network.name
                        ),
                        e,
                    )
                })?;
        }

        Ok(())
    }
}

/// Per-network expansion of the reserved selector placeholders.
pub fn network_substitutions(network_id: i64) -> MatchSubstitutions {
    [
        (
            ReservedSelector::Internal.placeholder().to_string(),
            format!("@{}", int_switch_port_group(network_id)),
        ),
        (
            ReservedSelector::External.placeholder().to_string(),
            format!("\"{}\"", int_switch_router_port(network_id)),
        ),
    ]
    .into_iter()
    .collect()
}

/// Replaces the generic context of a control-plane error with `message`.
fn context(err: AclError, message: String) -> AclError {
    match err {
        AclError::ControlPlane { source, .. } => AclError::control_plane(message, source),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_network_substitutions() {
        let subs = network_substitutions(7);
        assert_eq!(subs["@internal"], "@net7");
        assert_eq!(subs["@external"], "\"net7-ls-int-lsp-router\"");
    }

    #[test]
    fn test_context_only_rewrites_control_plane_errors() {
        let err = context(
            AclError::control_plane("port_group_add", crate::ovn::OvnError::new("add", "boom")),
            "Failed creating port group \"acl1\"".to_string(),
        );
        assert_eq!(err.to_string(), "Failed creating port group \"acl1\": add: boom");

        let err = context(AclError::Cancelled, "ignored".to_string());
        assert!(matches!(err, AclError::Cancelled));
    }
}
