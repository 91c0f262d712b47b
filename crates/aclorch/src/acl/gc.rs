//! Garbage collection of ACL port groups no longer reachable from any
//! OVN-backed network or NIC.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use tracing::{debug, info};

use super::ensure::Reconciler;
use super::error::{AclError, AclResult};
use super::usage::{used_by, Usage, UsageIgnore};
use crate::db::{NetworkRecord, NetworkType};
use crate::ovn::names::{acl_network_port_group, acl_port_group, PortGroupKind, PortGroupName};

impl Reconciler {
    /// Deletes the project's ACL port groups that nothing uses and returns
    /// their names.
    ///
    /// ACLs in `keep` are treated as used by an OVN entity, so they and the
    /// ACLs their rules reference survive even if the database does not yet
    /// show the usage. `ignore` skips one usage whose database record still
    /// lists ACLs that are being removed from it.
    pub async fn delete_if_unused(
        &self,
        project: &str,
        ignore: Option<&UsageIgnore>,
        keep: &[String],
    ) -> AclResult<Vec<PortGroupName>> {
        self.checkpoint()?;
        let names = self.db.get_acl_name_to_id_map(project).await?;
        self.checkpoint()?;
        let project_id = self.db.get_project_id(project).await?;

        self.checkpoint()?;
        let port_groups = self
            .ovn
            .port_group_list_by_project(project_id)
            .await
            .map_err(|e| {
                AclError::control_plane(
                    format!("Failed getting port groups for project {:?}", project),
                    e,
                )
            })?;

        let keep_ids: BTreeSet<i64> = keep.iter().filter_map(|name| names.get(name)).collect();
        let mut candidates: BTreeSet<PortGroupName> = port_groups
            .into_iter()
            .filter(|pg| {
                PortGroupKind::parse(pg).is_some_and(|kind| !keep_ids.contains(&kind.acl_id()))
            })
            .collect();

        let mut ovn_used: BTreeSet<String> = keep.iter().cloned().collect();
        let mut referrers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        let all_names: Vec<String> = names.names().map(String::from).collect();
        let mut usages = Vec::new();
        self.checkpoint()?;
        used_by(self.db.as_ref(), project, &all_names, |matched, usage| {
            if !ignore.is_some_and(|ignore| ignore.matches(usage)) {
                usages.push((matched.to_vec(), usage.clone()));
            }
            Ok(ControlFlow::Continue(()))
        })
        .await?;

        let mut networks: BTreeMap<String, NetworkRecord> = BTreeMap::new();
        for (matched, usage) in usages {
            let network = match usage {
                Usage::Network(network) => network,
                Usage::Nic { network, .. } => match networks.get(&network) {
                    Some(record) => record.clone(),
                    None => {
                        self.checkpoint()?;
                        let record = self.db.get_network(project, &network).await?;
                        networks.insert(network, record.clone());
                        record
                    }
                },
                Usage::AclRef(acl) => {
                    for name in matched {
                        referrers.entry(name).or_default().insert(acl.name.clone());
                    }
                    continue;
                }
            };

            if network.network_type != NetworkType::Ovn {
                continue;
            }

            for name in matched {
                if let Some(acl_id) = names.get(&name) {
                    candidates.remove(&acl_port_group(acl_id));
                    candidates.remove(&acl_network_port_group(acl_id, network.id));
                }
                ovn_used.insert(name);
            }
        }

        // Referenced ACLs stay while any ACL referencing them is in use.
        for (name, by) in &referrers {
            if by.iter().any(|referrer| ovn_used.contains(referrer)) {
                if let Some(acl_id) = names.get(name) {
                    candidates.remove(&acl_port_group(acl_id));
                }
            }
        }

        let remove: Vec<PortGroupName> = candidates.into_iter().collect();
        if remove.is_empty() {
            return Ok(remove);
        }

        for port_group in &remove {
            debug!("Scheduled deletion of unused ACL port group {}", port_group);
        }

        self.checkpoint()?;
        self.ovn.port_group_delete(&remove).await.map_err(|e| {
            AclError::control_plane("Failed to delete unused OVN port groups", e)
        })?;
        info!("Deleted {} unused ACL port groups in project {}", remove.len(), project);

        Ok(remove)
    }
}
