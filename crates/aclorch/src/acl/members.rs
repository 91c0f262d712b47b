//! NIC port membership of network and ACL port groups.
//!
//! A NIC port joins its network's switch port group, which `@internal`
//! expands to, and the port group of every ACL applied to it. Changes are
//! collected into [`PortGroupChangeSet`]s and applied in one call.

use netacl_orch_common::{IdTable, Revert};
use tracing::{debug, instrument};

use super::ensure::{Reconciler, RevertHandle, UndoAction};
use super::error::{AclError, AclResult};
use crate::ovn::names::{acl_port_group, int_switch_port_group, PortGroupName, SwitchPortName};
use crate::ovn::PortGroupChangeSet;

/// Port groups a NIC port on `network_id` must belong to: the network's
/// switch port group first, then the port group of each ACL in `acl_names`.
pub fn nic_port_groups(
    names: &IdTable,
    network_id: i64,
    acl_names: &[String],
) -> AclResult<Vec<PortGroupName>> {
    let mut port_groups = vec![int_switch_port_group(network_id)];
    for name in acl_names {
        port_groups.push(acl_port_group(names.require(name)?));
    }
    Ok(port_groups)
}

impl Reconciler {
    /// Adds and removes port-group members. Additions run before removals.
    ///
    /// On error every change already made is reversed, newest first, before
    /// the error is returned; a reversed removal re-adds the port. A
    /// cancelled call leaves its changes in place.
    #[instrument(skip_all, fields(add = add.len(), remove = remove.len()))]
    pub async fn apply_port_group_changes(
        &self,
        add: &PortGroupChangeSet,
        remove: &PortGroupChangeSet,
    ) -> AclResult<()> {
        let mut revert = Revert::new();

        match self
            .apply_port_group_changes_inner(add, remove, &mut revert)
            .await
        {
            Ok(()) => Ok(()),
            Err(AclError::Cancelled) => Err(AclError::Cancelled),
            Err(err) => {
                let undone = RevertHandle::new(self.ovn.clone(), revert).fail().await;
                debug!("Reverted {} member changes after error: {}", undone.len(), err);
                Err(err)
            }
        }
    }

    async fn apply_port_group_changes_inner(
        &self,
        add: &PortGroupChangeSet,
        remove: &PortGroupChangeSet,
        revert: &mut Revert<UndoAction>,
    ) -> AclResult<()> {
        for (port_group, ports) in add {
            for port in ports {
                self.checkpoint()?;
                debug!("Adding port {} to port group {}", port, port_group);
                self.ovn
                    .port_group_member_add(port_group, port)
                    .await
                    .map_err(|e| member_error("adding", port_group, port, e))?;
                revert.add(UndoAction::RemoveMember(port_group.clone(), port.clone()));
            }
        }

        for (port_group, ports) in remove {
            for port in ports {
                self.checkpoint()?;
                debug!("Removing port {} from port group {}", port, port_group);
                self.ovn
                    .port_group_member_remove(port_group, port)
                    .await
                    .map_err(|e| member_error("removing", port_group, port, e))?;
                revert.add(UndoAction::AddMember(port_group.clone(), port.clone()));
            }
        }

        Ok(())
    }
}

fn member_error(
    verb: &str,
    port_group: &PortGroupName,
    port: &SwitchPortName,
    err: crate::ovn::OvnError,
) -> AclError {
    AclError::control_plane(
        format!(
            "Failed {} port {:?} in port group {:?}",
            verb,
            port.as_str(),
            port_group.as_str()
        ),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nic_port_groups() {
        let names: IdTable = [("web", 1), ("db", 2)].into_iter().collect();

        let groups = nic_port_groups(&names, 7, &["db".to_string(), "web".to_string()]).unwrap();
        assert_eq!(
            groups,
            vec![
                PortGroupName::from("net7"),
                PortGroupName::from("acl2"),
                PortGroupName::from("acl1"),
            ]
        );

        assert_eq!(
            nic_port_groups(&names, 7, &[]).unwrap(),
            vec![PortGroupName::from("net7")]
        );
        assert!(matches!(
            nic_port_groups(&names, 7, &["ghost".to_string()]),
            Err(AclError::UnknownAcl { .. })
        ));
    }
}
