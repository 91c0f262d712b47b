//! The usage graph: which networks, NICs and other ACLs use an ACL.
//!
//! Edges are never stored; they are recomputed from the database on every
//! walk. Consumers visit them in a fixed order, cheapest first: networks,
//! profile NICs, ACL rule references, instance NICs.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use super::error::AclResult;
use super::rule::Acl;
use crate::db::{acl_list, AclDatabase, DeviceConfig, NetworkRecord};

/// Owner of a NIC device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NicOwner {
    Instance { project: String, name: String },
    Profile { project: String, name: String },
}

impl NicOwner {
    pub fn project(&self) -> &str {
        match self {
            NicOwner::Instance { project, .. } | NicOwner::Profile { project, .. } => project,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NicOwner::Instance { name, .. } | NicOwner::Profile { name, .. } => name,
        }
    }
}

/// One usage edge pointing at one or more ACLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usage {
    /// A network lists the ACLs in its own config.
    Network(NetworkRecord),
    /// A NIC device attached to `network` lists the ACLs.
    Nic {
        owner: NicOwner,
        device: String,
        /// Name of the managed network the NIC is attached to.
        network: String,
        config: DeviceConfig,
    },
    /// Another ACL references them from its rules.
    AclRef(Acl),
}

/// Usage to leave out of a walk, for records whose database state still
/// lists an ACL that is being removed from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageIgnore {
    Network { name: String },
    Nic { owner: NicOwner, device: String },
}

impl UsageIgnore {
    pub fn matches(&self, usage: &Usage) -> bool {
        match (self, usage) {
            (UsageIgnore::Network { name }, Usage::Network(network)) => *name == network.name,
            (
                UsageIgnore::Nic { owner, device },
                Usage::Nic {
                    owner: usage_owner,
                    device: usage_device,
                    ..
                },
            ) => owner == usage_owner && device == usage_device,
            _ => false,
        }
    }
}

impl Usage {
    /// API path of the record, for "used by" listings.
    pub fn url(&self, acl_project: &str) -> String {
        let (path, project) = match self {
            Usage::Network(network) => (format!("/1.0/networks/{}", network.name), acl_project),
            Usage::AclRef(acl) => (format!("/1.0/network-acls/{}", acl.name), acl_project),
            Usage::Nic { owner, .. } => {
                let kind = match owner {
                    NicOwner::Instance { .. } => "instances",
                    NicOwner::Profile { .. } => "profiles",
                };
                (format!("/1.0/{}/{}", kind, owner.name()), owner.project())
            }
        };

        if project == crate::acl::rule::default_project() {
            path
        } else {
            format!("{}?project={}", path, project)
        }
    }
}

/// Names from `listed` that are in `wanted`, in listing order, without repeats.
fn matched<'a>(listed: impl IntoIterator<Item = &'a str>, wanted: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in listed {
        if wanted.iter().any(|w| w == name) && !out.iter().any(|o| o == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// ACLs used by a device. Only NICs attached to a managed network count.
fn nic_matches(config: &DeviceConfig, wanted: &[String]) -> Vec<String> {
    let is_nic = config.get("type").map(String::as_str) == Some("nic");
    let has_network = config.get("network").is_some_and(|n| !n.is_empty());
    if !is_nic || !has_network {
        return Vec::new();
    }
    matched(acl_list(config), wanted)
}

/// Walks every usage of any of `names` in `project`.
///
/// `visit` receives the matched ACL names and the usage; returning
/// `ControlFlow::Break` ends the walk early.
pub async fn used_by<F>(
    db: &dyn AclDatabase,
    project: &str,
    names: &[String],
    mut visit: F,
) -> AclResult<()>
where
    F: FnMut(&[String], &Usage) -> AclResult<ControlFlow<()>>,
{
    if names.is_empty() {
        return Ok(());
    }

    for network in db.get_networks(project).await? {
        let hits = matched(network.acl_names(), names);
        if !hits.is_empty() && visit(&hits, &Usage::Network(network))?.is_break() {
            return Ok(());
        }
    }

    for profile in db.get_profiles(project).await? {
        let owner = NicOwner::Profile {
            project: profile.project,
            name: profile.name,
        };
        if visit_devices(&owner, profile.devices, names, &mut visit)?.is_break() {
            return Ok(());
        }
    }

    for acl in db.get_acls(project).await? {
        let own_name = acl.name.clone();
        let hits: Vec<String> = matched(acl.named_side_subjects(), names)
            .into_iter()
            .filter(|name| *name != own_name)
            .collect();
        if !hits.is_empty() && visit(&hits, &Usage::AclRef(acl))?.is_break() {
            return Ok(());
        }
    }

    for instance in db.get_instances(project).await? {
        let owner = NicOwner::Instance {
            project: instance.project,
            name: instance.name,
        };
        if visit_devices(&owner, instance.devices, names, &mut visit)?.is_break() {
            return Ok(());
        }
    }

    Ok(())
}

fn visit_devices<F>(
    owner: &NicOwner,
    devices: BTreeMap<String, DeviceConfig>,
    names: &[String],
    visit: &mut F,
) -> AclResult<ControlFlow<()>>
where
    F: FnMut(&[String], &Usage) -> AclResult<ControlFlow<()>>,
{
    for (device, config) in devices {
        let hits = nic_matches(&config, names);
        if hits.is_empty() {
            continue;
        }

        let usage = Usage::Nic {
            owner: owner.clone(),
            device,
            network: config.get("network").cloned().unwrap_or_default(),
            config,
        };
        if visit(&hits, &usage)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// API paths of every record using any of `names`. With `first_only` the
/// walk stops at the first one.
pub async fn usage_urls(
    db: &dyn AclDatabase,
    project: &str,
    names: &[String],
    first_only: bool,
) -> AclResult<Vec<String>> {
    let mut urls = Vec::new();
    used_by(db, project, names, |_, usage| {
        urls.push(usage.url(project));
        Ok(if first_only {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        })
    })
    .await?;
    Ok(urls)
}

/// Bridge and OVN networks using any of `names`, directly or through an
/// attached NIC, keyed by network name.
pub async fn network_usage(
    db: &dyn AclDatabase,
    project: &str,
    names: &[String],
) -> AclResult<BTreeMap<String, NetworkRecord>> {
    let mut direct = Vec::new();
    let mut via_nic = Vec::new();

    used_by(db, project, names, |_, usage| {
        match usage {
            Usage::Network(network) => direct.push(network.clone()),
            Usage::Nic { network, .. } => via_nic.push(network.clone()),
            Usage::AclRef(_) => {}
        }
        Ok(ControlFlow::Continue(()))
    })
    .await?;

    let mut networks: BTreeMap<String, NetworkRecord> = BTreeMap::new();
    for network in direct {
        if network.network_type.supports_acls() {
            networks.entry(network.name.clone()).or_insert(network);
        }
    }
    for name in via_nic {
        if networks.contains_key(&name) {
            continue;
        }
        let network = db.get_network(project, &name).await?;
        if network.network_type.supports_acls() {
            networks.insert(name, network);
        }
    }

    Ok(networks)
}
