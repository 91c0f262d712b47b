//! Transitive discovery of ACLs referenced from rule subjects.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::error::{AclError, AclResult};
use super::rule::Acl;
use super::subject::Subject;

/// Source of ACL definitions for the resolver.
#[async_trait]
pub trait AclLookup: Send + Sync {
    /// Loads an ACL by name; errors if it does not exist.
    async fn lookup_acl(&self, name: &str) -> AclResult<Acl>;
}

#[async_trait]
impl AclLookup for BTreeMap<String, Acl> {
    async fn lookup_acl(&self, name: &str) -> AclResult<Acl> {
        self.get(name)
            .cloned()
            .ok_or_else(|| AclError::not_found("Network ACL", name))
    }
}

/// ACL names referenced by `acl`'s own rules: ingress Source and egress
/// Destination subjects that are not addresses, selectors or peers.
pub fn direct_references(acl: &Acl) -> BTreeSet<String> {
    acl.named_side_subjects()
        .filter_map(|item| match Subject::parse(item) {
            Ok(Subject::Acl(name)) => Some(name),
            _ => None,
        })
        .collect()
}

/// Every ACL reachable from `roots` through rule references, excluding the
/// roots themselves. Each ACL is loaded at most once, so cycles terminate.
pub async fn resolve_references(
    roots: &[&Acl],
    lookup: &dyn AclLookup,
) -> AclResult<BTreeSet<String>> {
    let root_names: BTreeSet<&str> = roots.iter().map(|acl| acl.name.as_str()).collect();
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<String> = roots.iter().flat_map(|acl| direct_references(acl)).collect();

    while let Some(name) = queue.pop_front() {
        if root_names.contains(name.as_str()) || !seen.insert(name.clone()) {
            continue;
        }

        let acl = lookup.lookup_acl(&name).await?;
        queue.extend(direct_references(&acl));
    }

    Ok(seen)
}
