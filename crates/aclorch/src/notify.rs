//! Cluster-wide change notification.

use async_trait::async_trait;

use crate::acl::AclResult;

/// Fans a change out to the other cluster members.
#[async_trait]
pub trait ClusterNotifier: Send + Sync {
    /// Asks every peer to re-apply `acl` in `project`. Best effort; a failure
    /// is reported as `AclError::Notify`.
    async fn notify_acl_updated(&self, project: &str, acl: &str) -> AclResult<()>;
}
