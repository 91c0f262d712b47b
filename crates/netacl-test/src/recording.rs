//! Recording firewall and cluster notifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use netacl_aclorch::acl::{AclError, AclResult, FirewallDriver, FirewallRule};
use netacl_aclorch::notify::ClusterNotifier;

/// Keeps every rule list it is asked to apply.
#[derive(Default)]
pub struct RecordingFirewall {
    applied: Mutex<Vec<(String, Vec<FirewallRule>)>>,
    fail: AtomicBool,
}

impl RecordingFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// `(network, rules)` in call order.
    pub fn applied(&self) -> Vec<(String, Vec<FirewallRule>)> {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The rules most recently applied to `network`.
    pub fn last_rules(&self, network: &str) -> Option<Vec<FirewallRule>> {
        self.applied()
            .into_iter()
            .rev()
            .find(|(name, _)| name == network)
            .map(|(_, rules)| rules)
    }
}

#[async_trait]
impl FirewallDriver for RecordingFirewall {
    async fn apply_acl_rules(&self, network: &str, rules: &[FirewallRule]) -> AclResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AclError::Firewall {
                network: network.to_string(),
                message: "injected failure".to_string(),
            });
        }

        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((network.to_string(), rules.to_vec()));
        Ok(())
    }
}

/// Keeps every `(project, acl)` notification.
#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn notified(&self) -> Vec<(String, String)> {
        self.notified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ClusterNotifier for RecordingNotifier {
    async fn notify_acl_updated(&self, project: &str, acl: &str) -> AclResult<()> {
        self.notified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((project.to_string(), acl.to_string()));

        if self.fail.load(Ordering::SeqCst) {
            return Err(AclError::Notify {
                message: "member unreachable".to_string(),
            });
        }
        Ok(())
    }
}
