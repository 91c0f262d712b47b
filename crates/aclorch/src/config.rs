//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::acl::RuleAction;

/// Maximum length of a control-plane log label.
pub const DEFAULT_LOG_NAME_MAX_LEN: usize = 63;

/// Configuration for [`AclOrch`](crate::acl::AclOrch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclOrchConfig {
    /// Action of the catch-all rule appended to every ACL port group.
    pub default_port_group_action: RuleAction,
    /// Log labels of logged rules are truncated to this many characters.
    pub log_name_max_len: usize,
    /// Legacy firewall default action when a network does not set one.
    pub firewall_default_action: RuleAction,
    /// Ask cluster members to re-apply an ACL after a local update.
    pub notify_peers: bool,
}

impl Default for AclOrchConfig {
    fn default() -> Self {
        Self {
            default_port_group_action: RuleAction::Drop,
            log_name_max_len: DEFAULT_LOG_NAME_MAX_LEN,
            firewall_default_action: RuleAction::Reject,
            notify_peers: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = AclOrchConfig::default();
        assert_eq!(config.default_port_group_action, RuleAction::Drop);
        assert_eq!(config.log_name_max_len, 63);
        assert_eq!(config.firewall_default_action, RuleAction::Reject);
        assert!(config.notify_peers);
    }

    #[test]
    fn test_config_partial_yaml() {
        let config: AclOrchConfig = serde_yaml::from_str("notify_peers: false\n").unwrap();
        assert!(!config.notify_peers);
        assert_eq!(config.log_name_max_len, DEFAULT_LOG_NAME_MAX_LEN);
    }
}
