//! Legacy host-firewall path for non-SDN (bridge) networks.
//!
//! The firewall has no port-group concept: it receives one flat, already
//! ordered rule list per network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::AclResult;
use super::resolve::AclLookup;
use super::rule::Rule;
use super::types::{Direction, Protocol, RuleAction, RuleState};
use crate::db::NetworkRecord;
use crate::ovn::NicDefaults;

/// One rule as handed to the host firewall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub direction: Direction,
    pub action: RuleAction,
    pub logged: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_port: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination_port: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icmp_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icmp_code: String,
}

impl FirewallRule {
    fn from_rule(direction: Direction, rule: &Rule, log_name: String) -> Self {
        Self {
            direction,
            action: rule.action,
            logged: rule.state == RuleState::Logged,
            log_name,
            source: rule.source.clone(),
            destination: rule.destination.clone(),
            protocol: rule.protocol,
            source_port: rule.source_port.clone(),
            destination_port: rule.destination_port.clone(),
            icmp_type: rule.icmp_type.clone(),
            icmp_code: rule.icmp_code.clone(),
        }
    }

    /// Catch-all rule for traffic no ACL rule matched.
    pub fn default_action(direction: Direction, action: RuleAction, logged: bool) -> Self {
        Self {
            direction,
            action,
            logged,
            log_name: String::new(),
            source: String::new(),
            destination: String::new(),
            protocol: None,
            source_port: String::new(),
            destination_port: String::new(),
            icmp_type: String::new(),
            icmp_code: String::new(),
        }
    }
}

/// Host firewall collaborator.
#[async_trait]
pub trait FirewallDriver: Send + Sync {
    /// Replaces every ACL rule of `network`. Errors are reported as
    /// `AclError::Firewall`.
    async fn apply_acl_rules(&self, network: &str, rules: &[FirewallRule]) -> AclResult<()>;
}

/// Compiles the rules of every ACL listed on a bridge network.
///
/// Rules are grouped drop, then reject, then allow, keeping ACL and list
/// order within a group. Egress then ingress default rules come last, from
/// the network's `security.acls.default.*` keys with `fallback_action`
/// when unset.
pub async fn compile_firewall_rules(
    network: &NetworkRecord,
    acls: &dyn AclLookup,
    fallback_action: RuleAction,
) -> AclResult<Vec<FirewallRule>> {
    let mut drop = Vec::new();
    let mut reject = Vec::new();
    let mut allow = Vec::new();

    for name in network.acl_names() {
        let acl = acls.lookup_acl(name).await?;

        for direction in Direction::ALL {
            for (index, rule) in acl.rules(direction).iter().enumerate() {
                if !rule.state.is_active() {
                    continue;
                }

                let rule = rule.clone().normalized();
                let log_name = format!("{}-{}-{}", acl.name, direction, index);
                let bucket = match rule.action {
                    RuleAction::Drop => &mut drop,
                    RuleAction::Reject => &mut reject,
                    RuleAction::Allow => &mut allow,
                };
                bucket.push(FirewallRule::from_rule(direction, &rule, log_name));
            }
        }
    }

    let defaults = NicDefaults::from_config(&network.config, fallback_action)?;

    let mut rules = drop;
    rules.append(&mut reject);
    rules.append(&mut allow);
    rules.push(FirewallRule::default_action(
        Direction::Egress,
        defaults.egress_action,
        defaults.egress_logged,
    ));
    rules.push(FirewallRule::default_action(
        Direction::Ingress,
        defaults.ingress_action,
        defaults.ingress_logged,
    ));

    Ok(rules)
}
