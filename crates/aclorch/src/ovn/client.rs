//! Control-plane client boundary.
//!
//! The transport that reaches the northbound database is out of scope; the
//! engine only depends on [`OvnClient`]. Every call is atomic: it either
//! succeeds entirely or returns an [`OvnError`] with nothing applied.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::names::{PortGroupName, SwitchName, SwitchPortName};
use crate::acl::RuleAction;

/// Failure reported by the control-plane client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct OvnError {
    pub operation: String,
    pub message: String,
}

impl OvnError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type OvnResult<T> = Result<T, OvnError>;

/// Existence and population of a port group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortGroupState {
    pub exists: bool,
    /// A fully set-up ACL port group always has at least its default rule.
    pub has_rules: bool,
}

/// Verdict of a control-plane ACL rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OvnAction {
    /// Allow and track the connection so replies pass.
    AllowRelated,
    /// Stateless allow.
    Allow,
    Reject,
    Drop,
}

impl OvnAction {
    /// Stateless mapping used by switch baseline and NIC default rules.
    pub const fn stateless(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => OvnAction::Allow,
            RuleAction::Reject => OvnAction::Reject,
            RuleAction::Drop => OvnAction::Drop,
        }
    }
}

impl From<RuleAction> for OvnAction {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => OvnAction::AllowRelated,
            RuleAction::Reject => OvnAction::Reject,
            RuleAction::Drop => OvnAction::Drop,
        }
    }
}

impl fmt::Display for OvnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowRelated => write!(f, "allow-related"),
            Self::Allow => write!(f, "allow"),
            Self::Reject => write!(f, "reject"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Pipeline stage; rules are always evaluated towards the logical port so
/// that `outport` is available to the match.
pub const TO_LPORT: &str = "to-lport";

/// One compiled control-plane ACL rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OvnAclRule {
    pub direction: String,
    pub action: OvnAction,
    pub priority: u16,
    #[serde(rename = "match")]
    pub match_expr: String,
    #[serde(default)]
    pub log: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_name: String,
}

impl OvnAclRule {
    pub fn to_lport(action: OvnAction, priority: u16, match_expr: impl Into<String>) -> Self {
        Self {
            direction: TO_LPORT.to_string(),
            action,
            priority,
            match_expr: match_expr.into(),
            log: false,
            log_name: String::new(),
        }
    }

    /// Attaches a log label. `logged` controls whether matches are logged.
    pub fn with_log(mut self, logged: bool, log_name: impl Into<String>) -> Self {
        self.log = logged;
        self.log_name = log_name.into();
        self
    }

    /// Returns a copy with each placeholder in the match replaced.
    pub fn substituted(&self, substitutions: &MatchSubstitutions) -> Self {
        let mut rule = self.clone();
        for (placeholder, value) in substitutions {
            rule.match_expr = rule.match_expr.replace(placeholder.as_str(), value);
        }
        rule
    }
}

/// Placeholder → replacement applied by the client to every rule's match.
pub type MatchSubstitutions = BTreeMap<String, String>;

/// Port-group, ACL-rule and address-set primitives of the control plane.
#[async_trait]
pub trait OvnClient: Send + Sync {
    async fn port_group_info(&self, name: &PortGroupName) -> OvnResult<PortGroupState>;

    /// Creates a port group owned by `project_id`. When `parent` and `switch`
    /// are given the group is linked to that switch, and `members` are added.
    async fn port_group_add(
        &self,
        project_id: i64,
        name: &PortGroupName,
        parent: Option<&PortGroupName>,
        switch: Option<&SwitchName>,
        members: &[SwitchPortName],
    ) -> OvnResult<()>;

    /// Deletes all named port groups in one transaction.
    async fn port_group_delete(&self, names: &[PortGroupName]) -> OvnResult<()>;

    /// Replaces every ACL rule on the port group.
    async fn port_group_set_acl_rules(
        &self,
        name: &PortGroupName,
        substitutions: &MatchSubstitutions,
        rules: &[OvnAclRule],
    ) -> OvnResult<()>;

    async fn port_group_list_by_project(&self, project_id: i64) -> OvnResult<Vec<PortGroupName>>;

    async fn port_group_member_add(
        &self,
        name: &PortGroupName,
        port: &SwitchPortName,
    ) -> OvnResult<()>;

    async fn port_group_member_remove(
        &self,
        name: &PortGroupName,
        port: &SwitchPortName,
    ) -> OvnResult<()>;

    /// Replaces the rules on the port group that match on `port`.
    async fn port_group_port_set_acl_rules(
        &self,
        name: &PortGroupName,
        port: &SwitchPortName,
        rules: &[OvnAclRule],
    ) -> OvnResult<()>;

    /// Replaces every ACL rule attached directly to a logical switch.
    async fn logical_switch_set_acl_rules(
        &self,
        switch: &SwitchName,
        rules: &[OvnAclRule],
    ) -> OvnResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_action_mapping() {
        assert_eq!(OvnAction::from(RuleAction::Allow), OvnAction::AllowRelated);
        assert_eq!(OvnAction::stateless(RuleAction::Allow), OvnAction::Allow);
        assert_eq!(OvnAction::AllowRelated.to_string(), "allow-related");
        assert_eq!(
            serde_json::to_string(&OvnAction::AllowRelated).unwrap(),
            "\"allow-related\""
        );
    }

    #[test]
    fn test_substitution() {
        let rule = OvnAclRule::to_lport(
            OvnAction::Drop,
            300,
            "(outport == @acl1_net2) && (inport == @internal)",
        );
        let substitutions: MatchSubstitutions =
            [("@internal".to_string(), "@net2".to_string())].into_iter().collect();

        assert_eq!(
            rule.substituted(&substitutions).match_expr,
            "(outport == @acl1_net2) && (inport == @net2)"
        );
        assert_eq!(rule.match_expr, "(outport == @acl1_net2) && (inport == @internal)");
    }
}
