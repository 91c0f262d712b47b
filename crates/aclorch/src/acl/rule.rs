//! ACL and rule model.
//!
//! An [`Acl`] is a named, project-scoped pair of ordered ingress/egress
//! rule lists. Rules keep their list-valued fields (subjects, ports) as the
//! comma separated text users write; [`Rule::normalize`] puts that text in
//! canonical form before duplicate detection, compilation or persistence.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::subject::split_list;
use super::types::{Direction, Protocol, RuleAction, RuleState};

/// One ingress or egress rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub state: RuleState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Comma separated subjects.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Comma separated subjects.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Comma separated ports or port ranges (tcp/udp only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_port: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination_port: String,
    /// ICMP type (icmp4/icmp6 only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icmp_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icmp_code: String,
}

fn normalize_list(list: &str) -> String {
    split_list(list).sorted().dedup().join(",")
}

impl Rule {
    /// Creates an enabled rule with no criteria.
    pub fn new(action: RuleAction) -> Self {
        Self {
            action,
            state: RuleState::Enabled,
            description: String::new(),
            source: String::new(),
            destination: String::new(),
            protocol: None,
            source_port: String::new(),
            destination_port: String::new(),
            icmp_type: String::new(),
            icmp_code: String::new(),
        }
    }

    pub fn with_state(mut self, state: RuleState) -> Self {
        self.state = state;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_source_port(mut self, ports: impl Into<String>) -> Self {
        self.source_port = ports.into();
        self
    }

    pub fn with_destination_port(mut self, ports: impl Into<String>) -> Self {
        self.destination_port = ports.into();
        self
    }

    pub fn with_icmp(mut self, icmp_type: impl Into<String>, icmp_code: impl Into<String>) -> Self {
        self.icmp_type = icmp_type.into();
        self.icmp_code = icmp_code.into();
        self
    }

    /// Puts the rule in canonical form.
    ///
    /// Subject and port lists are trimmed, sorted and deduplicated; scalar
    /// text fields are trimmed. Idempotent.
    pub fn normalize(&mut self) {
        self.description = self.description.trim().to_string();
        self.source = normalize_list(&self.source);
        self.destination = normalize_list(&self.destination);
        self.source_port = normalize_list(&self.source_port);
        self.destination_port = normalize_list(&self.destination_port);
        self.icmp_type = self.icmp_type.trim().to_string();
        self.icmp_code = self.icmp_code.trim().to_string();
    }

    /// Returns the normalized copy of the rule.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// The side of the rule on which named subjects are legal for `direction`:
    /// Source on ingress, Destination on egress.
    pub fn named_side(&self, direction: Direction) -> &str {
        match direction {
            Direction::Ingress => &self.source,
            Direction::Egress => &self.destination,
        }
    }
}

/// Writable part of an ACL, as submitted by create and update requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPut {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub ingress: Vec<Rule>,
    #[serde(default)]
    pub egress: Vec<Rule>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl AclPut {
    pub fn rules(&self, direction: Direction) -> &[Rule] {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }

    /// Normalizes every rule in both lists.
    pub fn normalize(&mut self) {
        self.ingress.iter_mut().for_each(Rule::normalize);
        self.egress.iter_mut().for_each(Rule::normalize);
    }
}

/// A stored ACL.
///
/// `id` is allocated by the database and never changes; rename only
/// touches `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub id: i64,
    #[serde(default = "default_project")]
    pub project: String,
    pub name: String,
    #[serde(flatten)]
    pub writable: AclPut,
}

pub fn default_project() -> String {
    "default".to_string()
}

impl Acl {
    pub fn new(id: i64, project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            project: project.into(),
            name: name.into(),
            writable: AclPut::default(),
        }
    }

    pub fn with_ingress(mut self, rule: Rule) -> Self {
        self.writable.ingress.push(rule);
        self
    }

    pub fn with_egress(mut self, rule: Rule) -> Self {
        self.writable.egress.push(rule);
        self
    }

    pub fn rules(&self, direction: Direction) -> &[Rule] {
        self.writable.rules(direction)
    }

    /// Iterates the subjects on the named-legal side of every rule:
    /// ingress Source and egress Destination.
    pub fn named_side_subjects(&self) -> impl Iterator<Item = &str> {
        Direction::ALL.into_iter().flat_map(move |direction| {
            self.rules(direction)
                .iter()
                .flat_map(move |rule| split_list(rule.named_side(direction)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn messy_rule() -> Rule {
        Rule::new(RuleAction::Allow)
            .with_source(" web ,10.0.0.0/24,web,, db")
            .with_protocol(Protocol::Tcp)
            .with_destination_port("443, 80,80")
            .with_icmp(" ", "")
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let rule = messy_rule().normalized();
        assert_eq!(rule.source, "10.0.0.0/24,db,web");
        assert_eq!(rule.destination_port, "443,80");
        assert_eq!(rule.icmp_type, "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = messy_rule().normalized();
        let twice = once.clone().normalized();
        assert_eq!(once, twice);
    }

    fn canonical(list: &str) -> String {
        split_list(list).collect::<Vec<_>>().join(",")
    }

    #[test]
    fn test_normalize_idempotent_across_rule_shapes() {
        use crate::acl::validate::validate_rule;
        use netacl_orch_common::IdTable;

        let names: IdTable = [("web", 1), ("db", 2), ("cache", 3)].into_iter().collect();
        let described = Rule {
            description: "  web tier  ".to_string(),
            ..Rule::new(RuleAction::Reject).with_state(RuleState::Disabled)
        };

        let cases = [
            ("empty", Direction::Ingress, Rule::new(RuleAction::Allow)),
            (
                "separators only",
                Direction::Egress,
                Rule::new(RuleAction::Drop).with_source(" , ,").with_destination(","),
            ),
            (
                "duplicate unsorted subjects",
                Direction::Ingress,
                Rule::new(RuleAction::Allow).with_source("web,10.0.0.0/24,web,db,10.0.0.0/24"),
            ),
            (
                "padded subjects",
                Direction::Egress,
                Rule::new(RuleAction::Allow)
                    .with_destination("  cache , 192.0.2.1-192.0.2.9 ,@external "),
            ),
            (
                "duplicate unsorted ports",
                Direction::Ingress,
                Rule::new(RuleAction::Allow)
                    .with_protocol(Protocol::Tcp)
                    .with_source_port("1024-2048, 22,22")
                    .with_destination_port(" 80,443 ,80"),
            ),
            (
                "padded udp port",
                Direction::Egress,
                Rule::new(RuleAction::Drop)
                    .with_protocol(Protocol::Udp)
                    .with_destination_port(" 53 "),
            ),
            (
                "padded icmp4",
                Direction::Ingress,
                Rule::new(RuleAction::Allow)
                    .with_protocol(Protocol::Icmp4)
                    .with_icmp(" 8 ", " 0"),
            ),
            (
                "icmp6 type only",
                Direction::Egress,
                Rule::new(RuleAction::Allow)
                    .with_protocol(Protocol::Icmp6)
                    .with_icmp("128", ""),
            ),
            (
                "icmp4 with ip6 subjects",
                Direction::Ingress,
                Rule::new(RuleAction::Drop)
                    .with_protocol(Protocol::Icmp4)
                    .with_source("2001:db8::/32, 2001:db8::/32"),
            ),
            (
                "ports without protocol",
                Direction::Ingress,
                Rule::new(RuleAction::Allow).with_destination_port("80,80"),
            ),
            (
                "unknown named subject",
                Direction::Ingress,
                Rule::new(RuleAction::Allow).with_source("ghost, web"),
            ),
            ("padded description", Direction::Egress, described),
        ];

        for (label, direction, rule) in cases {
            let once = rule.normalized();
            let twice = once.clone().normalized();
            assert_eq!(once, twice, "{}", label);

            for list in [
                &once.source,
                &once.destination,
                &once.source_port,
                &once.destination_port,
            ] {
                assert_eq!(*list, canonical(list), "{}", label);
            }

            assert_eq!(
                validate_rule(direction, &once, &names),
                validate_rule(direction, &twice, &names),
                "{}",
                label
            );
        }
    }

    #[test]
    fn test_port_order_normalizes_equal() {
        let a = Rule::new(RuleAction::Drop)
            .with_protocol(Protocol::Udp)
            .with_destination_port("53,123")
            .normalized();
        let b = Rule::new(RuleAction::Drop)
            .with_protocol(Protocol::Udp)
            .with_destination_port("123,53")
            .normalized();
        assert_eq!(a, b);
    }

    #[test]
    fn test_named_side_subjects() {
        let acl = Acl::new(1, "default", "db")
            .with_ingress(Rule::new(RuleAction::Allow).with_source("web,10.0.0.1"))
            .with_ingress(Rule::new(RuleAction::Allow).with_destination("ignored"))
            .with_egress(Rule::new(RuleAction::Allow).with_destination("cache"));

        let subjects: Vec<&str> = acl.named_side_subjects().collect();
        assert_eq!(subjects, vec!["web", "10.0.0.1", "cache"]);
    }

    #[test]
    fn test_deserialize_defaults() {
        let acl: Acl = serde_json::from_str(
            r#"{"id": 3, "name": "web", "ingress": [{"action": "allow", "protocol": "tcp", "destination_port": "80"}]}"#,
        )
        .unwrap();
        assert_eq!(acl.project, "default");
        assert_eq!(acl.rules(Direction::Ingress)[0].state, RuleState::Enabled);
        assert!(acl.rules(Direction::Egress).is_empty());
    }
}
