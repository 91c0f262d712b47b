//! Lowering of ACL rules to control-plane match expressions.
//!
//! A compiled match is a conjunction of parenthesised clauses:
//!
//! ```text
//! (<port group filter>) && (<source>) && (<destination>) && (<protocol>) && (<ports/icmp>)
//! ```
//!
//! Each subject or port clause is itself a disjunction over the items of
//! the corresponding comma separated list. Reserved selectors compile to the
//! `@internal`/`@external` placeholders, which are substituted per network
//! when the rule is applied to a per-network port group.

use std::collections::{BTreeMap, BTreeSet};

use netacl_orch_common::IdTable;
use netacl_types::{IcmpValue, IpFamily, PortRange};
use serde::Serialize;

use super::error::{AclError, AclResult};
use super::rule::{Acl, Rule};
use super::subject::{split_list, NetworkPeer, Subject};
use super::types::{Direction, Protocol, RuleAction, RuleState};
use crate::config::AclOrchConfig;
use crate::ovn::names::{acl_port_group, int_switch_address_set_prefix, PortGroupName};
use crate::ovn::{priority, OvnAclRule, OvnAction};

/// Target network identifier of every peer connection in the project.
pub type PeerTargets = BTreeMap<NetworkPeer, i64>;

/// Output of [`compile_rule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub rule: OvnAclRule,
    /// The match uses a reserved selector and must go to per-network groups.
    pub network_relative: bool,
    /// Peers whose address sets the match refers to.
    pub required_peers: Vec<NetworkPeer>,
}

/// Which end of a packet a clause constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Src,
    Dst,
}

impl End {
    const fn field(self) -> &'static str {
        match self {
            End::Src => "src",
            End::Dst => "dst",
        }
    }

    const fn port_selector(self) -> &'static str {
        match self {
            End::Src => "inport",
            End::Dst => "outport",
        }
    }
}

/// Fixed priority band of each action: allow > reject > drop.
pub const fn rule_priority(action: RuleAction) -> u16 {
    match action {
        RuleAction::Allow => priority::PORT_GROUP_ALLOW,
        RuleAction::Reject => priority::PORT_GROUP_REJECT,
        RuleAction::Drop => priority::PORT_GROUP_DROP,
    }
}

/// Restricts a rule to traffic touching members of `port_group`.
///
/// Ingress rules match traffic going to a member, egress rules traffic
/// leaving one; `None` matches both.
pub fn port_group_filter(direction: Option<Direction>, port_group: &PortGroupName) -> String {
    match direction {
        Some(Direction::Ingress) => format!("outport == @{}", port_group),
        Some(Direction::Egress) => format!("inport == @{}", port_group),
        None => format!("inport == @{} || outport == @{}", port_group, port_group),
    }
}

/// Joins clauses into the final match expression.
fn conjunction(parts: &[String]) -> String {
    format!("({})", parts.join(") && ("))
}

/// Label attached to logged rules, `<port group>-<direction>-<index>`,
/// truncated to `max_len` characters.
pub fn log_label(
    port_group: &PortGroupName,
    direction: Direction,
    index: usize,
    max_len: usize,
) -> String {
    let label = format!("{}-{}-{}", port_group, direction, index);
    label.chars().take(max_len).collect()
}

/// Compiles one rule of `direction` for the ACL port group `port_group`.
///
/// The action is mapped to its stateful control-plane form and priority
/// band. Log settings are left to the caller, which knows the rule's
/// position in its list.
pub fn compile_rule(
    direction: Direction,
    rule: &Rule,
    port_group: &PortGroupName,
    names: &IdTable,
    peers: &PeerTargets,
) -> AclResult<CompiledRule> {
    let mut network_relative = false;
    let mut required_peers = Vec::new();
    let mut parts = vec![port_group_filter(Some(direction), port_group)];

    for (end, list) in [(End::Src, &rule.source), (End::Dst, &rule.destination)] {
        if list.is_empty() {
            continue;
        }

        let clause = subject_clause(end, list, names, peers)?;
        network_relative |= clause.network_relative;
        required_peers.extend(clause.required_peers);
        parts.push(clause.expression);
    }

    match rule.protocol {
        Some(protocol) if protocol.has_ports() => {
            parts.push(protocol.to_string());
            for (end, list) in [
                (End::Src, &rule.source_port),
                (End::Dst, &rule.destination_port),
            ] {
                if !list.is_empty() {
                    parts.push(port_clause(protocol, end, list)?);
                }
            }
        }
        Some(protocol) => {
            parts.push(protocol.to_string());
            for (what, value) in [("type", &rule.icmp_type), ("code", &rule.icmp_code)] {
                if !value.is_empty() {
                    let value: IcmpValue = value.parse().map_err(|source| {
                        AclError::InvalidCriterion {
                            criterion: value.clone(),
                            source,
                        }
                    })?;
                    parts.push(format!("{}.{} == {}", protocol, what, value));
                }
            }
        }
        None => {}
    }

    let rule = OvnAclRule::to_lport(
        OvnAction::from(rule.action),
        rule_priority(rule.action),
        conjunction(&parts),
    );

    Ok(CompiledRule {
        rule,
        network_relative,
        required_peers,
    })
}

/// Catch-all rule appended after an ACL's own rules.
pub fn default_rule(port_group: &PortGroupName, action: RuleAction, logged: bool) -> OvnAclRule {
    OvnAclRule::to_lport(
        OvnAction::from(action),
        priority::PORT_GROUP_DEFAULT_ACTION,
        conjunction(&[port_group_filter(None, port_group)]),
    )
    .with_log(logged, port_group.as_str())
}

/// Every active rule of one ACL, split by the port group it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledAcl {
    /// Rules for the ACL port group, default rule last.
    pub port_group_rules: Vec<OvnAclRule>,
    /// Rules for each per-network port group, placeholders not yet
    /// substituted.
    pub network_rules: Vec<OvnAclRule>,
    pub required_peers: BTreeSet<NetworkPeer>,
}

/// Compiles the enabled and logged rules of `acl`, ingress first, and
/// appends the port group's default rule.
pub fn compile_acl(
    acl: &Acl,
    port_group: &PortGroupName,
    names: &IdTable,
    peers: &PeerTargets,
    config: &AclOrchConfig,
) -> AclResult<CompiledAcl> {
    let mut compiled = CompiledAcl::default();

    for direction in Direction::ALL {
        for (index, source) in acl.rules(direction).iter().enumerate() {
            if !source.state.is_active() {
                continue;
            }

            let CompiledRule {
                mut rule,
                network_relative,
                required_peers,
            } = compile_rule(direction, source, port_group, names, peers)?;

            if source.state == RuleState::Logged {
                rule = rule.with_log(
                    true,
                    log_label(port_group, direction, index, config.log_name_max_len),
                );
            }

            compiled.required_peers.extend(required_peers);
            if network_relative {
                compiled.network_rules.push(rule);
            } else {
                compiled.port_group_rules.push(rule);
            }
        }
    }

    compiled.port_group_rules.push(default_rule(
        port_group,
        config.default_port_group_action,
        false,
    ));

    Ok(compiled)
}

struct SubjectClause {
    expression: String,
    network_relative: bool,
    required_peers: Vec<NetworkPeer>,
}

fn subject_clause(
    end: End,
    list: &str,
    names: &IdTable,
    peers: &PeerTargets,
) -> AclResult<SubjectClause> {
    let field = end.field();
    let mut terms = Vec::new();
    let mut network_relative = false;
    let mut required_peers = Vec::new();

    for item in split_list(list) {
        let subject = Subject::parse(item).map_err(|source| AclError::InvalidSubject {
            subject: item.to_string(),
            source,
        })?;

        let term = match subject {
            Subject::Address(addr) => {
                format!("{}.{} == {}", IpFamily::of(&addr), field, addr)
            }
            Subject::Cidr(cidr) => format!("{}.{} == {}", cidr.family(), field, cidr),
            Subject::Range(range) => {
                let family = range.family();
                format!(
                    "({f}.{e} >= {} && {f}.{e} <= {})",
                    range.start(),
                    range.end(),
                    f = family,
                    e = field
                )
            }
            Subject::Reserved(selector) => {
                network_relative = true;
                format!("{} == {}", end.port_selector(), selector.placeholder())
            }
            Subject::Peer(peer) => {
                let network_id = peers.get(&peer).copied().ok_or_else(|| {
                    AclError::UnknownPeer {
                        peer: peer.to_string(),
                    }
                })?;
                let prefix = int_switch_address_set_prefix(network_id);
                required_peers.push(peer);
                format!(
                    "ip6.{e} == ${p}_ip6 || ip4.{e} == ${p}_ip4",
                    e = field,
                    p = prefix
                )
            }
            Subject::Acl(name) => {
                let acl_id = names.require(&name)?;
                format!("{} == @{}", end.port_selector(), acl_port_group(acl_id))
            }
        };
        terms.push(term);
    }

    Ok(SubjectClause {
        expression: terms.join(" || "),
        network_relative,
        required_peers,
    })
}

fn port_clause(protocol: Protocol, end: End, list: &str) -> AclResult<String> {
    let field = format!("{}.{}", protocol, end.field());
    let terms = split_list(list)
        .map(|item| {
            let range: PortRange = item.parse().map_err(|source| AclError::InvalidCriterion {
                criterion: item.to_string(),
                source,
            })?;
            Ok(if range.is_single() {
                format!("{} == {}", field, range.start())
            } else {
                format!(
                    "({f} >= {} && {f} <= {})",
                    range.start(),
                    range.end(),
                    f = field
                )
            })
        })
        .collect::<AclResult<Vec<_>>>()?;

    Ok(terms.join(" || "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::subject::SubjectError;
    use pretty_assertions::assert_eq;

    fn names() -> IdTable {
        [("web", 1), ("db", 2)].into_iter().collect()
    }

    fn compile(direction: Direction, rule: Rule) -> AclResult<CompiledRule> {
        let peers: PeerTargets = [(NetworkPeer::new("lan", "office"), 5)].into_iter().collect();
        compile_rule(direction, &rule.normalized(), &acl_port_group(1), &names(), &peers)
    }

    #[test]
    fn test_compile_web_ingress() {
        let rule = Rule::new(RuleAction::Allow)
            .with_source("10.0.0.0/24")
            .with_protocol(Protocol::Tcp)
            .with_destination_port("80,443");
        let compiled = compile(Direction::Ingress, rule).unwrap();

        assert_eq!(
            compiled.rule.match_expr,
            "(outport == @acl1) && (ip4.src == 10.0.0.0/24) && (tcp) && (tcp.dst == 443 || tcp.dst == 80)"
        );
        assert_eq!(compiled.rule.action, OvnAction::AllowRelated);
        assert_eq!(compiled.rule.priority, priority::PORT_GROUP_ALLOW);
        assert!(!compiled.network_relative);
        assert!(compiled.required_peers.is_empty());
    }

    #[test]
    fn test_compile_egress_ranges() {
        let rule = Rule::new(RuleAction::Drop)
            .with_destination("10.0.0.1-10.0.0.9,2001:db8::1")
            .with_protocol(Protocol::Udp)
            .with_source_port("1000-2000");
        let compiled = compile(Direction::Egress, rule).unwrap();

        assert_eq!(
            compiled.rule.match_expr,
            "(inport == @acl1) && ((ip4.dst >= 10.0.0.1 && ip4.dst <= 10.0.0.9) || ip6.dst == 2001:db8::1) && (udp) && ((udp.src >= 1000 && udp.src <= 2000))"
        );
        assert_eq!(compiled.rule.priority, priority::PORT_GROUP_DROP);
    }

    #[test]
    fn test_compile_icmp() {
        let rule = Rule::new(RuleAction::Reject)
            .with_protocol(Protocol::Icmp4)
            .with_icmp("8", "0");
        let compiled = compile(Direction::Ingress, rule).unwrap();

        assert_eq!(
            compiled.rule.match_expr,
            "(outport == @acl1) && (icmp4) && (icmp4.type == 8) && (icmp4.code == 0)"
        );
        assert_eq!(compiled.rule.action, OvnAction::Reject);
    }

    #[test]
    fn test_compile_named_subjects() {
        let rule = Rule::new(RuleAction::Allow).with_source("db,@internal");
        let compiled = compile(Direction::Ingress, rule).unwrap();
        assert_eq!(
            compiled.rule.match_expr,
            "(outport == @acl1) && (inport == @internal || inport == @acl2)"
        );
        assert!(compiled.network_relative);

        let rule = Rule::new(RuleAction::Allow).with_destination("@external");
        let compiled = compile(Direction::Egress, rule).unwrap();
        assert_eq!(
            compiled.rule.match_expr,
            "(inport == @acl1) && (outport == @external)"
        );
    }

    #[test]
    fn test_compile_peer() {
        let rule = Rule::new(RuleAction::Allow).with_source("@lan/office");
        let compiled = compile(Direction::Ingress, rule).unwrap();
        assert_eq!(
            compiled.rule.match_expr,
            "(outport == @acl1) && (ip6.src == $net5_routes_ip6 || ip4.src == $net5_routes_ip4)"
        );
        assert_eq!(
            compiled.required_peers,
            vec![NetworkPeer::new("lan", "office")]
        );

        let rule = Rule::new(RuleAction::Allow).with_source("@lan/branch");
        assert!(matches!(
            compile(Direction::Ingress, rule),
            Err(AclError::UnknownPeer { .. })
        ));
    }

    #[test]
    fn test_compile_errors() {
        let rule = Rule::new(RuleAction::Allow).with_source("ghost");
        assert!(matches!(
            compile(Direction::Ingress, rule),
            Err(AclError::UnknownAcl { name }) if name == "ghost"
        ));

        let rule = Rule::new(RuleAction::Allow).with_source("10.0.0.9-10.0.0.1");
        assert!(matches!(
            compile(Direction::Ingress, rule),
            Err(AclError::InvalidSubject {
                source: SubjectError::Address(_),
                ..
            })
        ));
    }

    #[test]
    fn test_compile_deterministic() {
        let rule = Rule::new(RuleAction::Allow)
            .with_source("web,10.0.0.0/8,@internal")
            .with_protocol(Protocol::Tcp)
            .with_destination_port("22,80-90");
        let first = compile(Direction::Ingress, rule.clone()).unwrap();
        let second = compile(Direction::Ingress, rule).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_default_rule_and_labels() {
        let rule = default_rule(&acl_port_group(1), RuleAction::Drop, false);
        assert_eq!(rule.match_expr, "(inport == @acl1 || outport == @acl1)");
        assert_eq!(rule.priority, priority::PORT_GROUP_DEFAULT_ACTION);
        assert_eq!(rule.log_name, "acl1");

        assert_eq!(
            log_label(&acl_port_group(1), Direction::Egress, 3, 63),
            "acl1-egress-3"
        );
        assert_eq!(log_label(&acl_port_group(1), Direction::Egress, 3, 6), "acl1-e");
    }

    #[test]
    fn test_compile_acl_splits_network_rules() {
        let acl = Acl::new(1, "default", "web")
            .with_ingress(Rule::new(RuleAction::Allow).with_source("@internal"))
            .with_ingress(
                Rule::new(RuleAction::Drop)
                    .with_source("10.0.0.1")
                    .with_state(RuleState::Logged),
            )
            .with_egress(Rule::new(RuleAction::Reject).with_state(RuleState::Disabled));

        let compiled = compile_acl(
            &acl,
            &acl_port_group(1),
            &names(),
            &PeerTargets::new(),
            &AclOrchConfig::default(),
        )
        .unwrap();

        assert_eq!(compiled.network_rules.len(), 1);
        assert_eq!(
            compiled.network_rules[0].match_expr,
            "(outport == @acl1) && (inport == @internal)"
        );
        assert_eq!(compiled.port_group_rules.len(), 2);
        assert!(compiled.port_group_rules[0].log);
        assert_eq!(compiled.port_group_rules[0].log_name, "acl1-ingress-1");
        assert_eq!(
            compiled.port_group_rules[1].priority,
            priority::PORT_GROUP_DEFAULT_ACTION
        );
        assert!(compiled.required_peers.is_empty());
    }

    #[test]
    fn test_priority_bands_ordered() {
        assert!(rule_priority(RuleAction::Allow) > rule_priority(RuleAction::Reject));
        assert!(rule_priority(RuleAction::Reject) > rule_priority(RuleAction::Drop));
        assert!(rule_priority(RuleAction::Drop) > priority::SWITCH_ALLOW);
    }
}
