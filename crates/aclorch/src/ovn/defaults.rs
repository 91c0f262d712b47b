//! Rules that do not come from ACLs: the per-network switch baseline and the
//! per-NIC default actions.

use std::collections::BTreeMap;
use std::net::IpAddr;

use netacl_types::{IpCidr, IpFamily};
use tracing::debug;

use super::client::{OvnAclRule, OvnAction, OvnClient};
use super::names::{PortGroupName, SwitchName, SwitchPortName};
use super::priority;
use crate::acl::{AclError, AclResult, RuleAction};

const TCP_RST: u16 = 0x004;
const TCP_ACK: u16 = 0x010;

fn switch_allow(match_expr: impl Into<String>) -> OvnAclRule {
    OvnAclRule::to_lport(OvnAction::Allow, priority::SWITCH_ALLOW, match_expr)
}

fn icmp_version(family: IpFamily) -> u8 {
    match family {
        IpFamily::V4 => 4,
        IpFamily::V6 => 6,
    }
}

/// Baseline rules letting workloads reach network services on the internal
/// switch regardless of the ACLs applied to their ports.
pub fn network_baseline_rules(
    router_port: &SwitchPortName,
    router_ips: &[IpCidr],
    dns_ips: &[IpAddr],
) -> Vec<OvnAclRule> {
    let mut rules = vec![
        switch_allow("(arp || nd)"),
        switch_allow(format!("inport == \"{}\" && nd_ra", router_port)),
        switch_allow(format!("outport == \"{}\" && nd_rs", router_port)),
        // MLD reports.
        switch_allow("icmp6 && icmp6.type == 143 && ip.ttl == 1 && ip6.dst == ff02::16"),
        switch_allow("igmp && ip.ttl == 1 && ip4.mcast"),
        switch_allow(format!(
            "outport == \"{}\" && ((ip4 && udp.dst == 67) || (ip6 && udp.dst == 547))",
            router_port
        )),
        // Replies generated by reject rules must never be rejected themselves,
        // otherwise the control plane loops on its own packets.
        switch_allow("icmp6 && icmp6.type == {1,2,3,4} && ip.ttl == 255"),
        switch_allow("icmp4 && icmp4.type == {3,11,12} && ip.ttl == 255"),
        switch_allow(format!("tcp && tcp.flags == {:#05x}", TCP_RST | TCP_ACK)),
    ];

    for cidr in router_ips {
        let version = icmp_version(cidr.family());
        let (ping, reply) = match cidr.family() {
            IpFamily::V4 => (8, 0),
            IpFamily::V6 => (128, 129),
        };
        let address = cidr.address();

        rules.push(switch_allow(format!(
            "outport == \"{}\" && icmp{v}.type == {} && ip{v}.dst == {}",
            router_port,
            ping,
            address,
            v = version
        )));
        rules.push(switch_allow(format!(
            "inport == \"{}\" && icmp{v}.type == {} && ip{v}.src == {}",
            router_port,
            reply,
            address,
            v = version
        )));
    }

    for dns in dns_ips {
        rules.push(switch_allow(format!(
            "outport == \"{}\" && ip{}.dst == {} && (udp.dst == 53 || tcp.dst == 53)",
            router_port,
            icmp_version(IpFamily::of(dns)),
            dns
        )));
    }

    rules
}

/// Replaces the rules attached directly to a network's internal switch.
pub async fn apply_network_baseline_rules(
    ovn: &dyn OvnClient,
    switch: &SwitchName,
    router_port: &SwitchPortName,
    router_ips: &[IpCidr],
    dns_ips: &[IpAddr],
) -> AclResult<()> {
    let rules = network_baseline_rules(router_port, router_ips, dns_ips);
    debug!("Applying {} baseline rules to switch {}", rules.len(), switch);

    ovn.logical_switch_set_acl_rules(switch, &rules)
        .await
        .map_err(|e| {
            AclError::control_plane(
                format!("Failed applying baseline ACL rules to logical switch {:?}", switch.as_str()),
                e,
            )
        })
}

/// Default actions for traffic to and from one NIC that no ACL rule matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicDefaults {
    pub ingress_action: RuleAction,
    pub ingress_logged: bool,
    pub egress_action: RuleAction,
    pub egress_logged: bool,
}

impl Default for NicDefaults {
    fn default() -> Self {
        Self {
            ingress_action: RuleAction::Reject,
            ingress_logged: false,
            egress_action: RuleAction::Reject,
            egress_logged: false,
        }
    }
}

impl NicDefaults {
    /// Reads `security.acls.default.{ingress,egress}.{action,logged}` from a
    /// device or network config. Unset actions fall back to `fallback`.
    pub fn from_config(
        config: &BTreeMap<String, String>,
        fallback: RuleAction,
    ) -> AclResult<Self> {
        let mut defaults = Self {
            ingress_action: fallback,
            egress_action: fallback,
            ..Self::default()
        };

        for (direction, action, logged) in [
            ("ingress", &mut defaults.ingress_action, &mut defaults.ingress_logged),
            ("egress", &mut defaults.egress_action, &mut defaults.egress_logged),
        ] {
            let key = format!("security.acls.default.{}.action", direction);
            if let Some(value) = config.get(&key) {
                *action = value.parse().map_err(|_| AclError::InvalidConfig { key })?;
            }

            let key = format!("security.acls.default.{}.logged", direction);
            if let Some(value) = config.get(&key) {
                *logged = value
                    .parse::<bool>()
                    .map_err(|_| AclError::InvalidConfig { key })?;
            }
        }

        Ok(defaults)
    }
}

/// Egress and ingress default rules for one NIC. Log labels are
/// `<log_prefix>-egress` and `<log_prefix>-ingress`.
pub fn nic_default_rules(
    log_prefix: &str,
    nic_port: &SwitchPortName,
    defaults: &NicDefaults,
) -> Vec<OvnAclRule> {
    vec![
        OvnAclRule::to_lport(
            OvnAction::stateless(defaults.egress_action),
            priority::NIC_DEFAULT_EGRESS,
            format!("inport == \"{}\"", nic_port),
        )
        .with_log(defaults.egress_logged, format!("{}-egress", log_prefix)),
        OvnAclRule::to_lport(
            OvnAction::stateless(defaults.ingress_action),
            priority::NIC_DEFAULT_INGRESS,
            format!("outport == \"{}\"", nic_port),
        )
        .with_log(defaults.ingress_logged, format!("{}-ingress", log_prefix)),
    ]
}

/// Replaces the default rules of one NIC inside its network's port group.
pub async fn apply_instance_nic_default_rules(
    ovn: &dyn OvnClient,
    switch_port_group: &PortGroupName,
    log_prefix: &str,
    nic_port: &SwitchPortName,
    defaults: &NicDefaults,
) -> AclResult<()> {
    let rules = nic_default_rules(log_prefix, nic_port, defaults);

    ovn.port_group_port_set_acl_rules(switch_port_group, nic_port, &rules)
        .await
        .map_err(|e| {
            AclError::control_plane(
                format!(
                    "Failed applying instance NIC default ACL rules for port {:?}",
                    nic_port.as_str()
                ),
                e,
            )
        })
}

/// Pending port-group membership additions, applied in one batch.
pub type PortGroupChangeSet = BTreeMap<PortGroupName, Vec<SwitchPortName>>;

/// Schedules `port` to be added to each of `port_groups`.
pub fn schedule_nic_port_groups(
    change_set: &mut PortGroupChangeSet,
    port: &SwitchPortName,
    port_groups: &[PortGroupName],
) {
    for port_group in port_groups {
        change_set
            .entry(port_group.clone())
            .or_default()
            .push(port.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ovn::names::{acl_port_group, int_switch_router_port};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_baseline_rules() {
        let router_port = int_switch_router_port(2);
        let rules = network_baseline_rules(
            &router_port,
            &["10.1.0.1/24".parse().unwrap(), "fd00::1/64".parse().unwrap()],
            &["10.1.0.1".parse().unwrap()],
        );

        // 9 fixed, 2 per router IP, 1 per DNS server.
        assert_eq!(rules.len(), 9 + 4 + 1);
        assert!(rules.iter().all(|r| r.priority == priority::SWITCH_ALLOW));
        assert!(rules.iter().all(|r| r.action == OvnAction::Allow));
        assert_eq!(rules[8].match_expr, "tcp && tcp.flags == 0x014");
        assert_eq!(
            rules[9].match_expr,
            "outport == \"net2-ls-int-lsp-router\" && icmp4.type == 8 && ip4.dst == 10.1.0.1"
        );
        assert_eq!(
            rules[12].match_expr,
            "inport == \"net2-ls-int-lsp-router\" && icmp6.type == 129 && ip6.src == fd00::1"
        );
        assert_eq!(
            rules[13].match_expr,
            "outport == \"net2-ls-int-lsp-router\" && ip4.dst == 10.1.0.1 && (udp.dst == 53 || tcp.dst == 53)"
        );
    }

    #[test]
    fn test_nic_default_rules() {
        let defaults = NicDefaults {
            egress_action: RuleAction::Allow,
            egress_logged: true,
            ..NicDefaults::default()
        };
        let rules = nic_default_rules("c1-eth0", &SwitchPortName::from("c1-eth0-port"), &defaults);

        assert_eq!(rules[0].match_expr, "inport == \"c1-eth0-port\"");
        assert_eq!(rules[0].action, OvnAction::Allow);
        assert_eq!(rules[0].priority, priority::NIC_DEFAULT_EGRESS);
        assert!(rules[0].log);
        assert_eq!(rules[0].log_name, "c1-eth0-egress");
        assert_eq!(rules[1].match_expr, "outport == \"c1-eth0-port\"");
        assert_eq!(rules[1].action, OvnAction::Reject);
        assert!(!rules[1].log);
    }

    #[test]
    fn test_nic_defaults_from_config() {
        let config: BTreeMap<String, String> = [
            ("security.acls.default.ingress.action", "drop"),
            ("security.acls.default.ingress.logged", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let defaults = NicDefaults::from_config(&config, RuleAction::Reject).unwrap();
        assert_eq!(defaults.ingress_action, RuleAction::Drop);
        assert!(defaults.ingress_logged);
        assert_eq!(defaults.egress_action, RuleAction::Reject);

        let bad: BTreeMap<String, String> = [(
            "security.acls.default.egress.action".to_string(),
            "accept".to_string(),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            NicDefaults::from_config(&bad, RuleAction::Drop),
            Err(AclError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_schedule_nic_port_groups() {
        let mut change_set = PortGroupChangeSet::new();
        let groups = [acl_port_group(1), acl_port_group(2)];
        schedule_nic_port_groups(&mut change_set, &SwitchPortName::from("p1"), &groups);
        schedule_nic_port_groups(&mut change_set, &SwitchPortName::from("p2"), &groups[..1]);

        assert_eq!(
            change_set[&acl_port_group(1)],
            vec![SwitchPortName::from("p1"), SwitchPortName::from("p2")]
        );
        assert_eq!(change_set[&acl_port_group(2)], vec![SwitchPortName::from("p1")]);
    }
}
