//! Garbage collection of unused ACL port groups.

use netacl_aclorch::acl::{AclNetworks, NicOwner, UsageIgnore};
use netacl_aclorch::ovn::PortGroupName;
use netacl_aclorch::AclDatabase;
use netacl_test::{acl_fixtures, network_fixtures, OvnCall, OvnVerifier, Scenario, PROJECT};
use pretty_assertions::assert_eq;

async fn ensure(scenario: &Scenario, networks: &[&str], acls: &[&str]) {
    let orch = scenario.orch();
    let names = scenario.db.get_acl_name_to_id_map(PROJECT).await.unwrap();
    let mut ovn_networks = AclNetworks::new();
    for name in networks {
        let network = scenario.db.get_network(PROJECT, name).await.unwrap();
        ovn_networks.insert(network.name.clone(), network);
    }
    let acls: Vec<String> = acls.iter().map(|s| s.to_string()).collect();
    orch.reconciler()
        .unwrap()
        .ensure_acls(PROJECT, &names, &ovn_networks, &acls, false)
        .await
        .unwrap();
}

async fn collect(
    scenario: &Scenario,
    ignore: Option<&UsageIgnore>,
    keep: &[&str],
) -> Vec<PortGroupName> {
    let orch = scenario.orch();
    let keep: Vec<String> = keep.iter().map(|s| s.to_string()).collect();
    orch.reconciler()
        .unwrap()
        .delete_if_unused(PROJECT, ignore, &keep)
        .await
        .unwrap()
}

fn names(groups: &[&str]) -> Vec<PortGroupName> {
    groups.iter().map(|g| PortGroupName::from(*g)).collect()
}

#[tokio::test]
async fn test_referenced_acl_survives_while_referrer_is_used() {
    let s = Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_acl("db", acl_fixtures::allow_from("web"))
        .with_network(network_fixtures::ovn(7, "ovn0", "db"));
    ensure(&s, &["ovn0"], &["db"]).await;

    let deleted = collect(&s, None, &[]).await;

    assert_eq!(deleted, Vec::<PortGroupName>::new());
    OvnVerifier::new(&s.ovn)
        .assert_port_groups(&["acl1", "acl2", "acl2_net7"])
        .unwrap();

    s.db.set_network_config(PROJECT, "ovn0", "security.acls", None);
    let deleted = collect(&s, None, &[]).await;

    assert_eq!(deleted, names(&["acl1", "acl2", "acl2_net7"]));
    assert_eq!(s.ovn.port_group_names(), Vec::<String>::new());
}

#[tokio::test]
async fn test_kept_acl_is_not_deleted() {
    let s = Scenario::new().with_acl("web", acl_fixtures::web());
    ensure(&s, &[], &["web"]).await;

    assert_eq!(collect(&s, None, &["web"]).await, Vec::<PortGroupName>::new());
    OvnVerifier::new(&s.ovn).assert_port_group_exists("acl1").unwrap();

    assert_eq!(collect(&s, None, &[]).await, names(&["acl1"]));
}

#[tokio::test]
async fn test_kept_acl_retains_acls_it_references() {
    let s = Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_acl("db", acl_fixtures::allow_from("web"));
    ensure(&s, &[], &["db"]).await;

    assert_eq!(collect(&s, None, &["db"]).await, Vec::<PortGroupName>::new());
    OvnVerifier::new(&s.ovn)
        .assert_port_groups(&["acl1", "acl2"])
        .unwrap();
}

#[tokio::test]
async fn test_bridge_usage_does_not_retain_port_groups() {
    let s = Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_network(network_fixtures::bridge(3, "br0", "web"));
    s.ovn.seed_port_group(1, "acl1", Vec::new());

    assert_eq!(collect(&s, None, &[]).await, names(&["acl1"]));
}

#[tokio::test]
async fn test_ignored_nic_usage() {
    let s = Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_network(network_fixtures::ovn(7, "ovn0", ""))
        .with_instance(network_fixtures::instance(
            "c1",
            "eth0",
            network_fixtures::nic("ovn0", "web"),
        ));
    ensure(&s, &["ovn0"], &["web"]).await;

    assert_eq!(collect(&s, None, &[]).await, Vec::<PortGroupName>::new());

    let ignore = UsageIgnore::Nic {
        owner: NicOwner::Instance {
            project: PROJECT.to_string(),
            name: "c1".to_string(),
        },
        device: "eth0".to_string(),
    };
    assert_eq!(
        collect(&s, Some(&ignore), &[]).await,
        names(&["acl1", "acl1_net7"])
    );
}

#[tokio::test]
async fn test_network_group_of_other_network_is_collected() {
    let s = Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_network(network_fixtures::ovn(7, "ovn0", "web"))
        .with_network(network_fixtures::ovn(8, "ovn1", ""));
    ensure(&s, &["ovn0", "ovn1"], &["web"]).await;

    // ovn1 no longer lists the ACL, so only its network group goes.
    assert_eq!(collect(&s, None, &[]).await, names(&["acl1_net8"]));
    OvnVerifier::new(&s.ovn)
        .assert_port_groups(&["acl1", "acl1_net7"])
        .unwrap();
}

#[tokio::test]
async fn test_only_acl_port_groups_of_project_are_considered() {
    let s = Scenario::new();
    s.db.add_project("other", 2);
    s.ovn.seed_port_group(1, "net7", Vec::new());
    s.ovn.seed_port_group(1, "acl9", Vec::new());
    s.ovn.seed_port_group(1, "acl9_netx", Vec::new());
    s.ovn.seed_port_group(1, "acl09", Vec::new());
    s.ovn.seed_port_group(1, "acl9_net07", Vec::new());
    s.ovn.seed_port_group(2, "acl5", Vec::new());

    assert_eq!(collect(&s, None, &[]).await, names(&["acl9"]));
    OvnVerifier::new(&s.ovn)
        .assert_port_groups(&["acl09", "acl5", "acl9_net07", "acl9_netx", "net7"])
        .unwrap();
}

#[tokio::test]
async fn test_nothing_to_delete_makes_no_delete_call() {
    let s = Scenario::new()
        .with_acl("web", acl_fixtures::web())
        .with_network(network_fixtures::ovn(7, "ovn0", "web"));
    ensure(&s, &["ovn0"], &["web"]).await;
    s.ovn.reset_calls();

    collect(&s, None, &[]).await;

    assert_eq!(s.ovn.calls(), vec![OvnCall::List(1)]);
}
