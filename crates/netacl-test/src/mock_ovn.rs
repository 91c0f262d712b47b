//! In-memory control plane.
//!
//! Records every call, counts mutations and can fail or cancel at a chosen
//! mutation so rollback and cancellation paths can be driven step by step.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use netacl_aclorch::ovn::{
    MatchSubstitutions, OvnAclRule, OvnClient, OvnError, OvnResult, PortGroupName,
    PortGroupState, SwitchName, SwitchPortName,
};
use tokio_util::sync::CancellationToken;

/// One port group as stored by [`MockOvnClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockPortGroup {
    pub project_id: i64,
    pub parent: Option<PortGroupName>,
    pub switch: Option<SwitchName>,
    pub members: BTreeSet<SwitchPortName>,
    /// Rules with substitutions already applied.
    pub rules: Vec<OvnAclRule>,
    /// Rules set per port through `port_group_port_set_acl_rules`.
    pub port_rules: BTreeMap<SwitchPortName, Vec<OvnAclRule>>,
}

/// A recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OvnCall {
    Info(PortGroupName),
    Add(PortGroupName),
    Delete(Vec<PortGroupName>),
    SetRules(PortGroupName),
    List(i64),
    MemberAdd(PortGroupName, SwitchPortName),
    MemberRemove(PortGroupName, SwitchPortName),
    PortSetRules(PortGroupName, SwitchPortName),
    SwitchSetRules(SwitchName),
}

impl OvnCall {
    /// Whether the call changes control-plane state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OvnCall::Info(_) | OvnCall::List(_))
    }
}

#[derive(Default)]
struct State {
    port_groups: BTreeMap<PortGroupName, MockPortGroup>,
    switch_rules: BTreeMap<SwitchName, Vec<OvnAclRule>>,
    calls: Vec<OvnCall>,
    mutations: usize,
    fail_at: Option<usize>,
    cancel_at: Option<(usize, CancellationToken)>,
}

#[derive(Default)]
pub struct MockOvnClient {
    state: Mutex<State>,
}

impl MockOvnClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fails the mutation with zero-based index `index`, counted from now.
    pub fn fail_mutation(&self, index: usize) {
        let mut state = self.lock();
        state.fail_at = Some(state.mutations + index);
    }

    /// Fires `token` once `count` more mutations have completed.
    pub fn cancel_after_mutations(&self, count: usize, token: CancellationToken) {
        let mut state = self.lock();
        state.cancel_at = Some((state.mutations + count, token));
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    pub fn calls(&self) -> Vec<OvnCall> {
        self.lock().calls.clone()
    }

    /// Mutating calls since creation or the last [`reset_calls`](Self::reset_calls).
    pub fn mutations(&self) -> Vec<OvnCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn port_group(&self, name: &str) -> Option<MockPortGroup> {
        self.lock().port_groups.get(&PortGroupName::from(name)).cloned()
    }

    pub fn port_group_names(&self) -> Vec<String> {
        self.lock()
            .port_groups
            .keys()
            .map(|name| name.to_string())
            .collect()
    }

    /// Rules of a port group, empty if it does not exist.
    pub fn rules(&self, name: &str) -> Vec<OvnAclRule> {
        self.port_group(name).map(|pg| pg.rules).unwrap_or_default()
    }

    pub fn switch_rules(&self, name: &str) -> Vec<OvnAclRule> {
        self.lock()
            .switch_rules
            .get(&SwitchName::from(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Adds a port group directly, bypassing call recording.
    pub fn seed_port_group(&self, project_id: i64, name: &str, rules: Vec<OvnAclRule>) {
        self.lock().port_groups.insert(
            PortGroupName::from(name),
            MockPortGroup {
                project_id,
                rules,
                ..MockPortGroup::default()
            },
        );
    }

    /// Records `call` and, for mutations, applies failure injection and
    /// cancellation. `apply` runs only if the call is not failed.
    fn record<T>(
        &self,
        call: OvnCall,
        operation: &str,
        apply: impl FnOnce(&mut State) -> OvnResult<T>,
    ) -> OvnResult<T> {
        let mut state = self.lock();
        let mutation = call.is_mutation();
        state.calls.push(call);

        if !mutation {
            return apply(&mut *state);
        }

        let index = state.mutations;
        state.mutations += 1;

        if state.fail_at == Some(index) {
            return Err(OvnError::new(operation, "injected failure"));
        }

        let result = apply(&mut *state);

        if let Some((at, token)) = &state.cancel_at {
            if state.mutations >= *at {
                token.cancel();
            }
        }

        result
    }
}

fn missing(operation: &str, name: &PortGroupName) -> OvnError {
    OvnError::new(operation, format!("port group {} not found", name))
}

#[async_trait]
impl OvnClient for MockOvnClient {
    async fn port_group_info(&self, name: &PortGroupName) -> OvnResult<PortGroupState> {
        self.record(OvnCall::Info(name.clone()), "port_group_info", |state| {
            Ok(match state.port_groups.get(name) {
                Some(pg) => PortGroupState {
                    exists: true,
                    has_rules: !pg.rules.is_empty(),
                },
                None => PortGroupState::default(),
            })
        })
    }

    async fn port_group_add(
        &self,
        project_id: i64,
        name: &PortGroupName,
        parent: Option<&PortGroupName>,
        switch: Option<&SwitchName>,
        members: &[SwitchPortName],
    ) -> OvnResult<()> {
        self.record(OvnCall::Add(name.clone()), "port_group_add", |state| {
            if state.port_groups.contains_key(name) {
                return Err(OvnError::new(
                    "port_group_add",
                    format!("port group {} already exists", name),
                ));
            }
            state.port_groups.insert(
                name.clone(),
                MockPortGroup {
                    project_id,
                    parent: parent.cloned(),
                    switch: switch.cloned(),
                    members: members.iter().cloned().collect(),
                    ..MockPortGroup::default()
                },
            );
            Ok(())
        })
    }

    async fn port_group_delete(&self, names: &[PortGroupName]) -> OvnResult<()> {
        self.record(OvnCall::Delete(names.to_vec()), "port_group_delete", |state| {
            if let Some(name) = names.iter().find(|n| !state.port_groups.contains_key(*n)) {
                return Err(missing("port_group_delete", name));
            }
            for name in names {
                state.port_groups.remove(name);
            }
            Ok(())
        })
    }

    async fn port_group_set_acl_rules(
        &self,
        name: &PortGroupName,
        substitutions: &MatchSubstitutions,
        rules: &[OvnAclRule],
    ) -> OvnResult<()> {
        self.record(OvnCall::SetRules(name.clone()), "port_group_set_acl_rules", |state| {
            let pg = state
                .port_groups
                .get_mut(name)
                .ok_or_else(|| missing("port_group_set_acl_rules", name))?;
            pg.rules = rules.iter().map(|r| r.substituted(substitutions)).collect();
            Ok(())
        })
    }

    async fn port_group_list_by_project(&self, project_id: i64) -> OvnResult<Vec<PortGroupName>> {
        self.record(OvnCall::List(project_id), "port_group_list_by_project", |state| {
            Ok(state
                .port_groups
                .iter()
                .filter(|(_, pg)| pg.project_id == project_id)
                .map(|(name, _)| name.clone())
                .collect())
        })
    }

    async fn port_group_member_add(
        &self,
        name: &PortGroupName,
        port: &SwitchPortName,
    ) -> OvnResult<()> {
        let call = OvnCall::MemberAdd(name.clone(), port.clone());
        self.record(call, "port_group_member_add", |state| {
            let pg = state
                .port_groups
                .get_mut(name)
                .ok_or_else(|| missing("port_group_member_add", name))?;
            pg.members.insert(port.clone());
            Ok(())
        })
    }

    async fn port_group_member_remove(
        &self,
        name: &PortGroupName,
        port: &SwitchPortName,
    ) -> OvnResult<()> {
        let call = OvnCall::MemberRemove(name.clone(), port.clone());
        self.record(call, "port_group_member_remove", |state| {
            let pg = state
                .port_groups
                .get_mut(name)
                .ok_or_else(|| missing("port_group_member_remove", name))?;
            pg.members.remove(port);
            Ok(())
        })
    }

    async fn port_group_port_set_acl_rules(
        &self,
        name: &PortGroupName,
        port: &SwitchPortName,
        rules: &[OvnAclRule],
    ) -> OvnResult<()> {
        let call = OvnCall::PortSetRules(name.clone(), port.clone());
        self.record(call, "port_group_port_set_acl_rules", |state| {
            let pg = state
                .port_groups
                .get_mut(name)
                .ok_or_else(|| missing("port_group_port_set_acl_rules", name))?;
            pg.port_rules.insert(port.clone(), rules.to_vec());
            Ok(())
        })
    }

    async fn logical_switch_set_acl_rules(
        &self,
        switch: &SwitchName,
        rules: &[OvnAclRule],
    ) -> OvnResult<()> {
        self.record(
            OvnCall::SwitchSetRules(switch.clone()),
            "logical_switch_set_acl_rules",
            |state| {
                state.switch_rules.insert(switch.clone(), rules.to_vec());
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_failure_injection_counts_mutations_only() {
        let ovn = MockOvnClient::new();
        ovn.fail_mutation(1);

        let a = PortGroupName::from("acl1");
        let b = PortGroupName::from("acl2");
        ovn.port_group_info(&a).await.unwrap();
        ovn.port_group_add(1, &a, None, None, &[]).await.unwrap();
        let err = ovn.port_group_add(1, &b, None, None, &[]).await.unwrap_err();

        assert_eq!(err, OvnError::new("port_group_add", "injected failure"));
        assert_eq!(ovn.port_group_names(), vec!["acl1"]);
        assert_eq!(ovn.mutation_count(), 2);
    }
}
