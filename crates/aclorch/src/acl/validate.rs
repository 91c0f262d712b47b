//! Structural validation of ACL names, config and rules.

use once_cell::sync::Lazy;
use regex::Regex;

use netacl_orch_common::IdTable;
use netacl_types::{IcmpValue, IpFamily, PortRange};

use super::error::{AclError, AclResult, RuleError};
use super::rule::{AclPut, Rule};
use super::subject::{split_list, Subject};
use super::types::Direction;

/// A host label: letters, digits and hyphens, starting with a letter and
/// not ending with a hyphen.
static ACL_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("Invalid regex pattern")
});

/// Prefix of the only config keys users may set.
pub const USER_CONFIG_PREFIX: &str = "user.";

/// Checks that `name` can be used as an ACL name.
pub fn validate_name(name: &str) -> AclResult<()> {
    if name.is_empty() {
        return Err(AclError::invalid_name(name, "Name is required"));
    }

    // Leading characters that would make the name parse as a selector.
    if name.starts_with(['@', '%', '#']) {
        return Err(AclError::invalid_name(
            name,
            "Name cannot start with \"@\", \"%\" or \"#\"",
        ));
    }

    if !ACL_NAME_RE.is_match(name) {
        return Err(AclError::invalid_name(name, "Name must be a valid host name"));
    }

    Ok(())
}

/// Rejects every config key outside the user namespace.
pub fn validate_config<'a>(keys: impl IntoIterator<Item = &'a String>) -> AclResult<()> {
    for key in keys {
        if !key.starts_with(USER_CONFIG_PREFIX) {
            return Err(AclError::InvalidConfig { key: key.clone() });
        }
    }
    Ok(())
}

/// Normalizes `put` in place and validates it against the project's ACL
/// names.
///
/// Rule indices in errors are zero-based positions in the ingress or egress
/// list.
pub fn validate_put(put: &mut AclPut, names: &IdTable) -> AclResult<()> {
    validate_config(put.config.keys())?;
    put.normalize();

    for direction in Direction::ALL {
        let rules = put.rules(direction);
        for (index, rule) in rules.iter().enumerate() {
            validate_rule(direction, rule, names).map_err(|source| AclError::InvalidRule {
                direction,
                index,
                source,
            })?;

            if let Some(first) = rules[..index].iter().position(|other| other == rule) {
                return Err(AclError::DuplicateRule {
                    direction,
                    index: first,
                });
            }
        }
    }

    Ok(())
}

/// What one side of a rule contains.
#[derive(Debug, Default, Clone, Copy)]
struct SideFamilies {
    v4: bool,
    v6: bool,
    named: bool,
}

impl SideFamilies {
    fn has(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => self.v4,
            IpFamily::V6 => self.v6,
        }
    }
}

fn validate_subjects(
    field: &'static str,
    list: &str,
    named_allowed: bool,
    direction: Direction,
    names: &IdTable,
) -> Result<SideFamilies, RuleError> {
    let mut side = SideFamilies::default();

    for item in split_list(list) {
        let subject =
            Subject::parse(item).map_err(|source| RuleError::InvalidSubject { field, source })?;

        match subject.family() {
            Some(IpFamily::V4) => side.v4 = true,
            Some(IpFamily::V6) => side.v6 = true,
            None => {
                if !named_allowed {
                    return Err(RuleError::NamedSubjectNotAllowed { field, direction });
                }
                if let Some(name) = subject.acl_name() {
                    if !names.contains(name) {
                        return Err(RuleError::UnknownAcl {
                            field,
                            name: name.to_string(),
                        });
                    }
                }
                side.named = true;
            }
        }
    }

    Ok(side)
}

fn validate_ports(field: &'static str, list: &str) -> Result<(), RuleError> {
    for item in split_list(list) {
        item.parse::<PortRange>()
            .map_err(|source| RuleError::InvalidPort { field, source })?;
    }
    Ok(())
}

fn validate_icmp(what: &'static str, value: &str) -> Result<(), RuleError> {
    if !value.is_empty() {
        value
            .parse::<IcmpValue>()
            .map_err(|source| RuleError::InvalidIcmp { what, source })?;
    }
    Ok(())
}

/// Validates one normalized rule.
pub fn validate_rule(direction: Direction, rule: &Rule, names: &IdTable) -> Result<(), RuleError> {
    let source = validate_subjects(
        "Source",
        &rule.source,
        direction == Direction::Ingress,
        direction,
        names,
    )?;
    let destination = validate_subjects(
        "Destination",
        &rule.destination,
        direction == Direction::Egress,
        direction,
        names,
    )?;

    // A family on one side needs the same family, or a named subject, on the other.
    if !rule.source.is_empty() && !rule.destination.is_empty() {
        for family in [IpFamily::V4, IpFamily::V6] {
            if (source.has(family) && !destination.has(family) && !destination.named)
                || (destination.has(family) && !source.has(family) && !source.named)
            {
                return Err(RuleError::ConflictingFamilies);
            }
        }
    }

    match rule.protocol {
        Some(protocol) if protocol.has_ports() => {
            if !rule.icmp_type.is_empty() {
                return Err(RuleError::IcmpWithoutIcmpProtocol { what: "type" });
            }
            if !rule.icmp_code.is_empty() {
                return Err(RuleError::IcmpWithoutIcmpProtocol { what: "code" });
            }
            validate_ports("Source", &rule.source_port)?;
            validate_ports("Destination", &rule.destination_port)?;
        }
        Some(protocol) => {
            if !rule.source_port.is_empty() {
                return Err(RuleError::PortWithIcmp {
                    field: "Source",
                    protocol,
                });
            }
            if !rule.destination_port.is_empty() {
                return Err(RuleError::PortWithIcmp {
                    field: "Destination",
                    protocol,
                });
            }

            for (field, side) in [("Source", source), ("Destination", destination)] {
                let wrong_family = [IpFamily::V4, IpFamily::V6]
                    .into_iter()
                    .find(|family| side.has(*family) && protocol.icmp_family() != Some(*family));
                if let Some(family) = wrong_family {
                    return Err(RuleError::FamilyMismatch {
                        family,
                        field,
                        protocol,
                    });
                }
            }

            validate_icmp("type", &rule.icmp_type)?;
            validate_icmp("code", &rule.icmp_code)?;
        }
        None => {
            for (what, value) in [
                ("ICMP type", &rule.icmp_type),
                ("ICMP code", &rule.icmp_code),
                ("Source port", &rule.source_port),
                ("Destination port", &rule.destination_port),
            ] {
                if !value.is_empty() {
                    return Err(RuleError::RequiresProtocol { what });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::types::{Protocol, RuleAction};
    use pretty_assertions::assert_eq;

    fn names() -> IdTable {
        [("web", 1), ("db", 2)].into_iter().collect()
    }

    fn check(direction: Direction, rule: Rule) -> Result<(), RuleError> {
        validate_rule(direction, &rule.normalized(), &names())
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("web").is_ok());
        assert!(validate_name("web-frontend-2").is_ok());
        assert!(validate_name(&"a".repeat(63)).is_ok());

        for bad in ["", "@web", "#web", "%web", "2web", "-web", "web-", "web_1", "a.b"] {
            assert!(validate_name(bad).is_err(), "{:?} should be rejected", bad);
        }
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_config_keys() {
        let mut put = AclPut::default();
        put.config.insert("user.owner".to_string(), "ops".to_string());
        assert!(validate_put(&mut put, &names()).is_ok());

        put.config.insert("security.foo".to_string(), "1".to_string());
        assert!(matches!(
            validate_put(&mut put, &names()),
            Err(AclError::InvalidConfig { key }) if key == "security.foo"
        ));
    }

    #[test]
    fn test_named_subject_side() {
        assert!(check(Direction::Ingress, Rule::new(RuleAction::Allow).with_source("web")).is_ok());
        assert!(check(
            Direction::Egress,
            Rule::new(RuleAction::Allow).with_destination("@external")
        )
        .is_ok());
        assert_eq!(
            check(Direction::Ingress, Rule::new(RuleAction::Allow).with_destination("web")),
            Err(RuleError::NamedSubjectNotAllowed {
                field: "Destination",
                direction: Direction::Ingress
            })
        );
        assert_eq!(
            check(Direction::Egress, Rule::new(RuleAction::Allow).with_source("@lan/office")),
            Err(RuleError::NamedSubjectNotAllowed {
                field: "Source",
                direction: Direction::Egress
            })
        );
        assert_eq!(
            check(Direction::Ingress, Rule::new(RuleAction::Allow).with_source("ghost")),
            Err(RuleError::UnknownAcl {
                field: "Source",
                name: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_family_conflicts() {
        let mixed = Rule::new(RuleAction::Allow)
            .with_source("10.0.0.1")
            .with_destination("2001:db8::1");
        assert_eq!(check(Direction::Ingress, mixed), Err(RuleError::ConflictingFamilies));

        // A named source side covers both families.
        let named = Rule::new(RuleAction::Allow)
            .with_source("web")
            .with_destination("2001:db8::1");
        assert!(check(Direction::Ingress, named).is_ok());

        let single_side = Rule::new(RuleAction::Allow).with_source("10.0.0.1,2001:db8::1");
        assert!(check(Direction::Ingress, single_side).is_ok());
    }

    #[test]
    fn test_protocol_fields() {
        let rule = Rule::new(RuleAction::Allow).with_destination_port("80");
        assert_eq!(
            check(Direction::Ingress, rule),
            Err(RuleError::RequiresProtocol {
                what: "Destination port"
            })
        );

        let rule = Rule::new(RuleAction::Allow)
            .with_protocol(Protocol::Tcp)
            .with_icmp("8", "");
        assert_eq!(
            check(Direction::Ingress, rule),
            Err(RuleError::IcmpWithoutIcmpProtocol { what: "type" })
        );

        let rule = Rule::new(RuleAction::Allow)
            .with_protocol(Protocol::Icmp4)
            .with_source_port("80");
        assert!(matches!(
            check(Direction::Ingress, rule),
            Err(RuleError::PortWithIcmp { field: "Source", .. })
        ));

        let rule = Rule::new(RuleAction::Allow)
            .with_protocol(Protocol::Icmp6)
            .with_source("10.0.0.1");
        assert!(matches!(
            check(Direction::Ingress, rule),
            Err(RuleError::FamilyMismatch {
                family: IpFamily::V4,
                ..
            })
        ));

        let rule = Rule::new(RuleAction::Allow)
            .with_protocol(Protocol::Icmp4)
            .with_icmp("300", "");
        assert!(matches!(
            check(Direction::Ingress, rule),
            Err(RuleError::InvalidIcmp { what: "type", .. })
        ));

        let rule = Rule::new(RuleAction::Allow)
            .with_protocol(Protocol::Udp)
            .with_destination_port("53,70000");
        assert!(matches!(
            check(Direction::Ingress, rule),
            Err(RuleError::InvalidPort {
                field: "Destination",
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_after_normalize() {
        let mut put = AclPut {
            ingress: vec![
                Rule::new(RuleAction::Allow)
                    .with_protocol(Protocol::Tcp)
                    .with_destination_port("80,443"),
                Rule::new(RuleAction::Drop),
                Rule::new(RuleAction::Allow)
                    .with_protocol(Protocol::Tcp)
                    .with_destination_port("443, 80"),
            ],
            ..AclPut::default()
        };

        let err = validate_put(&mut put, &names()).unwrap_err();
        assert!(matches!(
            err,
            AclError::DuplicateRule {
                direction: Direction::Ingress,
                index: 0
            }
        ));
        assert_eq!(err.to_string(), "Duplicate of ingress rule 0");
    }

    #[test]
    fn test_invalid_rule_reports_index() {
        let mut put = AclPut {
            egress: vec![
                Rule::new(RuleAction::Allow),
                Rule::new(RuleAction::Allow).with_source_port("22"),
            ],
            ..AclPut::default()
        };

        assert_eq!(
            validate_put(&mut put, &names()).unwrap_err().to_string(),
            "Invalid egress rule 1: Source port cannot be used without specifying protocol"
        );
    }
}
