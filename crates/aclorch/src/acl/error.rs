//! Error types for ACL operations.

use thiserror::Error;

use super::subject::SubjectError;
use super::types::{Direction, Protocol};
use crate::ovn::OvnError;
use netacl_orch_common::IdTableError;
use netacl_types::{IpFamily, ParseError};

/// Result type alias for ACL operations.
pub type AclResult<T> = Result<T, AclError>;

/// Broad class of an [`AclError`], used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed rule, subject, name or config. User-correctable.
    Validation,
    /// A rule names an ACL or peer that does not exist.
    Reference,
    /// The control-plane client failed.
    ControlPlane,
    /// The request conflicts with current usage or topology.
    Consistency,
    /// Database, firewall or notifier failure.
    Collaborator,
    Cancelled,
}

/// Problems with a single rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("Invalid {field}: {source}")]
    InvalidSubject {
        field: &'static str,
        #[source]
        source: SubjectError,
    },

    #[error("Invalid {field}: Unknown ACL {name:?}")]
    UnknownAcl { field: &'static str, name: String },

    #[error("Named subjects not allowed in \"{field}\" for \"{direction}\" rules")]
    NamedSubjectNotAllowed {
        field: &'static str,
        direction: Direction,
    },

    #[error("Conflicting IP family types used for Source and Destination")]
    ConflictingFamilies,

    #[error("ICMP {what} cannot be used with non-ICMP protocol")]
    IcmpWithoutIcmpProtocol { what: &'static str },

    #[error("{field} port cannot be used with \"{protocol}\" protocol")]
    PortWithIcmp {
        field: &'static str,
        protocol: Protocol,
    },

    #[error("Cannot use {family} {field} addresses with \"{protocol}\" protocol")]
    FamilyMismatch {
        family: IpFamily,
        field: &'static str,
        protocol: Protocol,
    },

    #[error("Invalid {field} port: {source}")]
    InvalidPort {
        field: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("Invalid ICMP {what}: {source}")]
    InvalidIcmp {
        what: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("{what} cannot be used without specifying protocol")]
    RequiresProtocol { what: &'static str },
}

/// Errors that can occur during ACL operations.
#[derive(Debug, Error)]
pub enum AclError {
    #[error("Invalid ACL name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid config option {key:?}")]
    InvalidConfig { key: String },

    #[error("Invalid {direction} rule {index}: {source}")]
    InvalidRule {
        direction: Direction,
        index: usize,
        #[source]
        source: RuleError,
    },

    #[error("Duplicate of {direction} rule {index}")]
    DuplicateRule { direction: Direction, index: usize },

    #[error("Invalid subject {subject:?}: {source}")]
    InvalidSubject {
        subject: String,
        #[source]
        source: SubjectError,
    },

    #[error("Invalid rule criterion {criterion:?}: {source}")]
    InvalidCriterion {
        criterion: String,
        #[source]
        source: ParseError,
    },

    #[error("Cannot find security ACL ID for {name:?}")]
    UnknownAcl { name: String },

    #[error("Cannot find network ID for peer \"@{peer}\"")]
    UnknownPeer { peer: String },

    #[error("{context}: {source}")]
    ControlPlane {
        context: String,
        #[source]
        source: OvnError,
    },

    #[error("Cannot {operation} an ACL that is in use")]
    InUse { name: String, operation: &'static str },

    #[error("An ACL by that name exists already")]
    AlreadyExists { name: String },

    #[error("Network ACL {name:?} specified multiple times")]
    DuplicateName { name: String },

    #[error("ACL requiring peer \"{peer}\" cannot be applied to network {network:?}")]
    PeerNetworkMismatch { peer: String, network: String },

    #[error("Unsupported network ACL type {network_type:?}")]
    UnsupportedNetworkType { network_type: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Database operation failed: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Failed applying firewall rules to network {network:?}: {message}")]
    Firewall { network: String, message: String },

    #[error("Failed notifying cluster members: {message}")]
    Notify { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl AclError {
    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Wraps a control-plane failure with the step that was running.
    pub fn control_plane(context: impl Into<String>, source: OvnError) -> Self {
        Self::ControlPlane {
            context: context.into(),
            source,
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AclError::InvalidName { .. }
            | AclError::InvalidConfig { .. }
            | AclError::DuplicateRule { .. }
            | AclError::DuplicateName { .. }
            | AclError::InvalidSubject { .. }
            | AclError::InvalidCriterion { .. } => ErrorKind::Validation,
            AclError::InvalidRule { source, .. } => match source {
                RuleError::UnknownAcl { .. } => ErrorKind::Reference,
                _ => ErrorKind::Validation,
            },
            AclError::UnknownAcl { .. } | AclError::UnknownPeer { .. } => ErrorKind::Reference,
            AclError::ControlPlane { .. } => ErrorKind::ControlPlane,
            AclError::InUse { .. }
            | AclError::AlreadyExists { .. }
            | AclError::PeerNetworkMismatch { .. }
            | AclError::UnsupportedNetworkType { .. } => ErrorKind::Consistency,
            AclError::NotFound { .. }
            | AclError::Database { .. }
            | AclError::Firewall { .. }
            | AclError::Notify { .. } => ErrorKind::Collaborator,
            AclError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if reissuing the surrounding operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AclError::ControlPlane { .. } | AclError::Database { .. } | AclError::Notify { .. }
        )
    }
}

impl From<IdTableError> for AclError {
    fn from(err: IdTableError) -> Self {
        match err {
            IdTableError::UnknownName(name) => AclError::UnknownAcl { name },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rule_error_display() {
        let err = AclError::InvalidRule {
            direction: Direction::Ingress,
            index: 2,
            source: RuleError::RequiresProtocol {
                what: "Destination port",
            },
        };
        assert_eq!(
            err.to_string(),
            "Invalid ingress rule 2: Destination port cannot be used without specifying protocol"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_unknown_acl_in_rule_is_reference_error() {
        let err = AclError::InvalidRule {
            direction: Direction::Egress,
            index: 0,
            source: RuleError::UnknownAcl {
                field: "Destination",
                name: "ghost".to_string(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::Reference);
    }

    #[test]
    fn test_control_plane_wraps_context() {
        let err = AclError::control_plane(
            "Failed creating port group \"acl1\"",
            OvnError::new("port_group_add", "connection refused"),
        );
        assert_eq!(
            err.to_string(),
            "Failed creating port group \"acl1\": port_group_add: connection refused"
        );
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::ControlPlane);
    }

    #[test]
    fn test_consistency_errors() {
        let err = AclError::InUse {
            name: "web".to_string(),
            operation: "delete",
        };
        assert_eq!(err.to_string(), "Cannot delete an ACL that is in use");
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(!err.is_retryable());
    }
}
