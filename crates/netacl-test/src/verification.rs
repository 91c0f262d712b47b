//! Verification helpers for control-plane state
//!
//! Provides assertion helpers over [`MockOvnClient`] that report what was
//! expected and what was found.

use thiserror::Error;

use crate::mock_ovn::MockOvnClient;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected port group '{name}' not found")]
    PortGroupNotFound { name: String },

    #[error("Port group '{name}' should not exist")]
    UnexpectedPortGroup { name: String },

    #[error("Expected port groups {expected:?}, found {actual:?}")]
    PortGroupsMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("No rule on '{name}' matches '{expected}'; rules: {actual:?}")]
    MatchNotFound {
        name: String,
        expected: String,
        actual: Vec<String>,
    },

    #[error("Expected {expected} rules on '{name}', found {actual}")]
    RuleCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Control-plane state verifier
pub struct OvnVerifier<'a> {
    ovn: &'a MockOvnClient,
}

impl<'a> OvnVerifier<'a> {
    pub fn new(ovn: &'a MockOvnClient) -> Self {
        Self { ovn }
    }

    pub fn assert_port_group_exists(&self, name: &str) -> VerifyResult<()> {
        if self.ovn.port_group(name).is_none() {
            return Err(VerificationError::PortGroupNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn assert_port_group_absent(&self, name: &str) -> VerifyResult<()> {
        if self.ovn.port_group(name).is_some() {
            return Err(VerificationError::UnexpectedPortGroup {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Verify the exact set of port groups, in any order.
    pub fn assert_port_groups(&self, expected: &[&str]) -> VerifyResult<()> {
        let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        expected.sort();
        let actual = self.ovn.port_group_names();
        if actual != expected {
            return Err(VerificationError::PortGroupsMismatch { expected, actual });
        }
        Ok(())
    }

    pub fn assert_rule_count(&self, name: &str, expected: usize) -> VerifyResult<()> {
        self.assert_port_group_exists(name)?;
        let actual = self.ovn.rules(name).len();
        if actual != expected {
            return Err(VerificationError::RuleCountMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that some rule on the port group has exactly this match.
    pub fn assert_has_match(&self, name: &str, expected: &str) -> VerifyResult<()> {
        self.assert_port_group_exists(name)?;
        let actual: Vec<String> = self
            .ovn
            .rules(name)
            .into_iter()
            .map(|rule| rule.match_expr)
            .collect();
        if !actual.iter().any(|m| m == expected) {
            return Err(VerificationError::MatchNotFound {
                name: name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }
}
