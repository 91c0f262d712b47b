//! Integration test infrastructure for the network ACL engine
//!
//! Provides:
//! - In-memory control plane with call recording and failure injection
//! - In-memory database
//! - Recording firewall and cluster notifier
//! - Test fixtures for common ACL and network patterns
//! - Control-plane verification helpers

pub mod fixtures;
mod mock_db;
mod mock_ovn;
mod recording;
mod verification;

pub use fixtures::*;
pub use mock_db::MemoryDatabase;
pub use mock_ovn::{MockOvnClient, MockPortGroup, OvnCall};
pub use recording::{RecordingFirewall, RecordingNotifier};
pub use verification::*;
