//! Common orchestration helpers for the network ACL engine.
//!
//! - [`IdTable`]: request-scoped ACL name→identifier table that never
//!   auto-creates entries
//! - [`Revert`]: ordered list of typed undo descriptors, unwound newest first
//!
//! # Example
//!
//! ```
//! use netacl_orch_common::{IdTable, Revert};
//!
//! let ids: IdTable = [("web", 1)].into_iter().collect();
//! assert_eq!(ids.get("web"), Some(1));
//!
//! let mut revert = Revert::new();
//! revert.add("acl1");
//! revert.add("acl1_net7");
//! assert_eq!(revert.into_unwind_order(), vec!["acl1_net7", "acl1"]);
//! ```

mod id_table;
mod revert;

pub use id_table::{IdTable, IdTableError};
pub use revert::Revert;
