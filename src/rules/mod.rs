//! Rule model and storage for the binfmt engine.
//!
//! This module handles:
//! - The `Rule` / `RuleKind` data model for extension and magic-number rules
//! - The process-wide `RuleStore` with ordered, first-match-wins semantics

pub mod store;
pub mod types;

pub use store::RuleStore;
pub use types::{Rule, RuleKind, MAX_FIELD_LEN};
