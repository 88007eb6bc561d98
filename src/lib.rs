//! sandbox-binfmt - binfmt_misc-style format dispatch for a ptrace sandbox.
//!
//! When a traced process issues an exec-family syscall, this crate decides
//! whether the target file should instead run through a user-configured
//! interpreter, and if so rewrites the call's path and argument vector so
//! the kernel executes `[interpreter, original_path, original_args...]`.
//!
//! This library provides:
//! - Rule storage with ordered, first-match-wins evaluation
//! - Rule-file parsing (`:name:type:offset:pattern:mask:interpreter:`)
//!   with backslash/hex escape decoding
//! - Extension and magic-number matching against live file contents
//! - The argv-rewriting protocol, driven through tracer-side collaborator
//!   traits
//!
//! # Example
//!
//! ```no_run
//! use sandbox_binfmt::rules::RuleStore;
//! use std::path::Path;
//!
//! let store = RuleStore::new();
//! store.load_from_file(Path::new("/etc/sandbox/binfmt.rules")).unwrap();
//!
//! // At an exec trace-stop, with a tracer-side ExecBridge in hand:
//! // let outcome = store.check(&mut bridge, &mut host_path, &mut user_path)?;
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod rewrite;
pub mod rules;
pub mod tracee;

pub use error::{BinfmtError, Result};
pub use rewrite::Outcome;
pub use rules::{Rule, RuleKind, RuleStore};
