//! Rule-file loading and parsing for the binfmt engine.
//!
//! This module handles:
//! - Backslash/hex escape decoding of rule fields
//! - The `:name:type:offset:pattern:mask:interpreter:` line grammar
//! - Loading rule files into a [`crate::rules::RuleStore`]

pub mod escape;
pub mod parser;

pub use escape::decode_escapes;
pub use parser::{LoadPolicy, load_path, load_str, parse_rule_line};
