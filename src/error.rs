use std::path::PathBuf;

/// Library-level structured errors for the binfmt engine.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The `binfmtctl` binary wraps these with `anyhow` for rich context chains.
///
/// A magic probe finding fewer bytes than the rule needs is deliberately
/// absent from this taxonomy: a short read skips the rule, it never fails
/// the evaluation.
#[derive(Debug, thiserror::Error)]
pub enum BinfmtError {
	#[error("Out of memory while registering rule")]
	OutOfMemory {
		#[source]
		source: std::collections::TryReserveError,
	},

	#[error("No registered rule named: {name}")]
	RuleNotFound { name: String },

	#[error("{path}:{line_no}: invalid rule line `{line}`: {reason}", path = .path.display())]
	InvalidConfig {
		path: PathBuf,
		line_no: usize,
		line: String,
		reason: String,
	},

	#[error("Failed to read rules file: {path}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to probe candidate file: {path}")]
	Probe {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Tracee operation failed: {op}")]
	Tracee {
		op: &'static str,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to resolve home directory")]
	HomeDirectoryNotFound,
}

/// Result type alias using BinfmtError.
pub type Result<T> = std::result::Result<T, BinfmtError>;
