use crate::error::{BinfmtError, Result};

/// Upper bound, in bytes, for any decoded rule field.
///
/// Matches the platform path-length bound: an interpreter string longer
/// than this could never be written back as a path, and pattern/mask
/// fields have no business being longer either. Exceeding it during
/// parsing is a configuration error, never a silent truncation.
pub const MAX_FIELD_LEN: usize = libc::PATH_MAX as usize;

/// How a rule decides whether a candidate executable is "its" format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
	/// Match on the trailing bytes of the sandbox-visible path.
	Extension {
		/// The literal suffix, compared byte-for-byte and case-sensitively.
		suffix: Vec<u8>,
	},

	/// Match on file contents at a fixed offset, under a bit mask.
	Magic {
		/// Byte offset into the candidate file where the probe starts.
		offset: u64,

		/// Expected bytes. Masked exactly once, at construction; the
		/// matcher must never mask it again.
		pattern: Vec<u8>,

		/// A zero bit wildcards the corresponding bit of the probed byte.
		mask: Vec<u8>,

		/// Effective comparison length: `1 + index of the highest
		/// non-zero mask byte`, or 0 for an all-zero mask. A zero here
		/// means the rule can never match and is skipped.
		cmp_len: usize,
	},
}

/// A single binfmt rule: how to recognize a format, and which interpreter
/// to run it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
	/// Identifier used as the key for unregistration. Not required unique;
	/// removal takes the first entry with a given name.
	pub name: String,

	/// The matching behavior.
	pub kind: RuleKind,

	/// Interpreter path, used verbatim as a single argv token.
	/// Never word-split.
	pub interpreter: String,
}

impl Rule {
	/// Build an extension rule.
	pub fn extension(name: impl Into<String>, suffix: Vec<u8>, interpreter: impl Into<String>) -> Result<Self> {
		let name = name.into();
		let interpreter = interpreter.into();
		check_field_len("pattern", suffix.len())?;
		check_field_len("interpreter", interpreter.len())?;
		Ok(Rule {
			name,
			kind: RuleKind::Extension { suffix },
			interpreter,
		})
	}

	/// Build a magic-number rule.
	///
	/// `pattern` and `mask` must be the same length. The pattern is masked
	/// here, once, so the matcher only ever masks the probed file bytes.
	pub fn magic(
		name: impl Into<String>,
		offset: u64,
		mut pattern: Vec<u8>,
		mask: Vec<u8>,
		interpreter: impl Into<String>,
	) -> Result<Self> {
		let name = name.into();
		let interpreter = interpreter.into();
		check_field_len("pattern", pattern.len())?;
		check_field_len("mask", mask.len())?;
		check_field_len("interpreter", interpreter.len())?;
		if pattern.len() != mask.len() {
			return Err(invalid_rule(format!(
				"pattern is {} bytes but mask is {} bytes",
				pattern.len(),
				mask.len()
			)));
		}

		let cmp_len = effective_len(&mask);
		for (p, m) in pattern.iter_mut().zip(mask.iter()) {
			*p &= *m;
		}

		Ok(Rule {
			name,
			kind: RuleKind::Magic {
				offset,
				pattern,
				mask,
				cmp_len,
			},
			interpreter,
		})
	}
}

/// Effective comparison length of a mask: one past the highest-index
/// non-zero byte, or 0 if every byte is zero.
pub(crate) fn effective_len(mask: &[u8]) -> usize {
	mask.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1)
}

fn check_field_len(field: &'static str, len: usize) -> Result<()> {
	if len > MAX_FIELD_LEN {
		return Err(invalid_rule(format!(
			"{field} is {len} bytes, exceeding the {MAX_FIELD_LEN}-byte bound"
		)));
	}
	Ok(())
}

/// Rule-level validation failure, before any file/line context is known.
/// The config loader re-wraps this with the offending line.
fn invalid_rule(reason: String) -> BinfmtError {
	BinfmtError::InvalidConfig {
		path: std::path::PathBuf::new(),
		line_no: 0,
		line: String::new(),
		reason,
	}
}
