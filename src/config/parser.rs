use crate::config::escape::decode_escapes;
use crate::error::{BinfmtError, Result};
use crate::rules::{Rule, RuleStore, MAX_FIELD_LEN};
use std::path::Path;
use tracing::{info, warn};

/// What to do with a malformed or unregisterable rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
	/// Abort the whole load at the first bad line, reporting it.
	/// Rules registered from earlier lines stay registered; the load is
	/// deliberately not transactional.
	#[default]
	FailFast,

	/// Skip bad lines with a warning and keep going.
	SkipInvalid,
}

/// Parse one rule line: `:name:type:offset:pattern:mask:interpreter:`.
///
/// Six colon-delimited fields between a leading and a trailing colon,
/// with nothing after the trailing colon. `pattern`, `mask` and
/// `interpreter` are escape-decoded after extraction.
pub fn parse_rule_line(line: &str) -> Result<Rule> {
	parse_fields(line).map_err(|reason| BinfmtError::InvalidConfig {
		path: std::path::PathBuf::new(),
		line_no: 0,
		line: line.to_string(),
		reason,
	})
}

fn parse_fields(line: &str) -> std::result::Result<Rule, String> {
	let parts: Vec<&str> = line.split(':').collect();
	// ":a:b:c:d:e:f:" splits into "" + six fields + "".
	if parts.len() != 8 || !parts[0].is_empty() {
		return Err("expected `:name:type:offset:pattern:mask:interpreter:`".to_string());
	}
	if !parts[7].is_empty() {
		return Err(format!("trailing characters after final colon: `{}`", parts[7]));
	}
	let [name, kind, offset, pattern, mask, interpreter] = [parts[1], parts[2], parts[3], parts[4], parts[5], parts[6]];

	for (label, field) in [("name", name), ("pattern", pattern), ("mask", mask), ("interpreter", interpreter)] {
		if field.len() > MAX_FIELD_LEN {
			return Err(format!(
				"{label} is {} bytes, exceeding the {MAX_FIELD_LEN}-byte bound",
				field.len()
			));
		}
	}

	let offset: u64 = offset
		.parse()
		.map_err(|_| format!("offset `{offset}` is not a non-negative integer"))?;

	let interpreter = String::from_utf8(decode_escapes(interpreter))
		.map_err(|_| "interpreter is not valid UTF-8".to_string())?;
	if interpreter.is_empty() {
		return Err("interpreter must not be empty".to_string());
	}

	let rule = match kind {
		"E" => Rule::extension(name, decode_escapes(pattern), interpreter),
		"M" => Rule::magic(name, offset, decode_escapes(pattern), decode_escapes(mask), interpreter),
		other => return Err(format!("unknown rule type `{other}` (expected `E` or `M`)")),
	};
	rule.map_err(reason_of)
}

/// Strip an error down to its reason text so the loader can re-wrap it
/// with the real file/line context.
fn reason_of(err: BinfmtError) -> String {
	match err {
		BinfmtError::InvalidConfig { reason, .. } => reason,
		other => other.to_string(),
	}
}

/// Load rules from a string, registering them into `store` in order.
///
/// Returns the number of rules registered. Empty and whitespace-only
/// lines are ignored. `path` is used for error reporting only.
pub fn load_str(store: &RuleStore, content: &str, path: &Path, policy: LoadPolicy) -> Result<usize> {
	let mut registered = 0;

	for (index, raw) in content.lines().enumerate() {
		if raw.trim().is_empty() {
			continue;
		}
		let line_no = index + 1;

		let outcome = parse_fields(raw).map_err(|reason| BinfmtError::InvalidConfig {
			path: path.to_path_buf(),
			line_no,
			line: raw.to_string(),
			reason,
		});

		match (outcome, policy) {
			(Ok(rule), _) => {
				match store.register(rule) {
					Ok(()) => registered += 1,
					Err(err) if policy == LoadPolicy::SkipInvalid => {
						warn!(%err, line_no, "skipping unregisterable rule line");
					}
					Err(err) => return Err(err),
				}
			}
			(Err(err), LoadPolicy::FailFast) => return Err(err),
			(Err(err), LoadPolicy::SkipInvalid) => {
				warn!(%err, "skipping invalid rule line");
			}
		}
	}

	Ok(registered)
}

/// Load a rules file from disk, registering its rules into `store`.
pub fn load_path(store: &RuleStore, path: &Path, policy: LoadPolicy) -> Result<usize> {
	let content = std::fs::read_to_string(path).map_err(|source| BinfmtError::ConfigRead {
		path: path.to_path_buf(),
		source,
	})?;

	let registered = load_str(store, &content, path, policy)?;
	info!(path = %path.display(), registered, "loaded binfmt rules");
	Ok(registered)
}

impl RuleStore {
	/// Load a rules file with the default fail-fast policy.
	pub fn load_from_file(&self, path: &Path) -> Result<usize> {
		load_path(self, path, LoadPolicy::default())
	}
}
