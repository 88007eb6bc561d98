//! First-match-wins rule evaluation against a candidate executable.
//!
//! Extension rules look only at the sandbox-visible path; magic rules
//! probe the host file's bytes. Reading the candidate races against the
//! tracee's own later access to the same path (classic TOCTOU); that is
//! an accepted risk of the design, not something this module defends
//! against.

use crate::error::{BinfmtError, Result};
use crate::rules::{Rule, RuleKind};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Find the first rule matching the candidate, or `None`.
///
/// `host_path` is the real filesystem location (probed for magic rules);
/// `user_path` is the path as the tracee sees it (compared for extension
/// rules). Unreadable candidate files are an error; a candidate merely
/// too short for a rule's probe just skips that rule.
pub fn find_match(rules: &[Arc<Rule>], host_path: &Path, user_path: &str) -> Result<Option<Arc<Rule>>> {
	for rule in rules {
		if matches_rule(rule, host_path, user_path)? {
			debug!(name = %rule.name, interpreter = %rule.interpreter, "binfmt rule matched");
			return Ok(Some(rule.clone()));
		}
	}
	Ok(None)
}

fn matches_rule(rule: &Rule, host_path: &Path, user_path: &str) -> Result<bool> {
	match &rule.kind {
		RuleKind::Extension { suffix } => Ok(user_path.as_bytes().ends_with(suffix)),
		RuleKind::Magic {
			offset,
			pattern,
			mask,
			cmp_len,
		} => {
			// All-zero mask: the rule can never match. Skipped, not an error.
			if *cmp_len == 0 {
				return Ok(false);
			}
			let Some(probed) = probe(host_path, *offset, *cmp_len)? else {
				trace!(name = %rule.name, "candidate too short for magic probe, skipping rule");
				return Ok(false);
			};

			// The stored pattern was masked at construction; masking the
			// probed bytes here keeps the comparison masked exactly once
			// on each side.
			let matched = probed
				.iter()
				.zip(mask)
				.map(|(byte, m)| byte & m)
				.eq(pattern[..*cmp_len].iter().copied());
			Ok(matched)
		}
	}
}

/// Read exactly `len` bytes at `offset` from the candidate file.
///
/// Returns `Ok(None)` when the file ends before `offset + len` (the rule
/// is skipped); any other I/O failure is a real error.
fn probe(host_path: &Path, offset: u64, len: usize) -> Result<Option<Vec<u8>>> {
	let io_err = |source| BinfmtError::Probe {
		path: host_path.to_path_buf(),
		source,
	};

	let mut file = File::open(host_path).map_err(io_err)?;
	file.seek(SeekFrom::Start(offset)).map_err(io_err)?;

	let mut bytes = vec![0u8; len];
	match file.read_exact(&mut bytes) {
		Ok(()) => Ok(Some(bytes)),
		Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
		Err(err) => Err(io_err(err)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use std::path::PathBuf;

	fn ext(name: &str, suffix: &str, interpreter: &str) -> Arc<Rule> {
		Arc::new(Rule::extension(name, suffix.as_bytes().to_vec(), interpreter).unwrap())
	}

	fn magic(name: &str, offset: u64, pattern: &[u8], mask: &[u8], interpreter: &str) -> Arc<Rule> {
		Arc::new(Rule::magic(name, offset, pattern.to_vec(), mask.to_vec(), interpreter).unwrap())
	}

	fn write_candidate(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
		let path = dir.path().join(name);
		let mut file = File::create(&path).unwrap();
		file.write_all(bytes).unwrap();
		path
	}

	#[test]
	fn test_extension_suffix_match() {
		let rules = vec![ext("lua", ".lua", "/usr/bin/lua")];
		// Host path is irrelevant for extension rules and never opened.
		let matched = find_match(&rules, Path::new("/does/not/exist"), "/bin/script.lua").unwrap();
		assert_eq!(matched.unwrap().name, "lua");
	}

	#[test]
	fn test_extension_is_case_sensitive() {
		let rules = vec![ext("lua", ".lua", "/usr/bin/lua")];
		let matched = find_match(&rules, Path::new("/x"), "/bin/script.LUA").unwrap();
		assert!(matched.is_none());
	}

	#[test]
	fn test_extension_longer_than_path_never_matches() {
		let rules = vec![ext("long", "/very/long/suffix.lua", "/usr/bin/lua")];
		let matched = find_match(&rules, Path::new("/x"), ".lua").unwrap();
		assert!(matched.is_none());
	}

	#[test]
	fn test_magic_match_elf_header() {
		let dir = tempfile::tempdir().unwrap();
		let elf = write_candidate(&dir, "prog", b"\x7fELF\x02\x01\x01\x00");
		let other = write_candidate(&dir, "text", b"#!/bin/sh\n");

		let rules = vec![magic("elf", 0, b"\x7fELF", &[0xff; 4], "/sbin/loader")];
		assert!(find_match(&rules, &elf, "/bin/prog").unwrap().is_some());
		assert!(find_match(&rules, &other, "/bin/text").unwrap().is_none());
	}

	#[test]
	fn test_magic_match_at_offset() {
		let dir = tempfile::tempdir().unwrap();
		let candidate = write_candidate(&dir, "img", b"XXXXMAGIC");

		let rules = vec![magic("img", 4, b"MAGIC", &[0xff; 5], "/usr/bin/viewer")];
		assert!(find_match(&rules, &candidate, "/img").unwrap().is_some());
	}

	#[test]
	fn test_magic_mask_wildcards_bits() {
		let dir = tempfile::tempdir().unwrap();
		// 0xCB & 0xF0 == 0xC0.
		let candidate = write_candidate(&dir, "f", &[0xcb, 0x01]);

		let rules = vec![magic("m", 0, &[0xc7], &[0xf0], "/bin/interp")];
		assert!(find_match(&rules, &candidate, "/f").unwrap().is_some());
	}

	#[test]
	fn test_magic_effective_len_ignores_trailing_zero_mask() {
		let dir = tempfile::tempdir().unwrap();
		// Only two bytes in the file, but the mask's non-zero prefix is
		// also two bytes, so the probe fits.
		let candidate = write_candidate(&dir, "f", &[0xca, 0xfe]);

		let rules = vec![magic("m", 0, &[0xca, 0xfe, 0x99, 0x99], &[0xff, 0xff, 0x00, 0x00], "/bin/interp")];
		assert!(find_match(&rules, &candidate, "/f").unwrap().is_some());
	}

	#[test]
	fn test_all_zero_mask_never_matches() {
		let dir = tempfile::tempdir().unwrap();
		let candidate = write_candidate(&dir, "f", &[1, 2, 3, 4]);

		let rules = vec![magic("dead", 0, &[1, 2, 3], &[0, 0, 0], "/bin/interp")];
		assert!(find_match(&rules, &candidate, "/f").unwrap().is_none());
	}

	#[test]
	fn test_short_candidate_skips_rule_and_continues() {
		let dir = tempfile::tempdir().unwrap();
		let candidate = write_candidate(&dir, "f", b"ab");

		let rules = vec![
			magic("deep", 100, b"MAGIC", &[0xff; 5], "/bin/deep"),
			ext("fallback", "f", "/bin/fallback"),
		];
		let matched = find_match(&rules, &candidate, "/f").unwrap();
		assert_eq!(matched.unwrap().name, "fallback");
	}

	#[test]
	fn test_unreadable_candidate_is_an_error() {
		let rules = vec![magic("elf", 0, b"\x7fELF", &[0xff; 4], "/sbin/loader")];
		let result = find_match(&rules, Path::new("/nonexistent/candidate"), "/bin/prog");
		assert!(matches!(result, Err(BinfmtError::Probe { .. })));
	}

	#[test]
	fn test_first_match_wins() {
		let rules = vec![
			ext("first", ".lua", "/usr/bin/lua51"),
			ext("second", ".lua", "/usr/bin/lua54"),
		];
		let matched = find_match(&rules, Path::new("/x"), "/bin/script.lua").unwrap();
		assert_eq!(matched.unwrap().interpreter, "/usr/bin/lua51");
	}

	#[test]
	fn test_no_rules_no_match() {
		assert!(find_match(&[], Path::new("/x"), "/bin/prog").unwrap().is_none());
	}
}
