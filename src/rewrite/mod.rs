//! Exec interception: path substitution and argv rewriting on a match.
//!
//! One attempt moves through Evaluating → {NotMatched | Matched}, and on
//! a match through Rewriting → {Committed | Failed}. `NotMatched` and
//! `Committed` surface as [`Outcome`]; any rewriting failure surfaces as
//! an error and the caller must deny the syscall — a failed attempt never
//! leaves a usable half-rewritten state behind.

use crate::error::Result;
use crate::matcher;
use crate::rules::RuleStore;
use crate::tracee::{ArgVector, ExecBridge, ARGV_SLOT};
use std::path::PathBuf;
use tracing::debug;

/// Terminal result of a successful interception attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// No rule matched; the exec proceeds with its paths untouched.
	NotMatched,

	/// A rule matched and the rewritten argv was committed to the tracee.
	Intercepted,
}

impl RuleStore {
	/// Evaluate the store against an exec candidate and, on a match,
	/// rewrite the call to run through the rule's interpreter.
	///
	/// `host_path` is the candidate's real location; `user_path` is the
	/// sandbox-visible path buffer, overwritten with the interpreter on a
	/// match. The committed argv is
	/// `[interpreter, original_user_path, original_argv[1:]...]`.
	pub fn check<B: ExecBridge>(
		&self,
		bridge: &mut B,
		host_path: &mut PathBuf,
		user_path: &mut String,
	) -> Result<Outcome> {
		let rules = self.snapshot();
		let Some(rule) = matcher::find_match(&rules, host_path, user_path)? else {
			return Ok(Outcome::NotMatched);
		};

		// Capture the original sandbox path before overwriting it: it
		// becomes the interpreter's first real argument.
		let original_user_path = user_path.clone();
		user_path.clear();
		user_path.push_str(&rule.interpreter);

		bridge.translate_and_validate(host_path, user_path)?;

		let mut argv = bridge.fetch_argv(ARGV_SLOT)?;

		// One new front slot normally: argv[0] is overwritten by the
		// original path and everything shifts once. A vector holding only
		// its null terminator has no argv[0] to reuse, so it needs two.
		let additional = if argv.len() == 1 { 2 } else { 1 };
		argv.resize(0, additional)?;
		argv.write_entries(0, &[user_path.as_str(), original_user_path.as_str()])?;

		bridge.commit_argv(argv, ARGV_SLOT)?;

		debug!(
			rule = %rule.name,
			interpreter = %rule.interpreter,
			original = %original_user_path,
			"intercepted exec"
		);
		Ok(Outcome::Intercepted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::BinfmtError;
	use crate::rules::Rule;
	use crate::tracee::SysArg;
	use std::fs::File;
	use std::io::Write;
	use std::path::Path;

	/// Which rewriting step the mock bridge should fail at.
	#[derive(Clone, Copy, PartialEq)]
	enum FailAt {
		Nowhere,
		Translate,
		Fetch,
		Resize,
		Write,
		Commit,
	}

	struct MockArgv {
		entries: Vec<String>,
		fail_at: FailAt,
	}

	fn refused(op: &'static str) -> BinfmtError {
		BinfmtError::Tracee {
			op,
			source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
		}
	}

	impl ArgVector for MockArgv {
		fn len(&self) -> usize {
			self.entries.len()
		}

		fn resize(&mut self, at: usize, additional: usize) -> Result<()> {
			if self.fail_at == FailAt::Resize {
				return Err(refused("resize"));
			}
			for _ in 0..additional {
				self.entries.insert(at, String::new());
			}
			Ok(())
		}

		fn write_entries(&mut self, start: usize, values: &[&str]) -> Result<()> {
			if self.fail_at == FailAt::Write {
				return Err(refused("write_entries"));
			}
			for (i, value) in values.iter().enumerate() {
				self.entries[start + i] = value.to_string();
			}
			Ok(())
		}
	}

	struct MockBridge {
		argv: Vec<String>,
		fail_at: FailAt,
		committed: Option<Vec<String>>,
		translated: Option<String>,
	}

	impl MockBridge {
		fn new(argv: &[&str]) -> Self {
			// Tracee argv images carry their null terminator as a slot.
			let mut entries: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
			entries.push(String::new());
			MockBridge {
				argv: entries,
				fail_at: FailAt::Nowhere,
				committed: None,
				translated: None,
			}
		}

		fn failing_at(argv: &[&str], fail_at: FailAt) -> Self {
			let mut bridge = Self::new(argv);
			bridge.fail_at = fail_at;
			bridge
		}
	}

	impl ExecBridge for MockBridge {
		type Argv = MockArgv;

		fn translate_and_validate(&mut self, host_path: &mut PathBuf, user_path: &str) -> Result<()> {
			if self.fail_at == FailAt::Translate {
				return Err(refused("translate_and_validate"));
			}
			self.translated = Some(user_path.to_string());
			*host_path = PathBuf::from(user_path);
			Ok(())
		}

		fn fetch_argv(&mut self, slot: SysArg) -> Result<Self::Argv> {
			assert_eq!(slot, SysArg::Arg2);
			if self.fail_at == FailAt::Fetch {
				return Err(refused("fetch_argv"));
			}
			Ok(MockArgv {
				entries: self.argv.clone(),
				fail_at: self.fail_at,
			})
		}

		fn commit_argv(&mut self, argv: Self::Argv, slot: SysArg) -> Result<()> {
			assert_eq!(slot, SysArg::Arg2);
			if self.fail_at == FailAt::Commit {
				return Err(refused("commit_argv"));
			}
			self.committed = Some(argv.entries);
			Ok(())
		}
	}

	fn lua_store() -> RuleStore {
		let store = RuleStore::new();
		store
			.register(Rule::extension("lua", b".lua".to_vec(), "/usr/bin/lua").unwrap())
			.unwrap();
		store
	}

	fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
		let path = dir.path().join(name);
		let mut file = File::create(&path).unwrap();
		file.write_all(bytes).unwrap();
		path
	}

	#[test]
	fn test_no_match_leaves_paths_untouched() {
		let store = lua_store();
		let mut bridge = MockBridge::new(&["/bin/prog"]);
		let mut host = PathBuf::from("/real/bin/prog");
		let mut user = String::from("/bin/prog");

		let outcome = store.check(&mut bridge, &mut host, &mut user).unwrap();
		assert_eq!(outcome, Outcome::NotMatched);
		assert_eq!(user, "/bin/prog");
		assert_eq!(host, Path::new("/real/bin/prog"));
		assert!(bridge.committed.is_none());
	}

	#[test]
	fn test_intercept_rewrites_path_and_argv() {
		let store = lua_store();
		let mut bridge = MockBridge::new(&["/bin/script.lua", "arg1", "arg2"]);
		let mut host = PathBuf::from("/real/bin/script.lua");
		let mut user = String::from("/bin/script.lua");

		let outcome = store.check(&mut bridge, &mut host, &mut user).unwrap();
		assert_eq!(outcome, Outcome::Intercepted);
		assert_eq!(user, "/usr/bin/lua");
		assert_eq!(bridge.translated.as_deref(), Some("/usr/bin/lua"));

		// argv[0] is replaced by the shifted original path; the tail and
		// the null slot survive.
		let committed = bridge.committed.unwrap();
		assert_eq!(committed, ["/usr/bin/lua", "/bin/script.lua", "arg1", "arg2", ""]);
	}

	#[test]
	fn test_intercept_with_empty_argv_grows_two_slots() {
		let store = lua_store();
		// Only the null terminator: grow by two, nothing to overwrite.
		let mut bridge = MockBridge::new(&[]);
		let mut host = PathBuf::from("/real/bin/script.lua");
		let mut user = String::from("/bin/script.lua");

		store.check(&mut bridge, &mut host, &mut user).unwrap();
		let committed = bridge.committed.unwrap();
		assert_eq!(committed, ["/usr/bin/lua", "/bin/script.lua", ""]);
	}

	#[test]
	fn test_magic_rule_end_to_end() {
		let dir = tempfile::tempdir().unwrap();
		let host_file = write_file(&dir, "prog", b"\x7fELF\x02\x01");

		let store = RuleStore::new();
		store
			.register(Rule::magic("elf", 0, b"\x7fELF".to_vec(), vec![0xff; 4], "/sbin/loader").unwrap())
			.unwrap();

		let mut bridge = MockBridge::new(&["/bin/prog"]);
		let mut host = host_file.clone();
		let mut user = String::from("/bin/prog");

		let outcome = store.check(&mut bridge, &mut host, &mut user).unwrap();
		assert_eq!(outcome, Outcome::Intercepted);
		assert_eq!(user, "/sbin/loader");
		assert_eq!(host, Path::new("/sbin/loader"));
		assert_eq!(bridge.committed.unwrap(), ["/sbin/loader", "/bin/prog", ""]);
	}

	#[test]
	fn test_failures_propagate_and_nothing_commits() {
		for fail_at in [FailAt::Translate, FailAt::Fetch, FailAt::Resize, FailAt::Write, FailAt::Commit] {
			let store = lua_store();
			let mut bridge = MockBridge::failing_at(&["/bin/script.lua"], fail_at);
			let mut host = PathBuf::from("/real/bin/script.lua");
			let mut user = String::from("/bin/script.lua");

			let result = store.check(&mut bridge, &mut host, &mut user);
			assert!(matches!(result, Err(BinfmtError::Tracee { .. })));
			assert!(bridge.committed.is_none());
		}
	}
}
