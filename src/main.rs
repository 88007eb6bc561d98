use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sandbox_binfmt::config::{load_path, LoadPolicy};
use sandbox_binfmt::error::BinfmtError;
use sandbox_binfmt::matcher::find_match;
use sandbox_binfmt::rewrite::Outcome;
use sandbox_binfmt::rules::{RuleKind, RuleStore};
use sandbox_binfmt::tracee::{ArgVector, ExecBridge, SysArg};

#[derive(Parser)]
#[command(name = "binfmtctl")]
#[command(
	author,
	version,
	about = "Inspect and dry-run binfmt rules for the ptrace sandbox"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Skip malformed rule lines instead of aborting at the first one
	#[arg(long, global = true)]
	skip_invalid: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Parse a rules file and print its rules
	Show {
		/// Rules file (defaults to the user rules file)
		file: Option<PathBuf>,
	},
	/// Check a rules file for errors without doing anything else
	Validate {
		/// Rules file (defaults to the user rules file)
		file: Option<PathBuf>,
	},
	/// Dry-run the matcher and rewriter against a candidate file
	Match {
		/// Rules file
		rules: PathBuf,

		/// Candidate executable on the host filesystem
		candidate: PathBuf,

		/// Path as the sandboxed process would see it (defaults to the
		/// candidate path)
		#[arg(long)]
		sandbox_path: Option<String>,
	},
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();

	match run() {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<ExitCode> {
	let cli = Cli::parse();
	let policy = if cli.skip_invalid {
		LoadPolicy::SkipInvalid
	} else {
		LoadPolicy::FailFast
	};

	match cli.command {
		Commands::Show { file } => handle_show(file, policy),
		Commands::Validate { file } => handle_validate(file, policy),
		Commands::Match {
			rules,
			candidate,
			sandbox_path,
		} => handle_match(&rules, &candidate, sandbox_path, policy),
	}
}

/// Default rules file under the user's config directory.
fn user_rules_path() -> Result<PathBuf> {
	let config_dir = dirs::config_dir().ok_or(BinfmtError::HomeDirectoryNotFound)?;
	Ok(config_dir.join("sandbox-binfmt").join("binfmt.rules"))
}

fn resolve_rules_file(file: Option<PathBuf>) -> Result<PathBuf> {
	match file {
		Some(path) => Ok(path),
		None => user_rules_path(),
	}
}

fn load_rules(path: &Path, policy: LoadPolicy) -> Result<RuleStore> {
	let store = RuleStore::new();
	load_path(&store, path, policy)
		.with_context(|| format!("Failed to load rules from {}", path.display()))?;
	Ok(store)
}

fn handle_show(file: Option<PathBuf>, policy: LoadPolicy) -> Result<ExitCode> {
	let path = resolve_rules_file(file)?;
	let store = load_rules(&path, policy)?;

	println!("# Source: {}", path.display());
	println!("# rules: {}\n", store.len());

	for (i, rule) in store.snapshot().iter().enumerate() {
		println!("  Rule {} ({}):", i + 1, rule.name);
		match &rule.kind {
			RuleKind::Extension { suffix } => {
				println!("    extension: {}", render_bytes(suffix));
			}
			RuleKind::Magic {
				offset,
				pattern,
				mask,
				cmp_len,
			} => {
				println!("    offset:  {offset}");
				println!("    pattern: {} (pre-masked)", render_bytes(pattern));
				println!("    mask:    {}", render_bytes(mask));
				if *cmp_len == 0 {
					println!("    note:    all-zero mask, rule can never match");
				}
			}
		}
		println!("    interpreter: {}\n", rule.interpreter);
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_validate(file: Option<PathBuf>, policy: LoadPolicy) -> Result<ExitCode> {
	let path = resolve_rules_file(file)?;

	match load_rules(&path, policy) {
		Ok(store) => {
			println!("{}: {} rules OK", path.display(), store.len());
			Ok(ExitCode::SUCCESS)
		}
		Err(e) => {
			eprintln!("Configuration error: {e:#}");
			Ok(ExitCode::FAILURE)
		}
	}
}

fn handle_match(
	rules_file: &Path,
	candidate: &Path,
	sandbox_path: Option<String>,
	policy: LoadPolicy,
) -> Result<ExitCode> {
	let store = load_rules(rules_file, policy)?;
	let sandbox_path = sandbox_path.unwrap_or_else(|| candidate.to_string_lossy().into_owned());

	let matched = find_match(&store.snapshot(), candidate, &sandbox_path)
		.with_context(|| format!("Failed to evaluate {}", candidate.display()))?;
	let Some(rule) = matched else {
		println!("no match");
		return Ok(ExitCode::FAILURE);
	};

	println!("matched rule: {}", rule.name);

	// Preview the full interception against the host filesystem.
	let mut bridge = DryRunBridge::new(&sandbox_path);
	let mut host_path = candidate.to_path_buf();
	let mut user_path = sandbox_path.clone();

	let outcome = store
		.check(&mut bridge, &mut host_path, &mut user_path)
		.context("Interception dry run failed")?;
	if outcome != Outcome::Intercepted {
		anyhow::bail!("Matcher and rewriter disagreed on {}", candidate.display());
	}

	println!("rewritten path: {user_path}");
	print!("rewritten argv: [");
	let argv = bridge.committed.unwrap_or_default();
	// Drop the null-terminator slot from display.
	let shown: Vec<&str> = argv
		.iter()
		.take(argv.len().saturating_sub(1))
		.map(String::as_str)
		.collect();
	println!("{}]", shown.join(", "));

	Ok(ExitCode::SUCCESS)
}

/// Render decoded rule bytes back in the rule-file escape syntax.
fn render_bytes(bytes: &[u8]) -> String {
	let mut out = String::new();
	for &b in bytes {
		match b {
			b'\n' => out.push_str("\\n"),
			b'\t' => out.push_str("\\t"),
			b'\r' => out.push_str("\\r"),
			b'\\' => out.push_str("\\\\"),
			0x20..=0x7e => out.push(b as char),
			_ => out.push_str(&format!("\\x{b:02x}")),
		}
	}
	out
}

/// Host-filesystem stand-in for the tracer's translation and argv layers,
/// so `binfmtctl match` can preview an interception without a tracee.
struct DryRunBridge {
	argv: Vec<String>,
	committed: Option<Vec<String>>,
}

struct DryRunArgv {
	entries: Vec<String>,
}

impl DryRunBridge {
	fn new(sandbox_path: &str) -> Self {
		// argv[0] plus the null-terminator slot, as a tracee image would
		// carry them.
		DryRunBridge {
			argv: vec![sandbox_path.to_string(), String::new()],
			committed: None,
		}
	}
}

impl ArgVector for DryRunArgv {
	fn len(&self) -> usize {
		self.entries.len()
	}

	fn resize(&mut self, at: usize, additional: usize) -> sandbox_binfmt::Result<()> {
		for _ in 0..additional {
			self.entries.insert(at, String::new());
		}
		Ok(())
	}

	fn write_entries(&mut self, start: usize, values: &[&str]) -> sandbox_binfmt::Result<()> {
		for (i, value) in values.iter().enumerate() {
			self.entries[start + i] = value.to_string();
		}
		Ok(())
	}
}

impl ExecBridge for DryRunBridge {
	type Argv = DryRunArgv;

	fn translate_and_validate(
		&mut self,
		host_path: &mut PathBuf,
		user_path: &str,
	) -> sandbox_binfmt::Result<()> {
		// Outside a sandbox namespace the translation is the identity;
		// still insist the interpreter is a real executable.
		let path = Path::new(user_path);
		let metadata = std::fs::metadata(path).map_err(|source| BinfmtError::Tracee {
			op: "translate_and_validate",
			source,
		})?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			if metadata.permissions().mode() & 0o111 == 0 {
				return Err(BinfmtError::Tracee {
					op: "translate_and_validate",
					source: std::io::Error::new(
						std::io::ErrorKind::PermissionDenied,
						format!("{user_path} is not executable"),
					),
				});
			}
		}

		*host_path = path.to_path_buf();
		Ok(())
	}

	fn fetch_argv(&mut self, slot: SysArg) -> sandbox_binfmt::Result<Self::Argv> {
		debug_assert_eq!(slot, SysArg::Arg2);
		Ok(DryRunArgv {
			entries: self.argv.clone(),
		})
	}

	fn commit_argv(&mut self, argv: Self::Argv, _slot: SysArg) -> sandbox_binfmt::Result<()> {
		self.committed = Some(argv.entries);
		Ok(())
	}
}
