//! Collaborator interfaces between the binfmt engine and the tracer.
//!
//! The engine never touches a traced process's memory itself. Path
//! re-validation and argument-vector marshaling belong to the tracer's
//! translation layer; this module only defines the seam the rewriter
//! drives. Implementations live with the tracer (or, for `binfmtctl`,
//! in a host-filesystem dry run).

use crate::error::Result;
use std::path::PathBuf;

/// A syscall argument slot of the intercepted exec call.
///
/// The argument vector of `execve(path, argv, envp)` lives in the second
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysArg {
	Arg1,
	Arg2,
	Arg3,
	Arg4,
	Arg5,
	Arg6,
}

/// The exec call's argv slot.
pub const ARGV_SLOT: SysArg = SysArg::Arg2;

/// A growable, indexable in-memory image of a tracee's argument list.
///
/// The length counts every slot, including the terminating null slot, so
/// an empty argv still reports length 1.
pub trait ArgVector {
	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Insert `additional` empty slots at `at`, shifting later entries.
	fn resize(&mut self, at: usize, additional: usize) -> Result<()>;

	/// Write `values` into consecutive slots starting at `start`.
	fn write_entries(&mut self, start: usize, values: &[&str]) -> Result<()>;
}

/// Tracer-side operations the rewriter needs for one exec interception.
///
/// Every method may fail; the rewriter propagates the failure unchanged
/// and the caller must then deny the syscall rather than let a
/// half-rewritten exec proceed.
pub trait ExecBridge {
	type Argv: ArgVector;

	/// Re-translate the rewritten sandbox path and confirm it resolves to
	/// a permitted executable, updating `host_path` to the new
	/// translation.
	fn translate_and_validate(&mut self, host_path: &mut PathBuf, user_path: &str) -> Result<()>;

	/// Fetch the tracee's argument vector from the given syscall slot.
	fn fetch_argv(&mut self, slot: SysArg) -> Result<Self::Argv>;

	/// Write the mutated vector back into the tracee's memory and the
	/// syscall argument.
	fn commit_argv(&mut self, argv: Self::Argv, slot: SysArg) -> Result<()>;
}
