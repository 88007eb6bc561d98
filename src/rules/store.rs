use crate::error::{BinfmtError, Result};
use crate::rules::types::Rule;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Ordered, process-wide collection of binfmt rules.
///
/// Insertion order is evaluation order: the matcher walks the store front
/// to back and the first matching rule wins. The store is an explicit
/// handle owned by the tracer and passed into matcher/rewriter calls;
/// mutations are serialized by a write lock, and [`RuleStore::snapshot`]
/// hands the matcher a consistent view that concurrent mutation cannot
/// tear.
#[derive(Debug, Default)]
pub struct RuleStore {
	rules: RwLock<Vec<Arc<Rule>>>,
}

impl RuleStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a rule at the end of the evaluation order.
	///
	/// Duplicate names are permitted; `unregister` removes the first one.
	pub fn register(&self, rule: Rule) -> Result<()> {
		let mut rules = self.rules.write();
		rules
			.try_reserve(1)
			.map_err(|source| BinfmtError::OutOfMemory { source })?;
		debug!(name = %rule.name, "registering binfmt rule");
		rules.push(Arc::new(rule));
		Ok(())
	}

	/// Remove the first rule whose name equals `name`, preserving the
	/// relative order of the rest.
	pub fn unregister(&self, name: &str) -> Result<()> {
		let mut rules = self.rules.write();
		match rules.iter().position(|r| r.name == name) {
			Some(index) => {
				rules.remove(index);
				debug!(name, "unregistered binfmt rule");
				Ok(())
			}
			None => Err(BinfmtError::RuleNotFound {
				name: name.to_string(),
			}),
		}
	}

	/// Drop every rule. Idempotent.
	pub fn clear(&self) {
		self.rules.write().clear();
	}

	/// A consistent ordered view of the rules for evaluation.
	///
	/// Clones the `Arc`s, not the rules, so a long file probe never runs
	/// under the lock and never observes a half-applied mutation.
	pub fn snapshot(&self) -> Vec<Arc<Rule>> {
		self.rules.read().clone()
	}

	pub fn len(&self) -> usize {
		self.rules.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.read().is_empty()
	}
}
