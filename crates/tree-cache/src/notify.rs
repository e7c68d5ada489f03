//! Change notifications for rows written through the cache

use crate::value::RowId;

use std::fmt;

use tracing::trace;

/// Identifiers touched by a mutation.
///
/// Lists are not recursive: a listed row's descendants are only affected if they are
/// listed too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
	pub added: Vec<RowId>,
	pub updated: Vec<RowId>,
	pub deleted: Vec<RowId>,
}

impl ChangeSet {
	#[must_use]
	pub fn added(ids: Vec<RowId>) -> Self {
		Self {
			added: ids,
			..Default::default()
		}
	}

	#[must_use]
	pub fn updated(ids: Vec<RowId>) -> Self {
		Self {
			updated: ids,
			..Default::default()
		}
	}

	#[must_use]
	pub fn deleted(ids: Vec<RowId>) -> Self {
		Self {
			deleted: ids,
			..Default::default()
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Observer = Box<dyn FnMut(&ChangeSet)>;

/// Synchronous, in-process observer list.
///
/// Observers are called in subscription order on the caller's thread. Notifying never
/// touches any cache, subscribers that need fresh data must re-fetch themselves.
#[derive(Default)]
pub struct ChangeNotifier {
	observers: Vec<(SubscriptionId, Observer)>,
	next_id: u64,
}

impl fmt::Debug for ChangeNotifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChangeNotifier")
			.field("observers", &self.observers.len())
			.field("next_id", &self.next_id)
			.finish()
	}
}

impl ChangeNotifier {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&mut self, observer: impl FnMut(&ChangeSet) + 'static) -> SubscriptionId {
		let id = SubscriptionId(self.next_id);
		self.next_id += 1;
		self.observers.push((id, Box::new(observer)));
		id
	}

	/// Returns whether the subscription existed.
	pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
		let before = self.observers.len();
		self.observers.retain(|(existing, _)| *existing != id);
		self.observers.len() != before
	}

	/// Empty change sets are not broadcast.
	pub fn notify(&mut self, changes: &ChangeSet) {
		if changes.is_empty() {
			return;
		}

		trace!(
			added = changes.added.len(),
			updated = changes.updated.len(),
			deleted = changes.deleted.len(),
			observers = self.observers.len(),
			"broadcasting changes"
		);

		for (_, observer) in &mut self.observers {
			observer(changes);
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.observers.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.observers.is_empty()
	}
}
