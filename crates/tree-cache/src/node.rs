//! Per-anchor row cache

use crate::{
	backend::Backend,
	error::{Error, Result},
	query::{FilterSpec, QueryBuilder, SortSpec},
	value::{CellValue, RowId},
};

use std::collections::{hash_map::Entry, BTreeSet, HashMap};

use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
	Unfetched,
	Fetched,
}

/// Everything a node borrows to talk to the backend.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
	pub backend: &'a Backend<'a>,
	pub query: &'a QueryBuilder,
	pub sort: &'a SortSpec,
	pub filters: &'a FilterSpec,
}

/// Outcome of persisting pending edits, each edit is an independent attempt.
#[derive(Debug, Default)]
pub struct CommitReport {
	pub persisted: Vec<RowId>,
	pub failed: Vec<Error>,
}

/// Every row whose parent column equals one anchor, plus the nodes materialized below it.
///
/// A node owns its children outright. The link back to the parent is only the parent's
/// anchor, resolved through the owning tree when needed.
#[derive(Debug)]
pub struct NodeCache {
	anchor: RowId,
	parent: Option<RowId>,
	state: NodeState,
	epoch: u64,
	stale: bool,

	/// position -> default column position -> value
	rows: Vec<Vec<CellValue>>,
	/// position -> identifier, `None` for rows with a NULL id
	identifiers: Vec<Option<RowId>>,
	positions: HashMap<RowId, usize>,
	/// (position, column) edited in cache but not yet written back
	pending: BTreeSet<(usize, usize)>,

	children: HashMap<RowId, NodeCache>,
}

impl NodeCache {
	#[must_use]
	pub fn new(anchor: RowId, parent: Option<RowId>) -> Self {
		Self {
			anchor,
			parent,
			state: NodeState::Unfetched,
			epoch: 0,
			stale: false,
			rows: Vec::new(),
			identifiers: Vec::new(),
			positions: HashMap::new(),
			pending: BTreeSet::new(),
			children: HashMap::new(),
		}
	}

	/// Replaces the whole snapshot with a fresh full fetch.
	///
	/// The previous snapshot is kept if the query fails. Already materialized children are
	/// marked stale but neither dropped nor re-fetched.
	pub fn fetch_all(&mut self, ctx: FetchContext<'_>) -> Result<usize> {
		let query = ctx.query.select_rows(&self.anchor, ctx.filters, ctx.sort)?;
		let rows = ctx.backend.fetch_rows(&query)?;

		let id_position = ctx.query.id_position();
		let identifiers = rows
			.iter()
			.map(|row| row.get(id_position).and_then(CellValue::to_row_id))
			.collect::<Vec<_>>();
		let positions = identifiers
			.iter()
			.enumerate()
			.filter_map(|(position, id)| id.clone().map(|id| (id, position)))
			.collect();

		self.rows = rows;
		self.identifiers = identifiers;
		self.positions = positions;
		self.pending.clear();
		self.state = NodeState::Fetched;
		self.epoch += 1;
		self.stale = false;

		for child in self.children.values_mut() {
			child.stale = true;
		}

		debug!(
			anchor = %self.anchor,
			rows = self.rows.len(),
			epoch = self.epoch,
			"fetched node"
		);

		Ok(self.rows.len())
	}

	/// Live count of the children of the row at `position`, or of this node's own rows
	/// when no position is given.
	pub fn row_count(&self, ctx: FetchContext<'_>, position: Option<usize>) -> Result<usize> {
		let anchor = match position {
			None => self.anchor.clone(),
			Some(position) => match self.row_identifier_at(position) {
				Some(id) => id.clone(),
				None if self.state == NodeState::Unfetched => self
					.lookup_identifier(ctx, position)?
					.ok_or(Error::RowNotFound(position))?,
				None => return Err(Error::RowNotFound(position)),
			},
		};

		ctx.backend
			.count(&ctx.query.count_rows(&anchor, ctx.filters)?)
	}

	/// Cached identifier at `position`, never touches the backend.
	#[must_use]
	pub fn row_identifier_at(&self, position: usize) -> Option<&RowId> {
		self.identifiers.get(position).and_then(Option::as_ref)
	}

	/// Asks the backend which row currently sits at `position` under this anchor.
	///
	/// Costs an `OFFSET` scan proportional to `position`.
	pub fn lookup_identifier(
		&self,
		ctx: FetchContext<'_>,
		position: usize,
	) -> Result<Option<RowId>> {
		let query = ctx
			.query
			.select_identifier_at(&self.anchor, ctx.filters, ctx.sort, position)?;

		Ok(ctx
			.backend
			.lookup(&query)?
			.as_ref()
			.and_then(CellValue::to_row_id))
	}

	#[must_use]
	pub fn position_of(&self, id: &RowId) -> Option<usize> {
		self.positions.get(id).copied()
	}

	#[must_use]
	pub fn row(&self, position: usize) -> Option<&[CellValue]> {
		self.rows.get(position).map(Vec::as_slice)
	}

	#[must_use]
	pub fn cell_value(&self, position: usize, column: usize) -> Option<&CellValue> {
		self.rows.get(position)?.get(column)
	}

	/// Writes into the cache only, the edit stays pending until persisted.
	pub fn set_cell_value(&mut self, position: usize, column: usize, value: CellValue) -> Result<()> {
		let cell = self
			.rows
			.get_mut(position)
			.ok_or(Error::RowNotFound(position))?
			.get_mut(column)
			.ok_or(Error::ColumnNotFound(column))?;

		*cell = value;
		self.pending.insert((position, column));

		Ok(())
	}

	/// Writes the cached cell back with a single-row `UPDATE`, returning the row's id.
	pub fn persist_cell(
		&mut self,
		ctx: FetchContext<'_>,
		position: usize,
		column: usize,
	) -> Result<RowId> {
		let id = self
			.row_identifier_at(position)
			.cloned()
			.ok_or(Error::RowNotFound(position))?;
		let value = self
			.cell_value(position, column)
			.ok_or(Error::ColumnNotFound(column))?;

		let changed = ctx
			.backend
			.execute(&ctx.query.update_cell(column, value, &id)?)?;
		if changed == 0 {
			return Err(Error::IdentifierNotFound(id));
		}

		self.pending.remove(&(position, column));
		trace!(%id, column, "persisted cell");

		Ok(id)
	}

	/// Persists every pending edit of this node and of its materialized subtree.
	pub fn persist_pending(&mut self, ctx: FetchContext<'_>) -> CommitReport {
		let mut report = CommitReport::default();
		self.persist_pending_into(ctx, &mut report);
		report
	}

	fn persist_pending_into(&mut self, ctx: FetchContext<'_>, report: &mut CommitReport) {
		let pending = self.pending.iter().copied().collect::<Vec<_>>();

		for (position, column) in pending {
			match self.persist_cell(ctx, position, column) {
				Ok(id) => {
					if !report.persisted.contains(&id) {
						report.persisted.push(id);
					}
				}
				Err(e) => report.failed.push(e),
			}
		}

		for child in self.children.values_mut() {
			child.persist_pending_into(ctx, report);
		}
	}

	/// Re-reads one cell from the backend, discarding any pending edit to it.
	pub fn reload_cell(&mut self, ctx: FetchContext<'_>, position: usize, column: usize) -> Result<()> {
		let id = self
			.row_identifier_at(position)
			.cloned()
			.ok_or(Error::RowNotFound(position))?;

		let value = ctx
			.backend
			.lookup(&ctx.query.select_cell(column, &id)?)?
			.ok_or_else(|| Error::IdentifierNotFound(id.clone()))?;

		let cell = self
			.rows
			.get_mut(position)
			.and_then(|row| row.get_mut(column))
			.ok_or(Error::ColumnNotFound(column))?;

		*cell = value;
		self.pending.remove(&(position, column));

		Ok(())
	}

	/// Child node for the row at `position`, materialized and fetched on first use.
	///
	/// An existing child is returned as is, without touching the backend.
	pub fn child_for(&mut self, ctx: FetchContext<'_>, position: usize) -> Result<&mut Self> {
		let id = self
			.row_identifier_at(position)
			.cloned()
			.ok_or(Error::RowNotFound(position))?;

		match self.children.entry(id) {
			Entry::Occupied(entry) => Ok(entry.into_mut()),
			Entry::Vacant(entry) => {
				let mut child = Self::new(entry.key().clone(), Some(self.anchor.clone()));
				child.fetch_all(ctx)?;

				debug!(anchor = %self.anchor, child = %entry.key(), "materialized child node");

				Ok(entry.insert(child))
			}
		}
	}

	#[must_use]
	pub fn child(&self, id: &RowId) -> Option<&Self> {
		self.children.get(id)
	}

	pub fn child_mut(&mut self, id: &RowId) -> Option<&mut Self> {
		self.children.get_mut(id)
	}

	/// Drops a materialized child along with its whole subtree.
	pub fn remove_child(&mut self, id: &RowId) -> Option<Self> {
		self.children.remove(id)
	}

	pub fn children(&self) -> impl Iterator<Item = &Self> {
		self.children.values()
	}

	#[must_use]
	pub fn child_count(&self) -> usize {
		self.children.len()
	}

	/// Follows a path of anchors down from this node.
	#[must_use]
	pub fn descend(&self, path: &[RowId]) -> Option<&Self> {
		let mut node = self;
		for id in path {
			node = node.children.get(id)?;
		}
		Some(node)
	}

	pub fn descend_mut(&mut self, path: &[RowId]) -> Option<&mut Self> {
		let mut node = self;
		for id in path {
			node = node.children.get_mut(id)?;
		}
		Some(node)
	}

	#[must_use]
	pub const fn anchor(&self) -> &RowId {
		&self.anchor
	}

	/// Anchor of the owning node, `None` for a root.
	#[must_use]
	pub const fn parent_anchor(&self) -> Option<&RowId> {
		self.parent.as_ref()
	}

	#[must_use]
	pub const fn state(&self) -> NodeState {
		self.state
	}

	/// Incremented by every successful fetch.
	#[must_use]
	pub const fn epoch(&self) -> u64 {
		self.epoch
	}

	/// Whether the owning node was re-fetched after this node's last fetch.
	#[must_use]
	pub const fn is_stale(&self) -> bool {
		self.stale
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.rows.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn pending_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
		self.pending.iter().copied()
	}
}
