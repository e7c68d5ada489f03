//! Navigation over the cached tree

use crate::{
	backend::{Backend, BackendStats},
	column::ColumnMapper,
	config::TreeConfig,
	error::{ConfigurationError, Error, Result},
	node::{FetchContext, NodeCache},
	notify::{ChangeNotifier, ChangeSet, SubscriptionId},
	query::{FilterSpec, QueryBuilder, SortDirection, SortSpec},
	value::{CellValue, RowId},
};

use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Handle to one cell of the tree, as handed out to views.
///
/// The handle names the node holding the row by the chain of anchors leading to it, and
/// remembers which snapshot of that node its row position was resolved against. Handles
/// outlived by a re-fetch of their node, or by a root change, resolve to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIndex {
	row: usize,
	column: usize,
	path: Vec<RowId>,
	generation: u64,
	epoch: u64,
}

impl ModelIndex {
	#[must_use]
	pub const fn row(&self) -> usize {
		self.row
	}

	/// Display column
	#[must_use]
	pub const fn column(&self) -> usize {
		self.column
	}

	/// Number of nodes between the root and the row, 0 for top level rows.
	#[must_use]
	pub fn depth(&self) -> usize {
		self.path.len()
	}

	/// Same row, another display column.
	#[must_use]
	pub fn sibling_at_column(&self, column: usize) -> Self {
		Self {
			column,
			..self.clone()
		}
	}
}

/// Lazy tree view over a parent-linked table.
///
/// Holds the column mapping, the current sort and filter, and the root [`NodeCache`].
/// Navigation methods (`index`, `parent`, `row_count`, `data`, …) never fail: backend and
/// lookup errors are logged and reported as "no data at this position". The `try_*`
/// variants return the underlying [`Error`] instead.
#[derive(Debug)]
pub struct TreeCache<'conn> {
	backend: Backend<'conn>,
	config: TreeConfig,
	query: QueryBuilder,
	sort: SortSpec,
	filters: FilterSpec,
	root: NodeCache,
	generation: u64,
	notifier: ChangeNotifier,
}

impl<'conn> TreeCache<'conn> {
	/// Discovers the table's columns, builds the column mapping and fetches the root node.
	pub fn configure(conn: &'conn Connection, config: TreeConfig) -> Result<Self> {
		let backend = Backend::new(conn);
		let query = build_query(&backend, &config)?;

		let mut tree = Self {
			backend,
			root: NodeCache::new(config.root.clone(), None),
			config,
			query,
			sort: SortSpec::new(),
			filters: FilterSpec::new(),
			generation: 0,
			notifier: ChangeNotifier::new(),
		};

		let rows = tree.fetch_root()?;

		info!(
			table = %tree.config.table,
			columns = tree.column_count(),
			root = %tree.root.anchor(),
			rows,
			"configured tree cache"
		);

		Ok(tree)
	}

	/// Replaces the configuration, dropping the sort, the filter and every cached node.
	pub fn reconfigure(&mut self, config: TreeConfig) -> Result<()> {
		let query = build_query(&self.backend, &config)?;
		let sort = SortSpec::new();
		let filters = FilterSpec::new();

		let mut root = NodeCache::new(config.root.clone(), None);
		root.fetch_all(FetchContext {
			backend: &self.backend,
			query: &query,
			sort: &sort,
			filters: &filters,
		})?;

		self.query = query;
		self.sort = sort;
		self.filters = filters;
		self.root = root;
		self.config = config;
		self.generation += 1;

		info!(table = %self.config.table, root = %self.root.anchor(), "reconfigured tree cache");

		Ok(())
	}

	/// Rebuilds the root node at a new anchor, discarding the whole materialized subtree.
	///
	/// The previous tree is kept if the new root can't be fetched.
	pub fn set_root(&mut self, id: impl Into<RowId>) -> Result<()> {
		let mut root = NodeCache::new(id.into(), None);
		root.fetch_all(self.context())?;

		debug!(
			previous = %self.root.anchor(),
			root = %root.anchor(),
			rows = root.len(),
			"replaced root node"
		);

		self.config.root = root.anchor().clone();
		self.root = root;
		self.generation += 1;

		Ok(())
	}

	#[must_use]
	pub const fn root_anchor(&self) -> &RowId {
		self.root.anchor()
	}

	/// Merges sort keys in front of the current ones. Takes effect on the next fetch.
	pub fn set_sort(
		&mut self,
		entries: impl IntoIterator<Item = (String, SortDirection)>,
	) -> Result<()> {
		let entries = entries.into_iter().collect::<Vec<_>>();

		for (code, _) in &entries {
			self.query.columns().real_name(code)?;
		}

		self.sort.apply(entries);

		Ok(())
	}

	/// Replaces the filter wholesale. Takes effect on the next fetch.
	pub fn set_filter(&mut self, filters: impl Into<FilterSpec>) -> Result<()> {
		let filters = filters.into();

		if let Some(unknown) = filters
			.filters()
			.iter()
			.find(|filter| !self.query.columns().has_backend_column(&filter.column))
		{
			return Err(ConfigurationError::UnknownBackendColumn(unknown.column.clone()).into());
		}

		self.filters = filters;

		Ok(())
	}

	#[must_use]
	pub const fn sort_spec(&self) -> &SortSpec {
		&self.sort
	}

	#[must_use]
	pub const fn filter_spec(&self) -> &FilterSpec {
		&self.filters
	}

	/// Re-fetches the root node only, materialized children keep their snapshots.
	pub fn fetch_root(&mut self) -> Result<usize> {
		let (root, ctx) = self.split();
		root.fetch_all(ctx)
	}

	/// Re-fetches (or materializes) the node holding the children of `parent`.
	pub fn fetch_children(&mut self, parent: &ModelIndex) -> Result<usize> {
		let generation = self.generation;
		let (root, ctx) = self.split();

		let owner = locate_mut(root, generation, parent)?;
		let id = owner
			.row_identifier_at(parent.row)
			.cloned()
			.ok_or(Error::RowNotFound(parent.row))?;

		if let Some(child) = owner.child_mut(&id) {
			return child.fetch_all(ctx);
		}

		owner.child_for(ctx, parent.row).map(|child| child.len())
	}

	/// Sorts by a single display column and re-fetches the root.
	///
	/// Materialized children are not re-fetched, see [`Self::set_root`] for a full rebuild.
	pub fn try_sort(&mut self, display_column: usize, direction: SortDirection) -> Result<()> {
		let columns = self.query.columns();
		let default_position = columns.default_position_for_display(display_column)?;
		let code = columns.code_at(default_position)?.to_string();

		self.set_sort([(code, direction)])?;
		self.fetch_root().map(|_| ())
	}

	pub fn sort(&mut self, display_column: usize, direction: SortDirection) -> bool {
		settle("sort", self.try_sort(display_column, direction)).is_some()
	}

	pub fn try_index(
		&mut self,
		row: usize,
		column: usize,
		parent: Option<&ModelIndex>,
	) -> Result<ModelIndex> {
		if column >= self.column_count() {
			return Err(Error::ColumnNotFound(column));
		}

		let generation = self.generation;
		let (root, ctx) = self.split();
		let node = children_of_mut(root, ctx, generation, parent)?;

		if row >= node.len() {
			return Err(Error::RowNotFound(row));
		}

		let path = match parent {
			None => Vec::new(),
			Some(parent) => {
				let mut path = parent.path.clone();
				path.push(node.anchor().clone());
				path
			}
		};

		Ok(ModelIndex {
			row,
			column,
			path,
			generation,
			epoch: node.epoch(),
		})
	}

	/// Handle for `(row, column)` under `parent`, materializing the parent's child node on
	/// first use. `None` parent means top level rows.
	pub fn index(
		&mut self,
		row: usize,
		column: usize,
		parent: Option<&ModelIndex>,
	) -> Option<ModelIndex> {
		settle("index", self.try_index(row, column, parent))
	}

	pub fn try_parent(&self, index: &ModelIndex) -> Result<Option<ModelIndex>> {
		let node = locate(&self.root, self.generation, index)?;

		let Some((anchor, owner_path)) = index.path.split_last() else {
			return Ok(None);
		};

		let owner = self
			.root
			.descend(owner_path)
			.ok_or_else(|| stale(index))?;

		if node.parent_anchor() != Some(owner.anchor()) {
			return Err(stale(index));
		}

		let row = owner.position_of(anchor).ok_or_else(|| stale(index))?;

		Ok(Some(ModelIndex {
			row,
			column: 0,
			path: owner_path.to_vec(),
			generation: self.generation,
			epoch: owner.epoch(),
		}))
	}

	/// Handle of the row owning `index`'s node, `None` for top level rows.
	#[must_use]
	pub fn parent(&self, index: &ModelIndex) -> Option<ModelIndex> {
		settle("parent", self.try_parent(index)).flatten()
	}

	pub fn try_row_count(&self, parent: Option<&ModelIndex>) -> Result<usize> {
		let ctx = self.context();

		match parent {
			None => self.root.row_count(ctx, None),
			Some(parent) => locate(&self.root, self.generation, parent)?
				.row_count(ctx, Some(parent.row)),
		}
	}

	/// Live backend count of the rows under `parent`, with the current filter applied.
	#[must_use]
	pub fn row_count(&self, parent: Option<&ModelIndex>) -> usize {
		settle("row_count", self.try_row_count(parent)).unwrap_or_default()
	}

	#[must_use]
	pub fn column_count(&self) -> usize {
		self.query.columns().column_count()
	}

	/// Header for a display column.
	#[must_use]
	pub fn header(&self, display_column: usize) -> Option<&str> {
		self.query.columns().header(display_column)
	}

	pub fn try_data(&self, index: &ModelIndex) -> Result<CellValue> {
		let column = self
			.query
			.columns()
			.default_position_for_display(index.column)?;

		locate(&self.root, self.generation, index)?
			.cell_value(index.row, column)
			.cloned()
			.ok_or(Error::RowNotFound(index.row))
	}

	/// Cached value of a cell.
	#[must_use]
	pub fn data(&self, index: &ModelIndex) -> Option<CellValue> {
		settle("data", self.try_data(index))
	}

	pub fn try_set_data(&mut self, index: &ModelIndex, value: CellValue) -> Result<()> {
		let column = self
			.query
			.columns()
			.default_position_for_display(index.column)?;

		locate_mut(&mut self.root, self.generation, index)?.set_cell_value(index.row, column, value)
	}

	/// Writes a cell in cache only, see [`Self::persist`] and [`Self::commit`].
	pub fn set_data(&mut self, index: &ModelIndex, value: CellValue) -> bool {
		settle("set_data", self.try_set_data(index, value)).is_some()
	}

	pub fn try_persist(&mut self, index: &ModelIndex) -> Result<RowId> {
		let column = self
			.query
			.columns()
			.default_position_for_display(index.column)?;

		let generation = self.generation;
		let (root, ctx) = self.split();
		let id = locate_mut(root, generation, index)?.persist_cell(ctx, index.row, column)?;

		self.notifier
			.notify(&ChangeSet::updated(vec![id.clone()]));

		Ok(id)
	}

	/// Writes one cached cell back to the backend.
	pub fn persist(&mut self, index: &ModelIndex) -> bool {
		settle("persist", self.try_persist(index)).is_some()
	}

	/// Persists every pending edit in the materialized tree.
	///
	/// Each edit is attempted once; rows written successfully are broadcast as updated even
	/// when others fail. Returns whether every edit was written.
	pub fn commit(&mut self) -> bool {
		let (root, ctx) = self.split();
		let report = root.persist_pending(ctx);

		for e in &report.failed {
			warn!(error = %e, "failed to persist pending edit");
		}

		self.notifier.notify(&ChangeSet::updated(report.persisted));

		report.failed.is_empty()
	}

	/// Re-reads a single cell from the backend, dropping any pending edit.
	pub fn reload(&mut self, index: &ModelIndex) -> bool {
		let result = self
			.query
			.columns()
			.default_position_for_display(index.column)
			.map_err(Error::from)
			.and_then(|column| {
				let generation = self.generation;
				let (root, ctx) = self.split();
				locate_mut(root, generation, index)?.reload_cell(ctx, index.row, column)
			});

		settle("reload", result).is_some()
	}

	pub fn try_insert_row(
		&mut self,
		parent: Option<&ModelIndex>,
		id: RowId,
		values: &[(String, CellValue)],
	) -> Result<()> {
		let generation = self.generation;
		let (root, ctx, notifier) = self.split_notifying();
		let owner = children_of_mut(root, ctx, generation, parent)?;

		ctx.backend
			.execute(&ctx.query.insert_row(owner.anchor(), &id, values)?)?;

		// The row is stored from here on, observers hear about it even if the re-fetch fails
		notifier.notify(&ChangeSet::added(vec![id]));

		owner.fetch_all(ctx).map(|_| ())
	}

	/// Inserts a row under `parent` (top level when `None`) and re-fetches that node.
	///
	/// `added` is broadcast once the row is written, a failed re-fetch after that still
	/// reports `false` but the row stays stored.
	pub fn insert_row(
		&mut self,
		parent: Option<&ModelIndex>,
		id: impl Into<RowId>,
		values: &[(String, CellValue)],
	) -> bool {
		settle("insert_row", self.try_insert_row(parent, id.into(), values)).is_some()
	}

	pub fn try_remove_rows(
		&mut self,
		row: usize,
		count: usize,
		parent: Option<&ModelIndex>,
	) -> Result<Vec<RowId>> {
		if count == 0 {
			return Ok(Vec::new());
		}

		let generation = self.generation;
		let (root, ctx, notifier) = self.split_notifying();
		let owner = children_of_mut(root, ctx, generation, parent)?;

		let ids = (row..row.saturating_add(count))
			.map(|position| {
				owner
					.row_identifier_at(position)
					.cloned()
					.ok_or(Error::RowNotFound(position))
			})
			.collect::<Result<Vec<_>>>()?;

		ctx.backend.execute(&ctx.query.delete_rows(&ids))?;

		for id in &ids {
			owner.remove_child(id);
		}
		notifier.notify(&ChangeSet::deleted(ids.clone()));

		owner.fetch_all(ctx)?;

		Ok(ids)
	}

	/// Deletes `count` rows starting at `row` under `parent`. Descendants are left alone.
	///
	/// `deleted` is broadcast once the rows are gone, even if the re-fetch that follows fails.
	pub fn remove_rows(&mut self, row: usize, count: usize, parent: Option<&ModelIndex>) -> bool {
		settle("remove_rows", self.try_remove_rows(row, count, parent)).is_some()
	}

	/// Cached identifier of the row behind `index`.
	#[must_use]
	pub fn row_identifier(&self, index: &ModelIndex) -> Option<RowId> {
		settle(
			"row_identifier",
			locate(&self.root, self.generation, index).and_then(|node| {
				node.row_identifier_at(index.row)
					.cloned()
					.ok_or(Error::RowNotFound(index.row))
			}),
		)
	}

	/// Parent of a row as stored in the backend, the sentinel for a NULL parent.
	pub fn try_lookup_parent(&self, id: &RowId) -> Result<RowId> {
		let query = self.query.select_parent(id);

		match self.backend.lookup(&query)? {
			None => Err(Error::IdentifierNotFound(id.clone())),
			Some(value) => Ok(value.to_row_id().unwrap_or_else(RowId::root)),
		}
	}

	#[must_use]
	pub fn lookup_parent(&self, id: &RowId) -> Option<RowId> {
		settle("lookup_parent", self.try_lookup_parent(id))
	}

	/// Replaces the display order with `(display position, default position)` pairs.
	pub fn set_column_order(&mut self, pairs: &[(usize, usize)]) -> Result<()> {
		self.query.columns_mut().set_display_order(pairs)?;
		self.config.display_order = pairs.to_vec();
		Ok(())
	}

	pub fn subscribe(&mut self, observer: impl FnMut(&ChangeSet) + 'static) -> SubscriptionId {
		self.notifier.subscribe(observer)
	}

	pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
		self.notifier.unsubscribe(id)
	}

	#[must_use]
	pub const fn root_node(&self) -> &NodeCache {
		&self.root
	}

	/// The node holding the children of `parent`, if it was materialized.
	#[must_use]
	pub fn node_for(&self, parent: Option<&ModelIndex>) -> Option<&NodeCache> {
		match parent {
			None => Some(&self.root),
			Some(parent) => {
				let owner = locate(&self.root, self.generation, parent).ok()?;
				owner.child(owner.row_identifier_at(parent.row)?)
			}
		}
	}

	#[must_use]
	pub const fn columns(&self) -> &ColumnMapper {
		self.query.columns()
	}

	#[must_use]
	pub const fn config(&self) -> &TreeConfig {
		&self.config
	}

	#[must_use]
	pub fn backend_stats(&self) -> BackendStats {
		self.backend.stats()
	}

	fn context(&self) -> FetchContext<'_> {
		FetchContext {
			backend: &self.backend,
			query: &self.query,
			sort: &self.sort,
			filters: &self.filters,
		}
	}

	fn split_notifying(&mut self) -> (&mut NodeCache, FetchContext<'_>, &mut ChangeNotifier) {
		let Self {
			backend,
			query,
			sort,
			filters,
			root,
			notifier,
			..
		} = self;

		(
			root,
			FetchContext {
				backend: &*backend,
				query: &*query,
				sort: &*sort,
				filters: &*filters,
			},
			notifier,
		)
	}

	fn split(&mut self) -> (&mut NodeCache, FetchContext<'_>) {
		let Self {
			backend,
			query,
			sort,
			filters,
			root,
			..
		} = self;

		(
			root,
			FetchContext {
				backend: &*backend,
				query: &*query,
				sort: &*sort,
				filters: &*filters,
			},
		)
	}
}

fn build_query(backend: &Backend<'_>, config: &TreeConfig) -> Result<QueryBuilder> {
	let backend_columns = backend.discover_columns(&config.table)?;
	if backend_columns.is_empty() {
		return Err(ConfigurationError::EmptySchema(config.table.clone()).into());
	}

	let mut columns = ColumnMapper::new(&backend_columns, &config.column_map)?;
	columns.set_display_order(&config.display_order)?;

	QueryBuilder::new(
		config.table.clone(),
		columns,
		&config.id_column,
		&config.parent_column,
	)
	.map_err(Into::into)
}

fn stale(index: &ModelIndex) -> Error {
	Error::StaleReference {
		node: index.path.last().cloned().unwrap_or_default(),
		generation: index.generation,
		epoch: index.epoch,
	}
}

/// Node holding `index`'s row, provided the row position is still valid for it.
fn locate<'n>(root: &'n NodeCache, generation: u64, index: &ModelIndex) -> Result<&'n NodeCache> {
	if index.generation != generation {
		return Err(stale(index));
	}

	root.descend(&index.path)
		.filter(|node| node.epoch() == index.epoch)
		.ok_or_else(|| stale(index))
}

fn locate_mut<'n>(
	root: &'n mut NodeCache,
	generation: u64,
	index: &ModelIndex,
) -> Result<&'n mut NodeCache> {
	if index.generation != generation {
		return Err(stale(index));
	}

	root.descend_mut(&index.path)
		.filter(|node| node.epoch() == index.epoch)
		.ok_or_else(|| stale(index))
}

/// Node holding the children of `parent`, materialized on demand.
fn children_of_mut<'n>(
	root: &'n mut NodeCache,
	ctx: FetchContext<'_>,
	generation: u64,
	parent: Option<&ModelIndex>,
) -> Result<&'n mut NodeCache> {
	match parent {
		None => Ok(root),
		Some(parent) => locate_mut(root, generation, parent)?.child_for(ctx, parent.row),
	}
}

/// Collapses an error into "no data here" at the navigation boundary.
fn settle<T>(operation: &'static str, result: Result<T>) -> Option<T> {
	match result {
		Ok(value) => Some(value),
		Err(
			e @ (Error::RowNotFound(_) | Error::ColumnNotFound(_) | Error::StaleReference { .. }),
		) => {
			debug!(operation, error = %e, "no data at this position");
			None
		}
		Err(e) => {
			warn!(operation, error = %e, "tree cache operation failed");
			None
		}
	}
}
