//! SQL generation for node fetches, counts, lookups and writes.
//!
//! Values (anchors, filter operands, cell contents, offsets) are always bound as
//! parameters. Table and column names can't be bound, they are only ever taken from the
//! [`ColumnMapper`] (which only knows discovered backend columns) and quoted.

use crate::{
	column::ColumnMapper,
	error::ConfigurationError,
	value::{CellValue, RowId},
};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::trace;

#[derive(
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	Hash,
	Serialize,
	Deserialize,
	EnumString,
	Display,
	AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SortDirection {
	#[default]
	#[strum(serialize = "ASC")]
	#[serde(rename = "ASC")]
	Ascending,
	#[strum(serialize = "DESC")]
	#[serde(rename = "DESC")]
	Descending,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum FilterCondition {
	/// `column = value`
	#[strum(serialize = "=")]
	#[serde(rename = "=")]
	Exact,
	/// `column LIKE '%value%'`
	#[strum(serialize = "match")]
	#[serde(rename = "match")]
	Substring,
	/// Reserved, contributes no predicate
	#[strum(serialize = "auto")]
	#[serde(rename = "auto")]
	Auto,
}

/// Ordered `(code name, direction)` pairs, first entry is the primary sort key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(Vec<(String, SortDirection)>);

impl SortSpec {
	#[must_use]
	pub const fn new() -> Self {
		Self(Vec::new())
	}

	/// Makes `code` the primary key, dropping any previous entry for it.
	pub fn push_front(&mut self, code: impl Into<String>, direction: SortDirection) {
		let code = code.into();
		self.0.retain(|(existing, _)| *existing != code);
		self.0.insert(0, (code, direction));
	}

	/// Moves each entry to the front in list order, so the last entry becomes the primary
	/// key. Keys already present are moved rather than duplicated.
	pub fn apply(&mut self, entries: impl IntoIterator<Item = (String, SortDirection)>) {
		for (code, direction) in entries {
			self.push_front(code, direction);
		}
	}

	#[must_use]
	pub fn entries(&self) -> &[(String, SortDirection)] {
		&self.0
	}

	#[must_use]
	pub fn direction_of(&self, code: &str) -> Option<SortDirection> {
		self.0
			.iter()
			.find_map(|(existing, direction)| (existing == code).then_some(*direction))
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn clear(&mut self) {
		self.0.clear();
	}
}

/// A single `(backend column, value, condition)` predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
	pub column: String,
	pub value: String,
	pub condition: FilterCondition,
}

impl Filter {
	pub fn new(
		column: impl Into<String>,
		value: impl Into<String>,
		condition: FilterCondition,
	) -> Self {
		Self {
			column: column.into(),
			value: value.into(),
			condition,
		}
	}

	pub fn exact(column: impl Into<String>, value: impl Into<String>) -> Self {
		Self::new(column, value, FilterCondition::Exact)
	}

	pub fn substring(column: impl Into<String>, value: impl Into<String>) -> Self {
		Self::new(column, value, FilterCondition::Substring)
	}
}

/// Filters combined with `AND`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec(Vec<Filter>);

impl FilterSpec {
	#[must_use]
	pub const fn new() -> Self {
		Self(Vec::new())
	}

	#[must_use]
	pub fn filters(&self) -> &[Filter] {
		&self.0
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<Filter>> for FilterSpec {
	fn from(filters: Vec<Filter>) -> Self {
		Self(filters)
	}
}

impl FromIterator<Filter> for FilterSpec {
	fn from_iter<T: IntoIterator<Item = Filter>>(iter: T) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// SQL text plus the values bound to its `?` placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
	pub sql: String,
	pub params: Vec<CellValue>,
}

impl SqlFragment {
	fn new(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			params: Vec::new(),
		}
	}

	fn bind(mut self, value: impl Into<CellValue>) -> Self {
		self.params.push(value.into());
		self
	}
}

/// Quotes a table or column name for interpolation.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_like(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len() + 2);
	escaped.push('%');
	for c in value.chars() {
		if matches!(c, '%' | '_' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped.push('%');
	escaped
}

fn offset_param(position: usize) -> CellValue {
	CellValue::Integer(i64::try_from(position).unwrap_or(i64::MAX))
}

/// Builds every statement the cache issues against one table.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
	table: String,
	columns: ColumnMapper,
	id_column: String,
	parent_column: String,
	id_position: usize,
}

impl QueryBuilder {
	/// `id_code` and `parent_code` are the code names of the row-id and parent-id columns.
	pub fn new(
		table: impl Into<String>,
		columns: ColumnMapper,
		id_code: &str,
		parent_code: &str,
	) -> Result<Self, ConfigurationError> {
		let id_column = columns.real_name(id_code)?.to_string();
		let parent_column = columns.real_name(parent_code)?.to_string();
		let id_position = columns.default_position(id_code)?;

		Ok(Self {
			table: table.into(),
			columns,
			id_column,
			parent_column,
			id_position,
		})
	}

	/// `SELECT name FROM pragma_table_info(?)` for the given table.
	#[must_use]
	pub fn schema_discovery(table: &str) -> SqlFragment {
		SqlFragment::new("SELECT name FROM pragma_table_info(?)").bind(table)
	}

	#[must_use]
	pub fn table(&self) -> &str {
		&self.table
	}

	#[must_use]
	pub const fn columns(&self) -> &ColumnMapper {
		&self.columns
	}

	pub fn columns_mut(&mut self) -> &mut ColumnMapper {
		&mut self.columns
	}

	/// Backend name of the row-id column.
	#[must_use]
	pub fn id_column(&self) -> &str {
		&self.id_column
	}

	/// Backend name of the parent-id column.
	#[must_use]
	pub fn parent_column(&self) -> &str {
		&self.parent_column
	}

	/// Default position of the row-id column inside a fetched row.
	#[must_use]
	pub const fn id_position(&self) -> usize {
		self.id_position
	}

	/// Predicate selecting the rows anchored at `anchor` that pass every filter.
	///
	/// The returned SQL has no leading `WHERE`.
	pub fn build_where(
		&self,
		anchor: &RowId,
		filters: &FilterSpec,
	) -> Result<SqlFragment, ConfigurationError> {
		let parent = quote_identifier(&self.parent_column);

		let mut fragment = if anchor.is_root() {
			SqlFragment::new(format!("{parent} IS NULL"))
		} else {
			SqlFragment::new(format!("{parent} = ?")).bind(anchor)
		};

		for Filter {
			column,
			value,
			condition,
		} in filters.filters()
		{
			if !self.columns.has_backend_column(column) {
				return Err(ConfigurationError::UnknownBackendColumn(column.clone()));
			}

			let column = quote_identifier(column);
			match condition {
				FilterCondition::Exact => {
					fragment.sql.push_str(&format!(" AND {column} = ?"));
					fragment.params.push(CellValue::from(value.as_str()));
				}
				FilterCondition::Substring => {
					fragment
						.sql
						.push_str(&format!(" AND {column} LIKE ? ESCAPE '\\'"));
					fragment.params.push(CellValue::Text(escape_like(value)));
				}
				FilterCondition::Auto => {
					trace!(%column, "ignoring filter with reserved `auto` condition");
				}
			}
		}

		Ok(fragment)
	}

	/// `ORDER BY` clause for a [`SortSpec`], empty when there is nothing to sort by.
	pub fn build_order_by(&self, sort: &SortSpec) -> Result<String, ConfigurationError> {
		if sort.is_empty() {
			return Ok(String::new());
		}

		let terms = sort
			.entries()
			.iter()
			.map(|(code, direction)| {
				self.columns
					.real_name(code)
					.map(|column| format!("{} {direction}", quote_identifier(column)))
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(format!("ORDER BY {}", terms.join(", ")))
	}

	/// Full fetch of every row anchored at `anchor`.
	pub fn select_rows(
		&self,
		anchor: &RowId,
		filters: &FilterSpec,
		sort: &SortSpec,
	) -> Result<SqlFragment, ConfigurationError> {
		let SqlFragment { sql, params } = self.build_where(anchor, filters)?;
		let order_by = self.build_order_by(sort)?;

		Ok(SqlFragment {
			sql: join_clauses(&[
				&format!("SELECT * FROM {}", quote_identifier(&self.table)),
				&format!("WHERE {sql}"),
				&order_by,
			]),
			params,
		})
	}

	pub fn count_rows(
		&self,
		anchor: &RowId,
		filters: &FilterSpec,
	) -> Result<SqlFragment, ConfigurationError> {
		let SqlFragment { sql, params } = self.build_where(anchor, filters)?;

		Ok(SqlFragment {
			sql: format!(
				"SELECT COUNT(1) FROM {} WHERE {sql}",
				quote_identifier(&self.table)
			),
			params,
		})
	}

	/// Identifier of the row at `position` under `anchor`, in the current sort order.
	pub fn select_identifier_at(
		&self,
		anchor: &RowId,
		filters: &FilterSpec,
		sort: &SortSpec,
		position: usize,
	) -> Result<SqlFragment, ConfigurationError> {
		let SqlFragment { sql, params } = self.build_where(anchor, filters)?;
		let order_by = self.build_order_by(sort)?;

		Ok(SqlFragment {
			sql: join_clauses(&[
				&format!(
					"SELECT {} FROM {}",
					quote_identifier(&self.id_column),
					quote_identifier(&self.table)
				),
				&format!("WHERE {sql}"),
				&order_by,
				"LIMIT ?, 1",
			]),
			params,
		}
		.bind(offset_param(position)))
	}

	/// Writes one cell of the row identified by `id`.
	pub fn update_cell(
		&self,
		default_position: usize,
		value: &CellValue,
		id: &RowId,
	) -> Result<SqlFragment, ConfigurationError> {
		let column = self.backend_column_at(default_position)?;

		Ok(SqlFragment::new(format!(
			"UPDATE {} SET {} = ? WHERE {} = ?",
			quote_identifier(&self.table),
			quote_identifier(column),
			quote_identifier(&self.id_column)
		))
		.bind(value.clone())
		.bind(id))
	}

	pub fn select_cell(
		&self,
		default_position: usize,
		id: &RowId,
	) -> Result<SqlFragment, ConfigurationError> {
		let column = self.backend_column_at(default_position)?;

		Ok(SqlFragment::new(format!(
			"SELECT {} FROM {} WHERE {} = ?",
			quote_identifier(column),
			quote_identifier(&self.table),
			quote_identifier(&self.id_column)
		))
		.bind(id))
	}

	#[must_use]
	pub fn select_parent(&self, id: &RowId) -> SqlFragment {
		SqlFragment::new(format!(
			"SELECT {} FROM {} WHERE {} = ?",
			quote_identifier(&self.parent_column),
			quote_identifier(&self.table),
			quote_identifier(&self.id_column)
		))
		.bind(id)
	}

	#[must_use]
	pub fn delete_rows(&self, ids: &[RowId]) -> SqlFragment {
		let placeholders = vec!["?"; ids.len()].join(", ");

		SqlFragment {
			sql: format!(
				"DELETE FROM {} WHERE {} IN ({placeholders})",
				quote_identifier(&self.table),
				quote_identifier(&self.id_column)
			),
			params: ids.iter().map(CellValue::from).collect(),
		}
	}

	/// Inserts a row under `parent`, the sentinel parent stores NULL.
	///
	/// `values` are keyed by code name. The id and parent columns always come from `id`
	/// and `parent`, entries naming them are skipped.
	pub fn insert_row(
		&self,
		parent: &RowId,
		id: &RowId,
		values: &[(String, CellValue)],
	) -> Result<SqlFragment, ConfigurationError> {
		let mut columns = vec![
			quote_identifier(&self.id_column),
			quote_identifier(&self.parent_column),
		];
		let mut params = vec![
			CellValue::from(id),
			if parent.is_root() {
				CellValue::Null
			} else {
				CellValue::from(parent)
			},
		];

		for (code, value) in values {
			let column = self.columns.real_name(code)?;
			if column == self.id_column || column == self.parent_column {
				trace!(%code, "skipping value for a structural column");
				continue;
			}

			columns.push(quote_identifier(column));
			params.push(value.clone());
		}

		Ok(SqlFragment {
			sql: format!(
				"INSERT INTO {} ({}) VALUES ({})",
				quote_identifier(&self.table),
				columns.join(", "),
				vec!["?"; params.len()].join(", ")
			),
			params,
		})
	}

	fn backend_column_at(&self, default_position: usize) -> Result<&str, ConfigurationError> {
		self.columns
			.backend_at(default_position)
			.ok_or(ConfigurationError::UnknownPosition(default_position))
	}
}

fn join_clauses(clauses: &[&str]) -> String {
	clauses
		.iter()
		.filter(|clause| !clause.is_empty())
		.copied()
		.collect::<Vec<_>>()
		.join(" ")
}
