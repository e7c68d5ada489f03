use crate::{
	error::{Error, Result},
	query::{QueryBuilder, SqlFragment},
	value::CellValue,
};

use std::cell::Cell;

use rusqlite::{params_from_iter, Connection, Statement};
use tracing::trace;

/// Round-trips issued against the backend since the [`Backend`] was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
	/// Full node fetches
	pub fetches: u64,
	/// `COUNT(1)` queries
	pub counts: u64,
	/// Single value lookups (positional identifiers, parents, cell reloads)
	pub lookups: u64,
	/// Updates, inserts and deletes
	pub writes: u64,
}

/// Runs queries over a connection owned by the caller.
///
/// Every call is one synchronous attempt, nothing is retried.
#[derive(Debug)]
pub struct Backend<'conn> {
	conn: &'conn Connection,
	stats: Cell<BackendStats>,
}

impl<'conn> Backend<'conn> {
	#[must_use]
	pub fn new(conn: &'conn Connection) -> Self {
		Self {
			conn,
			stats: Cell::default(),
		}
	}

	#[must_use]
	pub const fn connection(&self) -> &'conn Connection {
		self.conn
	}

	#[must_use]
	pub fn stats(&self) -> BackendStats {
		self.stats.get()
	}

	/// Column names of `table`, in the order `SELECT *` returns them.
	pub fn discover_columns(&self, table: &str) -> Result<Vec<String>> {
		let query = QueryBuilder::schema_discovery(table);

		Ok(self
			.rows(&query)?
			.into_iter()
			.filter_map(|row| row.into_iter().next())
			.map(|name| name.to_string())
			.collect())
	}

	pub fn fetch_rows(&self, query: &SqlFragment) -> Result<Vec<Vec<CellValue>>> {
		let rows = self.rows(query)?;
		self.bump(|stats| stats.fetches += 1);
		Ok(rows)
	}

	pub fn count(&self, query: &SqlFragment) -> Result<usize> {
		let mut stmt = self.prepare(&query.sql)?;

		let count = stmt
			.query_row(params_from_iter(&query.params), |row| row.get::<_, i64>(0))
			.map_err(|e| Error::step(&query.sql, e))?;

		self.bump(|stats| stats.counts += 1);

		Ok(usize::try_from(count).unwrap_or_default())
	}

	/// First column of the first row, `None` when the query returns nothing.
	pub fn lookup(&self, query: &SqlFragment) -> Result<Option<CellValue>> {
		let value = self
			.rows(query)?
			.into_iter()
			.next()
			.and_then(|row| row.into_iter().next());

		self.bump(|stats| stats.lookups += 1);

		Ok(value)
	}

	/// Runs a write statement, returning the number of affected rows.
	pub fn execute(&self, query: &SqlFragment) -> Result<usize> {
		let mut stmt = self.prepare(&query.sql)?;

		let changed = stmt
			.execute(params_from_iter(&query.params))
			.map_err(|e| Error::step(&query.sql, e))?;

		self.bump(|stats| stats.writes += 1);

		Ok(changed)
	}

	fn rows(&self, query: &SqlFragment) -> Result<Vec<Vec<CellValue>>> {
		let mut stmt = self.prepare(&query.sql)?;
		let column_count = stmt.column_count();

		let mut rows = stmt
			.query(params_from_iter(&query.params))
			.map_err(|e| Error::prepare(&query.sql, e))?;

		let mut fetched = Vec::new();
		while let Some(row) = rows.next().map_err(|e| Error::step(&query.sql, e))? {
			let cells = (0..column_count)
				.map(|column| row.get_ref(column).map(CellValue::from))
				.collect::<rusqlite::Result<Vec<_>>>()
				.map_err(|e| Error::step(&query.sql, e))?;

			fetched.push(cells);
		}

		Ok(fetched)
	}

	fn prepare(&self, sql: &str) -> Result<Statement<'conn>> {
		trace!(%sql, "preparing query");
		self.conn.prepare(sql).map_err(|e| Error::prepare(sql, e))
	}

	fn bump(&self, update: impl FnOnce(&mut BackendStats)) {
		let mut stats = self.stats.get();
		update(&mut stats);
		self.stats.set(stats);
	}
}
