//! Column name and position translation

use crate::{config::ColumnAlias, error::ConfigurationError};

use std::{borrow::Borrow, collections::HashMap, hash::Hash};

/// A one-to-one map that can be queried from either side.
///
/// Every public insertion is checked against both sides, so the bijection holds after any
/// successful mutation.
#[derive(Debug, Clone)]
pub struct BiMap<L, R> {
	left: HashMap<L, R>,
	right: HashMap<R, L>,
}

impl<L, R> Default for BiMap<L, R> {
	fn default() -> Self {
		Self {
			left: HashMap::new(),
			right: HashMap::new(),
		}
	}
}

impl<L, R> BiMap<L, R>
where
	L: Eq + Hash + Clone,
	R: Eq + Hash + Clone,
{
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a map from pairs whose sides are already known to be unique.
	fn from_pairs_unchecked(pairs: impl IntoIterator<Item = (L, R)>) -> Self {
		let mut map = Self::new();
		for (left, right) in pairs {
			map.left.insert(left.clone(), right.clone());
			map.right.insert(right, left);
		}
		map
	}

	/// Inserts the pair, handing it back if either side is already mapped.
	pub fn insert(&mut self, left: L, right: R) -> Result<(), (L, R)> {
		if self.left.contains_key(&left) || self.right.contains_key(&right) {
			return Err((left, right));
		}

		self.left.insert(left.clone(), right.clone());
		self.right.insert(right, left);

		Ok(())
	}

	pub fn get_by_left<Q>(&self, left: &Q) -> Option<&R>
	where
		L: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.left.get(left)
	}

	pub fn get_by_right<Q>(&self, right: &Q) -> Option<&L>
	where
		R: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.right.get(right)
	}

	pub fn contains_left<Q>(&self, left: &Q) -> bool
	where
		L: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.left.contains_key(left)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.left.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.left.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&L, &R)> {
		self.left.iter()
	}
}

/// Translates between code names, backend column names and column positions.
///
/// A column has a *default position* (its index in the backend's discovery order, which is
/// also its index in every fetched row) and a *display position* (where a view shows it).
/// Code names are the stable names callers use, independent from both.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
	/// code name <-> backend name
	names: BiMap<String, String>,
	/// backend name <-> default position
	columns: BiMap<String, usize>,
	/// default position <-> display position
	order: BiMap<usize, usize>,
}

impl ColumnMapper {
	/// Builds the mapper over the discovered backend columns.
	///
	/// An empty alias list registers every backend column under its own name.
	pub fn new(
		backend_columns: &[String],
		aliases: &[ColumnAlias],
	) -> Result<Self, ConfigurationError> {
		let mut columns = BiMap::new();
		for (position, column) in backend_columns.iter().enumerate() {
			columns
				.insert(column.clone(), position)
				.map_err(|(backend, _)| ConfigurationError::AmbiguousColumnMap {
					code: backend.clone(),
					backend,
				})?;
		}

		let mut names = BiMap::new();
		if aliases.is_empty() {
			for column in backend_columns {
				names
					.insert(column.clone(), column.clone())
					.map_err(|(code, backend)| ConfigurationError::AmbiguousColumnMap { code, backend })?;
			}
		} else {
			for ColumnAlias { code, backend } in aliases {
				if !columns.contains_left(backend.as_str()) {
					return Err(ConfigurationError::UnknownBackendColumn(backend.clone()));
				}

				names
					.insert(code.clone(), backend.clone())
					.map_err(|(code, backend)| ConfigurationError::AmbiguousColumnMap { code, backend })?;
			}
		}

		Ok(Self {
			names,
			order: identity_order(columns.len()),
			columns,
		})
	}

	/// Backend column for a code name.
	pub fn real_name(&self, code: &str) -> Result<&str, ConfigurationError> {
		self.names
			.get_by_left(code)
			.map(String::as_str)
			.ok_or_else(|| ConfigurationError::UnknownCodeName(code.to_string()))
	}

	/// Code name registered for a backend column, if any.
	#[must_use]
	pub fn code_name(&self, backend: &str) -> Option<&str> {
		self.names.get_by_right(backend).map(String::as_str)
	}

	pub fn default_position(&self, code: &str) -> Result<usize, ConfigurationError> {
		let backend = self.real_name(code)?;

		self.columns
			.get_by_left(backend)
			.copied()
			.ok_or_else(|| ConfigurationError::UnknownBackendColumn(backend.to_string()))
	}

	/// Code name of the column at a default position.
	pub fn code_at(&self, default_position: usize) -> Result<&str, ConfigurationError> {
		self.backend_at(default_position)
			.and_then(|backend| self.code_name(backend))
			.ok_or(ConfigurationError::UnknownPosition(default_position))
	}

	#[must_use]
	pub fn backend_at(&self, default_position: usize) -> Option<&str> {
		self.columns
			.get_by_right(&default_position)
			.map(String::as_str)
	}

	pub fn display_position(&self, default_position: usize) -> Result<usize, ConfigurationError> {
		self.order
			.get_by_left(&default_position)
			.copied()
			.ok_or(ConfigurationError::UnknownPosition(default_position))
	}

	pub fn default_position_for_display(
		&self,
		display_position: usize,
	) -> Result<usize, ConfigurationError> {
		self.order
			.get_by_right(&display_position)
			.copied()
			.ok_or(ConfigurationError::UnknownPosition(display_position))
	}

	/// Replaces the display order with `(display position, default position)` pairs.
	///
	/// The pairs must form a permutation of every column, an empty slice restores the
	/// identity order. On error the previous order is kept.
	pub fn set_display_order(&mut self, pairs: &[(usize, usize)]) -> Result<(), ConfigurationError> {
		let expected = self.column_count();

		if pairs.is_empty() {
			self.order = identity_order(expected);
			return Ok(());
		}

		if pairs.len() != expected {
			return Err(ConfigurationError::InvalidDisplayOrder { expected });
		}

		let mut order = BiMap::new();
		for &(display, default) in pairs {
			if display >= expected || default >= expected {
				return Err(ConfigurationError::InvalidDisplayOrder { expected });
			}

			order
				.insert(default, display)
				.map_err(|_| ConfigurationError::InvalidDisplayOrder { expected })?;
		}

		self.order = order;

		Ok(())
	}

	#[must_use]
	pub fn column_count(&self) -> usize {
		self.columns.len()
	}

	#[must_use]
	pub fn has_backend_column(&self, backend: &str) -> bool {
		self.columns.contains_left(backend)
	}

	/// Header for a display position: the code name, or the backend name for columns
	/// left out of an explicit map.
	#[must_use]
	pub fn header(&self, display_position: usize) -> Option<&str> {
		let default_position = self.default_position_for_display(display_position).ok()?;

		self.code_at(default_position)
			.ok()
			.or_else(|| self.backend_at(default_position))
	}
}

fn identity_order(count: usize) -> BiMap<usize, usize> {
	BiMap::from_pairs_unchecked((0..count).map(|position| (position, position)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn backend() -> Vec<String> {
		["guid", "parent_guid", "name", "value"]
			.into_iter()
			.map(String::from)
			.collect()
	}

	fn alias(code: &str, backend: &str) -> ColumnAlias {
		ColumnAlias {
			code: code.to_string(),
			backend: backend.to_string(),
		}
	}

	#[test]
	fn bimap_rejects_collisions() {
		let mut map = BiMap::new();
		map.insert("a", 1).unwrap();

		assert_eq!(map.insert("a", 2), Err(("a", 2)));
		assert_eq!(map.insert("b", 1), Err(("b", 1)));
		assert_eq!(map.len(), 1);
		assert_eq!(map.get_by_right(&1), Some(&"a"));
	}

	#[test]
	fn empty_map_is_identity() {
		let mapper = ColumnMapper::new(&backend(), &[]).unwrap();

		assert_eq!(mapper.column_count(), 4);
		for (position, column) in backend().iter().enumerate() {
			assert_eq!(mapper.real_name(column).unwrap(), column);
			assert_eq!(mapper.default_position(column).unwrap(), position);
			assert_eq!(mapper.display_position(position).unwrap(), position);
		}
	}

	#[test]
	fn explicit_map_has_no_silent_defaults() {
		let mapper = ColumnMapper::new(
			&backend(),
			&[alias("id", "guid"), alias("parentId", "parent_guid")],
		)
		.unwrap();

		assert_eq!(mapper.real_name("id").unwrap(), "guid");
		assert_eq!(mapper.default_position("parentId").unwrap(), 1);
		assert_eq!(
			mapper.real_name("name"),
			Err(ConfigurationError::UnknownCodeName("name".to_string()))
		);
		assert_eq!(mapper.code_at(2), Err(ConfigurationError::UnknownPosition(2)));
		assert_eq!(mapper.header(0), Some("id"));
		assert_eq!(mapper.header(2), Some("name"));
	}

	#[test]
	fn ambiguous_maps_are_rejected() {
		assert!(matches!(
			ColumnMapper::new(&backend(), &[alias("id", "guid"), alias("id", "name")]),
			Err(ConfigurationError::AmbiguousColumnMap { .. })
		));
		assert!(matches!(
			ColumnMapper::new(&backend(), &[alias("id", "guid"), alias("key", "guid")]),
			Err(ConfigurationError::AmbiguousColumnMap { .. })
		));
		assert_eq!(
			ColumnMapper::new(&backend(), &[alias("id", "uuid")]).unwrap_err(),
			ConfigurationError::UnknownBackendColumn("uuid".to_string())
		);
	}

	#[test]
	fn display_order_is_a_permutation() {
		let mut mapper = ColumnMapper::new(&backend(), &[]).unwrap();

		mapper
			.set_display_order(&[(0, 2), (1, 3), (2, 0), (3, 1)])
			.unwrap();
		assert_eq!(mapper.default_position_for_display(0).unwrap(), 2);
		assert_eq!(mapper.display_position(0).unwrap(), 2);
		assert_eq!(mapper.header(0), Some("name"));

		// duplicate display slot, previous order must survive
		assert_eq!(
			mapper.set_display_order(&[(0, 0), (0, 1), (2, 2), (3, 3)]),
			Err(ConfigurationError::InvalidDisplayOrder { expected: 4 })
		);
		assert_eq!(mapper.default_position_for_display(0).unwrap(), 2);

		assert!(mapper.set_display_order(&[(0, 0)]).is_err());

		mapper.set_display_order(&[]).unwrap();
		assert_eq!(mapper.default_position_for_display(0).unwrap(), 0);
	}

	#[test]
	fn identity_order_maps_every_position_to_itself() {
		let order = identity_order(4);

		assert_eq!(order.len(), 4);
		for position in 0..4 {
			assert_eq!(order.get_by_left(&position), Some(&position));
			assert_eq!(order.get_by_right(&position), Some(&position));
		}
		assert!(identity_order(0).is_empty());
	}
}
