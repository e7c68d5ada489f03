//! Tree configuration

use crate::{
	error::{Error, Result},
	value::RowId,
};

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

/// A single `code name -> backend column` alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlias {
	pub code: String,
	pub backend: String,
}

/// Everything a [`TreeCache`](crate::TreeCache) needs to know about the table it presents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
	/// Backend table holding the rows
	pub table: String,

	/// Code name of the row-id column
	#[serde(default = "default_id_column")]
	pub id_column: String,

	/// Code name of the parent-id column
	#[serde(default = "default_parent_column")]
	pub parent_column: String,

	/// Anchor of the root node, the sentinel shows every row without a parent
	#[serde(default)]
	pub root: RowId,

	/// Explicit column aliases, empty means every backend column under its own name
	#[serde(default)]
	pub column_map: Vec<ColumnAlias>,

	/// `(display position, default position)` pairs, empty means identity
	#[serde(default)]
	pub display_order: Vec<(usize, usize)>,
}

fn default_id_column() -> String {
	"id".to_string()
}

fn default_parent_column() -> String {
	"parentId".to_string()
}

impl TreeConfig {
	pub fn new(table: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			id_column: default_id_column(),
			parent_column: default_parent_column(),
			root: RowId::root(),
			column_map: Vec::new(),
			display_order: Vec::new(),
		}
	}

	/// Load a configuration from a JSON file
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();

		let json = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
			path: path.into(),
			source,
		})?;

		let config = Self::from_json_str(&json)?;
		info!(path = %path.display(), table = %config.table, "loaded tree config");

		Ok(config)
	}

	pub fn from_json_str(json: &str) -> Result<Self> {
		serde_json::from_str(json).map_err(Into::into)
	}

	#[must_use]
	pub fn with_column(mut self, code: impl Into<String>, backend: impl Into<String>) -> Self {
		self.column_map.push(ColumnAlias {
			code: code.into(),
			backend: backend.into(),
		});
		self
	}

	#[must_use]
	pub fn with_id_columns(
		mut self,
		id_column: impl Into<String>,
		parent_column: impl Into<String>,
	) -> Self {
		self.id_column = id_column.into();
		self.parent_column = parent_column.into();
		self
	}

	#[must_use]
	pub fn with_root(mut self, root: impl Into<RowId>) -> Self {
		self.root = root.into();
		self
	}

	#[must_use]
	pub fn with_display_order(mut self, order: Vec<(usize, usize)>) -> Self {
		self.display_order = order;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn json_defaults_match_builder() {
		let config = TreeConfig::from_json_str(r#"{ "table": "testTable" }"#).unwrap();

		assert_eq!(config, TreeConfig::new("testTable"));
		assert!(config.root.is_root());
	}

	#[test]
	fn json_column_map() {
		let config = TreeConfig::from_json_str(
			r#"{
				"table": "testTable",
				"root": "abc",
				"column_map": [
					{ "code": "id", "backend": "guid" },
					{ "code": "parentId", "backend": "parent_guid" }
				],
				"display_order": [[0, 1], [1, 0]]
			}"#,
		)
		.unwrap();

		assert_eq!(config.root, RowId::new("abc"));
		assert_eq!(
			config,
			TreeConfig::new("testTable")
				.with_root("abc")
				.with_column("id", "guid")
				.with_column("parentId", "parent_guid")
				.with_display_order(vec![(0, 1), (1, 0)])
		);
	}

	#[test]
	fn load_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tree.json");
		fs::write(&path, r#"{ "table": "items", "id_column": "guid" }"#).unwrap();

		let config = TreeConfig::load(&path).unwrap();
		assert_eq!(config.id_column, "guid");
		assert_eq!(config.parent_column, "parentId");

		assert!(matches!(
			TreeConfig::load(dir.path().join("missing.json")),
			Err(Error::ConfigIo { .. })
		));
	}
}
