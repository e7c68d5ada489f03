use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// Anchor meaning "no parent": rows whose parent column is NULL.
pub const ROOT_SENTINEL: &str = "*";

/// Backend primary-key value of a single row.
///
/// The identifier is opaque to the cache, it is only ever compared, hashed and bound back
/// into queries. The reserved [`ROOT_SENTINEL`] value never names a real row, queries
/// anchored on it are translated to an `IS NULL` predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn root() -> Self {
		Self(ROOT_SENTINEL.to_string())
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.0 == ROOT_SENTINEL
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for RowId {
	fn default() -> Self {
		Self::root()
	}
}

impl fmt::Display for RowId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RowId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for RowId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl ToSql for RowId {
	fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
		Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.0.as_bytes())))
	}
}

/// A single cached cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
	#[default]
	Null,
	Integer(i64),
	Real(f64),
	Text(String),
}

impl CellValue {
	#[must_use]
	pub const fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Text(text) => Some(text),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_integer(&self) -> Option<i64> {
		match self {
			Self::Integer(value) => Some(*value),
			_ => None,
		}
	}

	/// Interprets the cell as a row identifier, `None` for NULL.
	#[must_use]
	pub fn to_row_id(&self) -> Option<RowId> {
		match self {
			Self::Null => None,
			Self::Integer(value) => Some(RowId(value.to_string())),
			Self::Real(value) => Some(RowId(value.to_string())),
			Self::Text(text) => Some(RowId(text.clone())),
		}
	}
}

impl fmt::Display for CellValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => Ok(()),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Real(value) => write!(f, "{value}"),
			Self::Text(text) => f.write_str(text),
		}
	}
}

impl From<ValueRef<'_>> for CellValue {
	fn from(value: ValueRef<'_>) -> Self {
		match value {
			ValueRef::Null => Self::Null,
			ValueRef::Integer(value) => Self::Integer(value),
			ValueRef::Real(value) => Self::Real(value),
			// Blobs are surfaced as text, the cache has no binary representation
			ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
				Self::Text(String::from_utf8_lossy(bytes).into_owned())
			}
		}
	}
}

impl From<&str> for CellValue {
	fn from(text: &str) -> Self {
		Self::Text(text.to_string())
	}
}

impl From<String> for CellValue {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<i64> for CellValue {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}

impl From<f64> for CellValue {
	fn from(value: f64) -> Self {
		Self::Real(value)
	}
}

impl From<&RowId> for CellValue {
	fn from(id: &RowId) -> Self {
		Self::Text(id.0.clone())
	}
}

impl ToSql for CellValue {
	fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
		Ok(match self {
			Self::Null => ToSqlOutput::Owned(Value::Null),
			Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
			Self::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
			Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sentinel_is_the_default_anchor() {
		assert!(RowId::default().is_root());
		assert!(!RowId::new("a1").is_root());
		assert_eq!(RowId::root().as_str(), ROOT_SENTINEL);
	}

	#[test]
	fn cells_convert_to_identifiers() {
		assert_eq!(CellValue::Null.to_row_id(), None);
		assert_eq!(CellValue::Integer(42).to_row_id(), Some(RowId::new("42")));
		assert_eq!(
			CellValue::from("guid-1").to_row_id(),
			Some(RowId::new("guid-1"))
		);
	}

	#[test]
	fn blobs_are_read_as_text() {
		let cell = CellValue::from(ValueRef::Blob(b"raw"));
		assert_eq!(cell.as_text(), Some("raw"));
		assert_eq!(CellValue::Null.to_string(), "");
	}
}
