use crate::value::RowId;

use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),

	#[error("failed to prepare query: <sql='{sql}'>: {source}")]
	QueryPrepare {
		sql: String,
		#[source]
		source: rusqlite::Error,
	},
	#[error("query failed while stepping through results: <sql='{sql}'>: {source}")]
	QueryStep {
		sql: String,
		#[source]
		source: rusqlite::Error,
	},

	#[error("row not found: <position={0}>")]
	RowNotFound(usize),
	#[error("column not found: <column={0}>")]
	ColumnNotFound(usize),
	#[error("identifier not found in cache: <id='{0}'>")]
	IdentifierNotFound(RowId),
	#[error("stale reference: <node='{node}', generation={generation}, epoch={epoch}>")]
	StaleReference {
		node: RowId,
		generation: u64,
		epoch: u64,
	},

	#[error("failed to read tree config: <path='{}'>: {source}", .path.display())]
	ConfigIo {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse tree config: {0}")]
	ConfigParse(#[from] serde_json::Error),
}

/// Failures caused by a column map or display order that cannot be honored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
	#[error("column code name was never registered: <code_name='{0}'>")]
	UnknownCodeName(String),
	#[error("backend column does not exist: <column='{0}'>")]
	UnknownBackendColumn(String),
	#[error("no column registered at position: <position={0}>")]
	UnknownPosition(usize),
	#[error("ambiguous column map: <code_name='{code}', backend='{backend}'>")]
	AmbiguousColumnMap { code: String, backend: String },
	#[error("table has no columns or does not exist: <table='{0}'>")]
	EmptySchema(String),
	#[error("display order is not a permutation of {expected} columns")]
	InvalidDisplayOrder { expected: usize },
}

impl Error {
	pub(crate) fn prepare(sql: &str, source: rusqlite::Error) -> Self {
		Self::QueryPrepare {
			sql: sql.to_string(),
			source,
		}
	}

	pub(crate) fn step(sql: &str, source: rusqlite::Error) -> Self {
		Self::QueryStep {
			sql: sql.to_string(),
			source,
		}
	}
}
