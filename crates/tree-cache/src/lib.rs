//!
//! # Tree Cache
//!
//! Lazy, hierarchical row cache over a single SQLite table whose rows link to their parent
//! through a parent-id column.
//!
//! The cache only talks to the database when asked for rows it hasn't seen yet: the root node
//! is fetched on configuration and every other node is materialized the first time a view
//! navigates into it. Column names are translated between the names used by the application
//! and the ones stored in the table, and an optional display order reshuffles columns for
//! presentation without touching the queries.
//!
//! ## Basic example
//!
//! ```
//! use rusqlite::Connection;
//! use sd_tree_cache::{CellValue, TreeCache, TreeConfig};
//!
//! let conn = Connection::open_in_memory()?;
//! conn.execute_batch(
//!     "CREATE TABLE items (id TEXT PRIMARY KEY, parentId TEXT, name TEXT);
//!      INSERT INTO items VALUES ('a', NULL, 'documents'), ('b', 'a', 'notes.txt');",
//! )?;
//!
//! let mut tree = TreeCache::configure(&conn, TreeConfig::new("items"))?;
//! assert_eq!(tree.row_count(None), 1);
//!
//! let documents = tree.index(0, 0, None).expect("top level row");
//! let notes = tree.index(0, 2, Some(&documents)).expect("child row");
//!
//! assert_eq!(tree.data(&notes), Some(CellValue::from("notes.txt")));
//! assert_eq!(tree.parent(&notes).and_then(|index| tree.data(&index)), Some(CellValue::from("a")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod backend;
mod column;
mod config;
mod error;
mod node;
mod notify;
mod query;
mod tree;
mod value;

pub use backend::{Backend, BackendStats};
pub use column::{BiMap, ColumnMapper};
pub use config::{ColumnAlias, TreeConfig};
pub use error::{ConfigurationError, Error, Result};
pub use node::{CommitReport, FetchContext, NodeCache, NodeState};
pub use notify::{ChangeNotifier, ChangeSet, Observer, SubscriptionId};
pub use query::{
	quote_identifier, Filter, FilterCondition, FilterSpec, QueryBuilder, SortDirection, SortSpec,
	SqlFragment,
};
pub use tree::{ModelIndex, TreeCache};
pub use value::{CellValue, RowId, ROOT_SENTINEL};
