#![allow(dead_code)]

use sd_tree_cache::{CellValue, TreeCache, TreeConfig};

use rusqlite::{params, Connection, OptionalExtension};

pub const SCHEMA: &str = "CREATE TABLE testTable (
	guid TEXT PRIMARY KEY,
	parent_guid TEXT,
	name TEXT,
	value INTEGER
);";

/// Default positions of the fixture columns
pub const GUID: usize = 0;
pub const PARENT: usize = 1;
pub const NAME: usize = 2;
pub const VALUE: usize = 3;

pub fn empty() -> Connection {
	let conn = Connection::open_in_memory().unwrap();
	conn.execute_batch(SCHEMA).unwrap();
	conn
}

pub fn insert(conn: &Connection, guid: &str, parent: Option<&str>, name: &str, value: i64) {
	conn.execute(
		"INSERT INTO testTable (guid, parent_guid, name, value) VALUES (?, ?, ?, ?)",
		params![guid, parent, name, value],
	)
	.unwrap();
}

/// A(parent = NULL) with two children, B and C.
pub fn scenario() -> Connection {
	let conn = empty();
	insert(&conn, "A", None, "Alpha", 1);
	insert(&conn, "B", Some("A"), "Bravo", 2);
	insert(&conn, "C", Some("A"), "Charlie", 3);
	conn
}

/// Two top level rows, the first one with a handful of named children and grandchildren.
pub fn people() -> Connection {
	let conn = empty();
	insert(&conn, "root", None, "Root", 0);
	insert(&conn, "other", None, "Other", 0);

	insert(&conn, "p1", Some("root"), "John", 10);
	insert(&conn, "p2", Some("root"), "Mike", 20);
	insert(&conn, "p3", Some("root"), "Joanna", 30);
	insert(&conn, "p4", Some("root"), "Sara", 40);

	insert(&conn, "g1", Some("p1"), "Junior", 11);
	insert(&conn, "g2", Some("p1"), "Jolene", 12);
	conn
}

pub fn config() -> TreeConfig {
	TreeConfig::new("testTable")
		.with_column("id", "guid")
		.with_column("parentId", "parent_guid")
		.with_column("name", "name")
		.with_column("value", "value")
}

pub fn tree(conn: &Connection) -> TreeCache<'_> {
	TreeCache::configure(conn, config()).unwrap()
}

/// Reads a cell straight from the table, bypassing any cache.
pub fn stored(conn: &Connection, guid: &str, column: &str) -> Option<CellValue> {
	conn.query_row(
		&format!("SELECT {column} FROM testTable WHERE guid = ?"),
		[guid],
		|row| row.get_ref(0).map(CellValue::from),
	)
	.optional()
	.unwrap()
}

pub fn text(value: &str) -> Option<CellValue> {
	Some(CellValue::from(value))
}
