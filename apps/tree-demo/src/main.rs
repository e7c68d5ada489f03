use sd_tree_cache::{
	CellValue, ChangeSet, Filter, ModelIndex, SortDirection, TreeCache, TreeConfig,
};

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::{seq::SliceRandom, Rng};
use rusqlite::{params, Connection};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const SCHEMA: &str = "CREATE TABLE testTable (
	guid TEXT PRIMARY KEY,
	parent_guid TEXT,
	name TEXT,
	value INTEGER
)";

const NAMES: &[&str] = &[
	"alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
];

#[derive(Parser, Debug)]
#[command(
	name = "sd-tree-demo",
	about = "Browse a randomly generated parent-linked table through the tree cache"
)]
struct Cli {
	/// Number of random rows to generate
	#[arg(long, default_value_t = 100)]
	rows: usize,

	/// Code name of the column to sort by
	#[arg(long)]
	sort: Option<String>,

	/// Sort descending instead of ascending
	#[arg(long)]
	desc: bool,

	/// Only show rows whose name contains this text, applied at every level
	#[arg(long)]
	filter: Option<String>,

	/// Number of tree levels to print
	#[arg(long, default_value_t = 3)]
	depth: usize,

	/// JSON tree configuration, defaults to the generated table's column map
	#[arg(long)]
	config: Option<PathBuf>,
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info,sd_tree_cache=debug")),
		)
		.with_file(true)
		.with_line_number(true)
		.init();

	let cli = Cli::parse();

	let conn = Connection::open_in_memory()?;
	populate(&conn, cli.rows).context("failed to populate the demo table")?;

	let config = match &cli.config {
		Some(path) => TreeConfig::load(path)?,
		None => default_config(),
	};

	let mut tree = TreeCache::configure(&conn, config)?;

	tree.subscribe(|changes: &ChangeSet| {
		info!(
			added = changes.added.len(),
			updated = changes.updated.len(),
			deleted = changes.deleted.len(),
			"rows changed"
		);
	});

	let mut changed = false;

	if let Some(filter) = &cli.filter {
		tree.set_filter(vec![Filter::substring("name", filter.as_str())])?;
		changed = true;
	}

	if let Some(code) = &cli.sort {
		let direction = if cli.desc {
			SortDirection::Descending
		} else {
			SortDirection::Ascending
		};
		tree.set_sort([(code.clone(), direction)])?;
		changed = true;
	}

	// Configuring already fetched the top level, only a new filter or sort needs another pass
	if changed {
		tree.fetch_root()?;
	}

	let header = (0..tree.column_count())
		.filter_map(|column| tree.header(column))
		.collect::<Vec<_>>()
		.join(" | ");
	println!("{header}");

	print_level(&mut tree, None, 0, cli.depth);

	bump_first_value(&mut tree)?;

	let stats = tree.backend_stats();
	info!(
		fetches = stats.fetches,
		counts = stats.counts,
		lookups = stats.lookups,
		writes = stats.writes,
		"backend round-trips"
	);

	Ok(())
}

fn default_config() -> TreeConfig {
	TreeConfig::new("testTable")
		.with_column("id", "guid")
		.with_column("parentId", "parent_guid")
		.with_column("name", "name")
		.with_column("value", "value")
}

/// Fills the table with rows whose parents are drawn from the rows inserted before them.
fn populate(conn: &Connection, rows: usize) -> Result<()> {
	conn.execute_batch(SCHEMA)?;

	let mut rng = rand::thread_rng();
	let mut inserted = Vec::with_capacity(rows);

	let tx = conn.unchecked_transaction()?;
	for i in 0..rows {
		let guid = format!("{i:06}");
		let parent = if inserted.is_empty() || rng.gen_bool(0.3) {
			None
		} else {
			inserted.choose(&mut rng).cloned()
		};
		let name = format!("{}-{i}", NAMES.choose(&mut rng).copied().unwrap_or("row"));

		tx.execute(
			"INSERT INTO testTable (guid, parent_guid, name, value) VALUES (?, ?, ?, ?)",
			params![guid, parent, name, rng.gen_range(0..1000_i64)],
		)?;

		inserted.push(guid);
	}
	tx.commit()?;

	debug!(rows, "populated demo table");

	Ok(())
}

fn print_level(
	tree: &mut TreeCache<'_>,
	parent: Option<&ModelIndex>,
	depth: usize,
	max_depth: usize,
) {
	if depth >= max_depth {
		return;
	}

	for row in 0..tree.row_count(parent) {
		let Some(index) = tree.index(row, 0, parent) else {
			continue;
		};

		let cells = (0..tree.column_count())
			.filter_map(|column| tree.data(&index.sibling_at_column(column)))
			.map(|value| value.to_string())
			.collect::<Vec<_>>()
			.join(" | ");
		println!("{:indent$}{cells}", "", indent = depth * 2);

		print_level(tree, Some(&index), depth + 1, max_depth);
	}
}

/// Edits the first top level row's value and commits it, which fires the observer.
fn bump_first_value(tree: &mut TreeCache<'_>) -> Result<()> {
	let columns = tree.columns();
	let value_column = columns.display_position(columns.default_position("value")?)?;

	let Some(first) = tree.index(0, value_column, None) else {
		return Ok(());
	};

	let bumped = tree
		.data(&first)
		.and_then(|value| value.as_integer())
		.unwrap_or_default()
		+ 1;

	if tree.set_data(&first, CellValue::Integer(bumped)) && tree.commit() {
		info!(value = bumped, "bumped first row");
	}

	Ok(())
}
