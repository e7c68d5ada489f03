use sd_tree_cache::{
	CellValue, ConfigurationError, Error, Filter, ModelIndex, NodeState, RowId, SortDirection,
	TreeCache, TreeConfig,
};

use std::ptr;

use rand::seq::SliceRandom;
use tracing_test::traced_test;

mod common;

use common::{GUID, NAME, VALUE};

fn names(tree: &mut TreeCache<'_>, parent: &ModelIndex) -> Vec<String> {
	let indexes = (0..tree.row_count(Some(parent)))
		.filter_map(|row| tree.index(row, NAME, Some(parent)))
		.collect::<Vec<_>>();

	indexes
		.iter()
		.filter_map(|index| tree.data(index))
		.map(|value| value.to_string())
		.collect()
}

#[test]
#[traced_test]
fn root_sentinel_selects_only_top_level_rows() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	assert!(tree.root_anchor().is_root());
	assert_eq!(tree.row_count(None), 1);
	assert_eq!(tree.root_node().state(), NodeState::Fetched);

	let a = tree.index(0, GUID, None).unwrap();
	assert_eq!(tree.data(&a), common::text("A"));
	assert_eq!(tree.parent(&a), None);
}

#[test]
#[traced_test]
fn scenario_sorted_children() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	tree.set_root(RowId::root()).unwrap();
	assert_eq!(tree.row_count(None), 1);

	let a = tree.index(0, GUID, None).unwrap();
	assert_eq!(tree.row_count(Some(&a)), 2);
	assert_eq!(names(&mut tree, &a), ["Bravo", "Charlie"]);

	tree.set_sort([("name".to_string(), SortDirection::Descending)])
		.unwrap();

	// Nothing changes until the node is fetched again
	assert_eq!(names(&mut tree, &a), ["Bravo", "Charlie"]);

	assert_eq!(tree.fetch_children(&a).unwrap(), 2);
	assert_eq!(names(&mut tree, &a), ["Charlie", "Bravo"]);
}

#[test]
#[traced_test]
fn parent_of_child_is_the_parent() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();
	let count = tree.row_count(Some(&root));
	assert_eq!(count, 4);

	for row in 0..count {
		let child = tree.index(row, NAME, Some(&root)).unwrap();
		assert_eq!(tree.parent(&child), Some(root.clone()));

		let grandchildren = tree.row_count(Some(&child.sibling_at_column(GUID)));
		for grand_row in 0..grandchildren {
			let grandchild = tree
				.index(grand_row, GUID, Some(&child.sibling_at_column(GUID)))
				.unwrap();
			assert_eq!(tree.parent(&grandchild), Some(child.sibling_at_column(GUID)));
			assert_eq!(grandchild.depth(), 2);
		}
	}
}

#[test]
#[traced_test]
fn row_count_is_a_live_backend_count() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	let a = tree.index(0, GUID, None).unwrap();
	tree.index(0, GUID, Some(&a)).unwrap();
	assert_eq!(tree.node_for(Some(&a)).unwrap().len(), 2);

	common::insert(&conn, "D", Some("A"), "Delta", 4);

	assert_eq!(tree.row_count(Some(&a)), 3);
	// The materialized node keeps serving its snapshot
	assert_eq!(tree.node_for(Some(&a)).unwrap().len(), 2);

	tree.fetch_children(&a).unwrap();
	assert_eq!(tree.node_for(Some(&a)).unwrap().len(), 3);
}

#[test]
#[traced_test]
fn child_is_materialized_once() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	let a = tree.index(0, GUID, None).unwrap();
	let before = tree.backend_stats();

	let b = tree.index(0, GUID, Some(&a)).unwrap();
	let first = ptr::from_ref(tree.node_for(Some(&a)).unwrap());

	let c = tree.index(1, GUID, Some(&a)).unwrap();
	let second = ptr::from_ref(tree.node_for(Some(&a)).unwrap());

	assert_eq!(tree.backend_stats().fetches, before.fetches + 1);
	assert!(ptr::eq(first, second));
	assert_eq!(tree.root_node().child_count(), 1);

	assert_eq!(tree.data(&b), common::text("B"));
	assert_eq!(tree.data(&c), common::text("C"));
	assert!(logs_contain("materialized child node"));
}

#[test]
#[traced_test]
fn row_identifiers_are_stable_between_fetches() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();
	let child = tree.index(2, GUID, Some(&root)).unwrap();
	let before = tree.backend_stats();

	let first = tree.row_identifier(&child);
	let second = tree.row_identifier(&child);

	assert_eq!(first, Some(RowId::new("p3")));
	assert_eq!(first, second);
	assert_eq!(tree.backend_stats(), before);
}

#[test]
#[traced_test]
fn substring_filter_restricts_rows() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();

	tree.set_filter(vec![Filter::substring("name", "Jo")]).unwrap();

	assert_eq!(tree.fetch_children(&root).unwrap(), 2);
	assert_eq!(tree.row_count(Some(&root)), 2);
	assert_eq!(names(&mut tree, &root), ["John", "Joanna"]);
}

#[test]
#[traced_test]
fn filters_are_replaced_wholesale() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();

	tree.set_filter(vec![Filter::exact("name", "Mike")]).unwrap();
	assert_eq!(tree.row_count(Some(&root)), 1);

	tree.set_filter(vec![Filter::substring("name", "Jo")]).unwrap();
	assert_eq!(tree.filter_spec().filters().len(), 1);
	assert_eq!(tree.row_count(Some(&root)), 2);

	tree.set_filter(Vec::<Filter>::new()).unwrap();
	assert_eq!(tree.row_count(Some(&root)), 4);
}

#[test]
#[traced_test]
fn filter_values_are_bound_not_interpolated() {
	let conn = common::people();
	common::insert(&conn, "p5", Some("root"), "O'Brien", 50);
	common::insert(&conn, "p6", Some("root"), "100%", 60);
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();

	tree.set_filter(vec![Filter::exact("name", "O'Brien")]).unwrap();
	assert_eq!(tree.row_count(Some(&root)), 1);

	tree.set_filter(vec![Filter::substring("name", "%")]).unwrap();
	assert_eq!(tree.row_count(Some(&root)), 1);
}

#[test]
#[traced_test]
fn sort_spec_is_replaced_for_the_same_key() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	tree.set_sort([("name".to_string(), SortDirection::Ascending)])
		.unwrap();
	tree.set_sort([("name".to_string(), SortDirection::Descending)])
		.unwrap();

	assert_eq!(
		tree.sort_spec().entries(),
		[("name".to_string(), SortDirection::Descending)]
	);
}

#[test]
#[traced_test]
fn last_sort_key_in_a_list_is_primary() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();

	tree.set_sort([
		("name".to_string(), SortDirection::Ascending),
		("value".to_string(), SortDirection::Descending),
	])
	.unwrap();

	assert_eq!(
		tree.sort_spec().entries(),
		[
			("value".to_string(), SortDirection::Descending),
			("name".to_string(), SortDirection::Ascending),
		]
	);

	tree.fetch_children(&root).unwrap();
	assert_eq!(names(&mut tree, &root), ["Sara", "Joanna", "Mike", "John"]);
}

#[test]
#[traced_test]
fn sort_keeps_random_insertions_ordered() {
	let conn = common::empty();
	let mut values = (0..50).collect::<Vec<i64>>();
	values.shuffle(&mut rand::thread_rng());

	for value in &values {
		common::insert(&conn, &format!("row-{value}"), None, "row", *value);
	}

	let mut tree = common::tree(&conn);
	assert!(tree.sort(VALUE, SortDirection::Ascending));

	let indexes = (0..50)
		.filter_map(|row| tree.index(row, VALUE, None))
		.collect::<Vec<_>>();
	let sorted = indexes
		.iter()
		.filter_map(|index| tree.data(index).and_then(|value| value.as_integer()))
		.collect::<Vec<_>>();

	assert_eq!(sorted, (0..50).collect::<Vec<_>>());
}

#[test]
#[traced_test]
fn sort_refetches_only_the_root() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();
	tree.index(0, GUID, Some(&root)).unwrap();
	let child_epoch = tree.node_for(Some(&root)).unwrap().epoch();
	let before = tree.backend_stats();

	assert!(tree.sort(NAME, SortDirection::Descending));

	assert_eq!(tree.backend_stats().fetches, before.fetches + 1);
	assert_eq!(
		tree.sort_spec().entries(),
		[("name".to_string(), SortDirection::Descending)]
	);

	// "Root" sorts before "Other" descending
	let first = tree.index(0, GUID, None).unwrap();
	assert_eq!(tree.data(&first), common::text("root"));

	let child = tree.node_for(Some(&first)).unwrap();
	assert!(child.is_stale());
	assert_eq!(child.epoch(), child_epoch);
}

#[test]
#[traced_test]
fn handles_die_with_their_snapshot() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	let a = tree.index(0, NAME, None).unwrap();
	assert_eq!(tree.data(&a), common::text("Alpha"));

	tree.fetch_root().unwrap();

	assert_eq!(tree.data(&a), None);
	assert!(matches!(tree.try_data(&a), Err(Error::StaleReference { .. })));
	assert_eq!(tree.index(0, GUID, Some(&a)), None);

	let a = tree.index(0, NAME, None).unwrap();
	assert_eq!(tree.data(&a), common::text("Alpha"));
}

#[test]
#[traced_test]
fn out_of_range_navigation_is_no_data() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	assert_eq!(tree.index(1, GUID, None), None);
	assert_eq!(tree.index(0, 4, None), None);
	assert!(matches!(tree.try_index(5, GUID, None), Err(Error::RowNotFound(5))));
	assert!(matches!(tree.try_index(0, 9, None), Err(Error::ColumnNotFound(9))));

	let a = tree.index(0, GUID, None).unwrap();
	let b = tree.index(0, GUID, Some(&a)).unwrap();

	// B has no children, its node is empty
	assert_eq!(tree.row_count(Some(&b)), 0);
	assert_eq!(tree.index(0, GUID, Some(&b)), None);
	assert!(logs_contain("no data at this position"));
}

#[test]
#[traced_test]
fn set_root_rebuilds_the_tree() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let old = tree.index(0, GUID, None).unwrap();
	tree.index(0, GUID, Some(&old)).unwrap();

	tree.set_root("root").unwrap();

	assert_eq!(tree.root_anchor(), &RowId::new("root"));
	assert_eq!(tree.config().root, RowId::new("root"));
	assert_eq!(tree.row_count(None), 4);
	assert_eq!(tree.root_node().child_count(), 0);
	assert_eq!(tree.data(&old), None);

	let john = tree.index(0, NAME, None).unwrap();
	assert_eq!(tree.data(&john), common::text("John"));
	assert_eq!(tree.parent(&john), None);
}

#[test]
#[traced_test]
fn unknown_names_are_configuration_errors() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	assert!(matches!(
		tree.set_sort([("missing".to_string(), SortDirection::Ascending)]),
		Err(Error::Configuration(ConfigurationError::UnknownCodeName(name))) if name == "missing"
	));
	assert!(tree.sort_spec().is_empty());

	assert!(matches!(
		tree.set_filter(vec![Filter::exact("missing", "x")]),
		Err(Error::Configuration(ConfigurationError::UnknownBackendColumn(name))) if name == "missing"
	));
	assert!(tree.filter_spec().is_empty());
}

#[test]
#[traced_test]
fn configure_rejects_bad_tables_and_maps() {
	let conn = common::scenario();

	assert!(matches!(
		TreeCache::configure(&conn, TreeConfig::new("nope")),
		Err(Error::Configuration(ConfigurationError::EmptySchema(table))) if table == "nope"
	));

	assert!(matches!(
		TreeCache::configure(&conn, common::config().with_column("extra", "missing")),
		Err(Error::Configuration(ConfigurationError::UnknownBackendColumn(_)))
	));

	assert!(matches!(
		TreeCache::configure(&conn, common::config().with_column("other", "guid")),
		Err(Error::Configuration(ConfigurationError::AmbiguousColumnMap { .. }))
	));

	// Identity map, the default "id" code name doesn't exist in this table
	assert!(matches!(
		TreeCache::configure(&conn, TreeConfig::new("testTable")),
		Err(Error::Configuration(ConfigurationError::UnknownCodeName(_)))
	));
}

#[test]
#[traced_test]
fn identity_map_uses_backend_names() {
	let conn = common::scenario();
	let config = TreeConfig::new("testTable").with_id_columns("guid", "parent_guid");
	let mut tree = TreeCache::configure(&conn, config).unwrap();

	assert_eq!(tree.column_count(), 4);
	assert_eq!(tree.header(NAME), Some("name"));
	assert_eq!(tree.columns().real_name("parent_guid").unwrap(), "parent_guid");

	let a = tree.index(0, NAME, None).unwrap();
	assert_eq!(tree.data(&a), common::text("Alpha"));
}

#[test]
#[traced_test]
fn display_order_moves_columns() {
	let conn = common::scenario();
	let mut tree = common::tree(&conn);

	assert_eq!(tree.header(0), Some("id"));

	tree.set_column_order(&[(0, NAME), (1, VALUE), (2, GUID), (3, 1)])
		.unwrap();

	assert_eq!(tree.header(0), Some("name"));
	assert_eq!(tree.header(2), Some("id"));

	let a = tree.index(0, 0, None).unwrap();
	assert_eq!(tree.data(&a), common::text("Alpha"));
	assert_eq!(
		tree.data(&a.sibling_at_column(1)),
		Some(CellValue::Integer(1))
	);

	// Sorting goes through the display order too
	assert!(tree.sort(0, SortDirection::Ascending));
	assert_eq!(
		tree.sort_spec().entries(),
		[("name".to_string(), SortDirection::Ascending)]
	);

	assert!(tree.set_column_order(&[(0, 0), (1, 0)]).is_err());
	assert_eq!(tree.header(0), Some("name"));
}

#[test]
#[traced_test]
fn unmapped_columns_fall_back_to_backend_names() {
	let conn = common::scenario();
	let config = TreeConfig::new("testTable")
		.with_column("id", "guid")
		.with_column("parentId", "parent_guid");
	let tree = TreeCache::configure(&conn, config).unwrap();

	assert_eq!(tree.header(GUID), Some("id"));
	assert_eq!(tree.header(NAME), Some("name"));
	assert!(tree.columns().real_name("name").is_err());
}

#[test]
#[traced_test]
fn parent_is_looked_up_in_the_backend() {
	let conn = common::people();
	let tree = common::tree(&conn);

	assert_eq!(tree.lookup_parent(&RowId::new("g2")), Some(RowId::new("p1")));
	assert_eq!(tree.lookup_parent(&RowId::new("root")), Some(RowId::root()));
	assert_eq!(tree.lookup_parent(&RowId::new("ghost")), None);
	assert!(matches!(
		tree.try_lookup_parent(&RowId::new("ghost")),
		Err(Error::IdentifierNotFound(_))
	));
}

#[test]
#[traced_test]
fn reconfigure_drops_sort_and_nodes() {
	let conn = common::people();
	let mut tree = common::tree(&conn);

	let root = tree.index(0, GUID, None).unwrap();
	tree.index(0, GUID, Some(&root)).unwrap();
	assert!(tree.sort(NAME, SortDirection::Ascending));

	tree.reconfigure(common::config().with_root("p1")).unwrap();

	assert!(tree.sort_spec().is_empty());
	assert_eq!(tree.root_anchor(), &RowId::new("p1"));
	assert_eq!(tree.row_count(None), 2);
	assert_eq!(tree.data(&root), None);
}

#[test]
#[traced_test]
fn file_backed_database() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("tree.db");

	{
		let conn = rusqlite::Connection::open(&path).unwrap();
		conn.execute_batch(common::SCHEMA).unwrap();
		common::insert(&conn, "A", None, "Alpha", 1);
		common::insert(&conn, "B", Some("A"), "Bravo", 2);
	}

	let conn = rusqlite::Connection::open(&path).unwrap();
	let mut tree = common::tree(&conn);

	let a = tree.index(0, GUID, None).unwrap();
	let b = tree.index(0, NAME, Some(&a)).unwrap();
	assert_eq!(tree.data(&b), common::text("Bravo"));
}
