mod common;

use common::*;
use serde_json::json;
use vse::engine::attributes::ChangesCollector;
use vse::engine::materializer::{ExpansionContext, PLACEHOLDER, PRODUCT_FIELD, QTY_FIELD, STATUS_DISPLAY_FIELD};
use vse::engine::types::{RecordRef, RowId, Value};
use vse::{CreateViewRequest, EngineError, RowKind, ViewRegistry};

fn open(registry: &ViewRegistry) -> vse::ViewHandle {
    registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap()
        .handle()
        .clone()
}

fn tree_ids(row: &vse::Row) -> Vec<String> {
    row.stream_recursive().map(|r| r.id().encode().to_string()).collect()
}

#[test]
fn test_every_kind_expands_into_its_children() {
    let store = world();
    store.insert(container("G", json!({ "name": "G", "unit_type": "TU", "aggregated": true })));
    store.insert(storage("s5", "G", "P3", 7.0));
    store.insert(storage("s6", "G", "P1", 1.0));
    let registry = registry(&store);
    let handle = open(&registry);

    let page = registry.page(&handle, &scope(), 0, 10, &no_cancel()).unwrap();
    assert!(page.rows.is_complete());
    let kinds: Vec<RowKind> = page.rows.rows.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            RowKind::TransportContainer,
            RowKind::NestedContainer,
            RowKind::VirtualContainer,
            RowKind::AggregateContainer
        ]
    );

    let row = |key: &str| page.rows.row(&RowId::record(key)).unwrap();
    // transport unit: one leaf per (included container, product)
    assert_eq!(tree_ids(row("A")), vec!["A", "A/A1/P1"]);
    // nested unit: included units recursively, each with its own leaves
    assert_eq!(tree_ids(row("B")), vec!["B", "B/B1", "B/B11/P1", "B/B2", "B/B21/P2"]);
    // virtual unit: no children
    assert!(row("C").children().is_empty());
    // aggregated unit: one leaf per stored product, in product order
    let leaves: Vec<&str> = row("G")
        .children()
        .iter()
        .map(|leaf| leaf.field(PRODUCT_FIELD).and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(leaves, vec!["P1", "P3"]);
}

#[test]
fn test_unknown_kind_fails_only_its_row() {
    let store = world();
    store.insert(container("AA", json!({ "name": "AA", "unit_type": "PALLET" })));
    let registry = registry(&store);
    let handle = open(&registry);

    let page = registry.page(&handle, &scope(), 0, 3, &no_cancel()).unwrap();
    assert_eq!(keys(&page), vec!["A", "AA", "B"]);
    assert_eq!(page.rows.rows.len(), 2);
    assert_eq!(page.rows.failures.len(), 1);
    let failure = &page.rows.failures[0];
    assert_eq!(failure.row_id, RowId::record("AA"));
    assert!(matches!(failure.error, EngineError::UnknownRowKind { ref kind, .. } if kind == "PALLET"));
}

#[test]
fn test_cosmetic_failure_keeps_row_and_siblings() {
    let store = world();
    let registry = registry(&store);
    let handle = open(&registry);

    let page = registry.page(&handle, &scope(), 0, 3, &no_cancel()).unwrap();
    assert!(page.rows.is_complete());
    let c = page.rows.row(&RowId::record("C")).unwrap();
    assert_eq!(c.field("packing"), Some(&Value::str(PLACEHOLDER)));
    assert_eq!(c.field("name"), Some(&Value::str("C")));
    assert_eq!(c.field("locator"), Some(&Value::str("L1")));
    let a = page.rows.row(&RowId::record("A")).unwrap();
    assert_eq!(a.field("packing"), Some(&Value::str("IFCO")));
}

#[test]
fn test_container_summary_fields() {
    let store = world();
    store.upsert(container("C", json!({ "name": "C", "unit_type": "V", "reserved": true, "status": "planning" })));
    let registry = registry(&store);
    let handle = open(&registry);

    let page = registry.rows_by_ids(&handle, &scope(), &rows(&["A", "B", "C"])).unwrap();
    let a = page.row(&RowId::record("A")).unwrap();
    assert_eq!(a.field(PRODUCT_FIELD), Some(&Value::str("P1")));
    assert_eq!(a.field(QTY_FIELD), Some(&Value::from(5.0)));
    assert_eq!(a.field("best_before"), Some(&Value::str("2031-05-01")));
    // B stores two different products
    let b = page.row(&RowId::record("B")).unwrap();
    assert_eq!(b.field(PRODUCT_FIELD), Some(&Value::Null));
    let c = page.row(&RowId::record("C")).unwrap();
    assert_eq!(c.field(STATUS_DISPLAY_FIELD), Some(&Value::str("Reserved")));
}

#[test]
fn test_nested_rows_by_id() {
    let store = world();
    let registry = registry(&store);
    let handle = open(&registry);

    let ids = vec![
        RowId::nested(Some(&"B".into()), "B2"),
        RowId::storage("B", "B21", "P2"),
        RowId::storage("B", "B21", "P9"),
    ];
    let page = registry.rows_by_ids(&handle, &scope(), &ids).unwrap();
    assert_eq!(page.rows.len(), 2);
    assert_eq!(page.rows[0].kind(), RowKind::TransportContainer);
    assert!(!page.rows[0].is_top_level());
    assert_eq!(page.rows[1].kind(), RowKind::StorageLeaf);
    assert_eq!(page.rows[1].attributes_record(), Some(&RecordRef::new("container", "B21")));
    assert!(page.failures[0].error.is_not_found());
}

#[test]
fn test_attribute_projection_through_the_registry() {
    let store = world();
    let registry = registry(&store);
    let handle = open(&registry);
    let sink = ChangesCollector::new();

    let a = registry.attributes(&handle, &scope(), &RowId::record("A")).unwrap();
    assert_eq!(a.get("best_before").unwrap(), Value::str("2031-05-01"));
    a.set("lot", Value::str("LOT-42"), &sink).unwrap();
    assert!(a.is_readonly("weight").unwrap());
    let events = sink.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].row_id, RowId::record("A"));

    // cached per row
    let again = registry.attributes(&handle, &scope(), &RowId::record("A")).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &again));

    // B is not in the editable status
    let b = registry.attributes(&handle, &scope(), &RowId::record("B")).unwrap();
    let err = b.set("lot", Value::str("x"), &sink).unwrap_err();
    assert!(matches!(err, EngineError::AttributeReadonly { .. }));
    assert!(sink.is_empty());

    // leaves of the transport unit edit the included container's attributes
    let leaf = registry.attributes(&handle, &scope(), &RowId::storage("A", "A1", "P1")).unwrap();
    assert_eq!(leaf.record(), &RecordRef::new("container", "A1"));
}

#[test]
fn test_processed_rows_are_readonly() {
    let store = world();
    let registry = std::sync::Arc::new(
        ViewRegistry::new(store.clone(), metadata(), &config())
            .with_attributes(attributes())
            .with_expansion(ExpansionContext::default().with_processed(|r| r.key == "A")),
    );
    let handle = open(&registry);

    let page = registry.page(&handle, &scope(), 0, 1, &no_cancel()).unwrap();
    assert!(page.rows.rows[0].stream_recursive().all(|r| r.is_processed()));
    let a = registry.attributes(&handle, &scope(), &RowId::record("A")).unwrap();
    assert!(a.is_readonly("lot").unwrap());
}

#[test]
fn test_plain_entities_have_no_children_or_attributes() {
    let store = world();
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(PRODUCTS, scope()), &no_cancel())
        .unwrap()
        .handle()
        .clone();

    let page = registry.page(&handle, &scope(), 0, 10, &no_cancel()).unwrap();
    assert_eq!(keys(&page), vec!["P3", "P1", "P2"]);
    assert!(page.rows.rows.iter().all(|r| r.kind() == RowKind::Plain && r.children().is_empty()));
    assert!(registry.attributes(&handle, &scope(), &RowId::record("P1")).is_err());
}
