//! Common fixtures for the vse integration tests
//!
//! A small warehouse: top level containers A, B and C, included containers
//! below them, product storage lines, and a separate product catalog.

#![allow(dead_code)]

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use vse::engine::attributes::{AttributeDefinition, InMemoryAttributeStore};
use vse::engine::binding::{EntityDescriptor, FieldBinding, HierarchyRules, StaticMetadata, WidgetType};
use vse::engine::filter::{
    BarcodeFilterCompiler, FilterDescriptor, FilterOperator, FilterParamDescriptor, FullTextFilterCompiler,
};
use vse::engine::query::{OrderBy, Predicate, SecurityScope, SortOrder};
use vse::engine::types::{RecordRef, RowId, Value};
use vse::{CancellationToken, EngineConfig, InMemoryRecordStore, Record, ViewPage, ViewRegistry};

pub const CONTAINERS: &str = "containers";
pub const PRODUCTS: &str = "products";

pub fn container(key: &str, fields: JsonValue) -> Record {
    Record::new("container", key, Value::from(fields))
}

pub fn storage(key: &str, container: &str, product: &str, qty: f64) -> Record {
    Record::new(
        "storage",
        key,
        Value::from(json!({ "container": container, "product": product, "qty": qty, "uom": "PCE" })),
    )
}

pub fn product(key: &str, name: &str) -> Record {
    Record::new("product", key, Value::from(json!({ "name": name, "uom": "PCE" })))
}

/// A: transport unit holding V "A1". B: nested unit holding two transport
/// units. C: a virtual unit without packing info.
pub fn world() -> Arc<InMemoryRecordStore> {
    Arc::new(InMemoryRecordStore::with_records([
        container("A", json!({ "name": "A", "code": "1000", "unit_type": "TU", "status": "planning", "active": true, "org": "north", "locator": "L1", "packing": "IFCO" })),
        container("A1", json!({ "name": "A-V1", "code": "1001", "unit_type": "V", "parent": "A", "status": "planning", "org": "north" })),
        container("B", json!({ "name": "B", "code": "2000", "unit_type": "LU", "status": "active", "active": true, "org": "north", "locator": "L2", "packing": "Pallet" })),
        container("B1", json!({ "name": "B-TU1", "code": "2100", "unit_type": "TU", "parent": "B", "org": "north" })),
        container("B11", json!({ "name": "B-V11", "code": "2110", "unit_type": "V", "parent": "B1", "org": "north" })),
        container("B2", json!({ "name": "B-TU2", "code": "2200", "unit_type": "TU", "parent": "B", "org": "north" })),
        container("B21", json!({ "name": "B-V21", "code": "2210", "unit_type": "V", "parent": "B2", "org": "north" })),
        container("C", json!({ "name": "C", "code": "3000", "unit_type": "V", "status": "planning", "active": true, "org": "south", "locator": "L1" })),
        storage("s1", "A1", "P1", 5.0),
        storage("s2", "B11", "P1", 2.0),
        storage("s3", "B21", "P2", 3.0),
        storage("s4", "C", "P2", 1.0),
        product("P1", "Nails"),
        product("P2", "Screws"),
        product("P3", "Bolts"),
    ]))
}

pub fn containers_descriptor() -> EntityDescriptor {
    let rules = HierarchyRules {
        best_before_attribute: Some("best_before".into()),
        ..HierarchyRules::default()
    };
    EntityDescriptor::new(CONTAINERS, "container")
        .field(FieldBinding::column("name", WidgetType::Text))
        .field(FieldBinding::column("code", WidgetType::Text))
        .field(FieldBinding::column("unit_type", WidgetType::List))
        .field(FieldBinding::column("status", WidgetType::List))
        .field(FieldBinding::column("locator", WidgetType::Lookup))
        .field(
            FieldBinding::computed("packing", WidgetType::Text, |record| match record.get_str("packing") {
                Some(packing) => Ok(Value::str(packing)),
                None => anyhow::bail!("no packing instructions for {}", record.key),
            })
            .cosmetic(),
        )
        .order(SortOrder::by("name"))
        .filter(
            FilterDescriptor::new("default")
                .with_param(FilterParamDescriptor::new("status", FilterOperator::Equal))
                .with_param(FilterParamDescriptor::new("locator", FilterOperator::Equal))
                .with_param(FilterParamDescriptor::new("name", FilterOperator::Like)),
        )
        .filter(
            FilterDescriptor::new("by_locator")
                .with_param(FilterParamDescriptor::new("locator", FilterOperator::Equal).mandatory()),
        )
        .compiler("barcode", Arc::new(BarcodeFilterCompiler::new("container", &["code"])))
        .compiler("search", Arc::new(FullTextFilterCompiler::new(&["name", "code"])))
        .hierarchy(rules)
        .restricted_to(Predicate::IsNull { field: "parent".into() })
}

pub fn products_descriptor() -> EntityDescriptor {
    EntityDescriptor::new(PRODUCTS, "product")
        .field(FieldBinding::column("name", WidgetType::Text))
        .field(FieldBinding::column("uom", WidgetType::List))
        .order(SortOrder(vec![OrderBy::asc("name")]))
}

pub fn metadata() -> Arc<StaticMetadata> {
    Arc::new(StaticMetadata::new([containers_descriptor(), products_descriptor()]))
}

pub fn attributes() -> Arc<InMemoryAttributeStore> {
    let attributes = InMemoryAttributeStore::new();
    for key in ["A", "A1", "B", "B11", "B21", "C"] {
        attributes.define(
            RecordRef::new("container", key),
            vec![
                AttributeDefinition::new("lot", WidgetType::Text),
                AttributeDefinition::new("best_before", WidgetType::Date),
                AttributeDefinition::new("weight", WidgetType::Number).readonly(),
            ],
        );
    }
    attributes.put(RecordRef::new("container", "A"), "best_before", "2031-05-01");
    Arc::new(attributes)
}

pub fn config() -> EngineConfig {
    EngineConfig {
        selection_chunk_size: 2,
        ..EngineConfig::default()
    }
}

pub fn registry(store: &Arc<InMemoryRecordStore>) -> Arc<ViewRegistry> {
    Arc::new(ViewRegistry::new(store.clone(), metadata(), &config()).with_attributes(attributes()))
}

pub fn scope() -> SecurityScope {
    SecurityScope::unrestricted("tester")
}

pub fn north() -> SecurityScope {
    SecurityScope::new("north-clerk", Predicate::eq("org", "north"))
}

pub fn no_cancel() -> CancellationToken {
    CancellationToken::new()
}

pub fn keys(page: &ViewPage) -> Vec<String> {
    page.row_ids().iter().map(|id| id.encode().to_string()).collect()
}

pub fn rows(keys: &[&str]) -> Vec<RowId> {
    keys.iter().map(|k| RowId::record(*k)).collect()
}
