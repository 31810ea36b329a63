mod common;

use common::*;
use serde_json::json;
use std::collections::HashSet;
use vse::engine::query::{OrderBy, SortOrder};
use vse::engine::types::RowId;
use vse::{CreateViewRequest, EngineError, ViewCloseAction};

#[test]
fn test_end_to_end_paging_with_append_and_remove() {
    let store = world();
    let registry = registry(&store);
    let view = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap();
    let handle = view.handle().clone();

    let page = |first, len| keys(&registry.page(&handle, &scope(), first, len, &no_cancel()).unwrap());
    assert_eq!(page(0, 2), vec!["A", "B"]);
    assert_eq!(page(2, 2), vec!["C"]);
    assert!(page(3, 2).is_empty());

    store.insert(container("D", json!({ "name": "D", "code": "4000", "unit_type": "V", "org": "north" })));
    registry.add_ids(&handle, &scope(), &rows(&["D"])).unwrap();
    assert_eq!(page(0, 4), vec!["A", "B", "C", "D"]);

    registry.remove_ids(&handle, &scope(), &rows(&["B"])).unwrap();
    assert_eq!(page(0, 3), vec!["A", "C", "D"]);
}

#[test]
fn test_added_rows_are_appended_even_when_they_sort_first() {
    let store = world();
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap()
        .handle()
        .clone();

    store.insert(container("0", json!({ "name": "0-first", "unit_type": "V" })));
    registry.add_ids(&handle, &scope(), &rows(&["0"])).unwrap();
    let page = registry.page(&handle, &scope(), 0, 10, &no_cancel()).unwrap();
    assert_eq!(keys(&page), vec!["A", "B", "C", "0"]);

    // a recompute keeps the row but gives it its sorted place
    registry.invalidate(&handle).unwrap();
    let page = registry.page(&handle, &scope(), 0, 10, &no_cancel()).unwrap();
    assert_eq!(keys(&page), vec!["0", "A", "B", "C"]);
}

#[test]
fn test_paging_is_deterministic_and_complete() {
    let store = world();
    for i in 0..17 {
        store.insert(container(
            &format!("X{i:02}"),
            json!({ "name": format!("X{}", i % 5), "unit_type": "V" }),
        ));
    }
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap()
        .handle()
        .clone();

    let first = keys(&registry.page(&handle, &scope(), 4, 6, &no_cancel()).unwrap());
    let again = keys(&registry.page(&handle, &scope(), 4, 6, &no_cancel()).unwrap());
    assert_eq!(first, again);

    let mut collected = Vec::new();
    let mut first_row = 0;
    loop {
        let page = registry.page(&handle, &scope(), first_row, 4, &no_cancel()).unwrap();
        if page.row_ids().is_empty() {
            break;
        }
        collected.extend(page.row_ids().iter().cloned());
        first_row += 4;
    }
    let selection = registry.selection(&handle, &scope(), &no_cancel()).unwrap();
    let expected: Vec<RowId> = selection.row_ids().cloned().collect();
    assert_eq!(collected, expected);
    assert_eq!(collected.len(), 20);
    assert_eq!(collected.iter().collect::<HashSet<_>>().len(), 20);
}

#[test]
fn test_add_then_remove_restores_the_id_set() {
    let store = world();
    store.insert(container("E", json!({ "name": "E", "unit_type": "V" })));
    store.insert(container("F", json!({ "name": "F", "unit_type": "V" })));
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()).only_ids(["A", "C"]), &no_cancel())
        .unwrap()
        .handle()
        .clone();
    let before: Vec<RowId> = registry.selection(&handle, &scope(), &no_cancel()).unwrap().row_ids().cloned().collect();

    let added = registry.add_ids(&handle, &scope(), &rows(&["F", "E", "F"])).unwrap();
    assert_eq!(added.len(), 4);
    let twice = registry.add_ids(&handle, &scope(), &rows(&["E"])).unwrap();
    assert_eq!(twice.id, added.id);

    let removed = registry.remove_ids(&handle, &scope(), &rows(&["F", "E"])).unwrap();
    let after: Vec<RowId> = removed.row_ids().cloned().collect();
    assert_eq!(after, before);
    assert!(!registry.contains_any(&handle, &scope(), &rows(&["E", "F"])).unwrap());
    assert!(registry.contains_any(&handle, &scope(), &rows(&["E", "A"])).unwrap());
}

#[test]
fn test_security_scope_is_always_applied() {
    let store = world();
    let registry = registry(&store);
    let view = registry
        .create(CreateViewRequest::new(CONTAINERS, north()), &no_cancel())
        .unwrap();
    let handle = view.handle().clone();
    assert_eq!(keys(&registry.page(&handle, &north(), 0, 10, &no_cancel()).unwrap()), vec!["A", "B"]);

    // C belongs to another org: adding it is skipped, not an error
    let same = registry.add_ids(&handle, &north(), &rows(&["C"])).unwrap();
    assert_eq!(same.len(), 2);

    // resort and recompute keep the restriction
    registry
        .resort(&handle, &north(), SortOrder(vec![OrderBy::desc("name")]), &no_cancel())
        .unwrap();
    registry.invalidate(&handle).unwrap();
    assert_eq!(keys(&registry.page(&handle, &north(), 0, 10, &no_cancel()).unwrap()), vec!["B", "A"]);

    // other principals cannot see the view at all
    let err = registry.get(&handle, &scope()).unwrap_err();
    assert!(matches!(err, EngineError::ViewNotFound(_)));
}

#[test]
fn test_resort_keeps_added_rows_and_old_snapshots_stay_readable() {
    let store = world();
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()).only_ids(["A", "B"]), &no_cancel())
        .unwrap()
        .handle()
        .clone();
    let old = registry.selection(&handle, &scope(), &no_cancel()).unwrap();

    registry.add_ids(&handle, &scope(), &rows(&["C"])).unwrap();
    let resorted = registry
        .resort(&handle, &scope(), SortOrder(vec![OrderBy::desc("name")]), &no_cancel())
        .unwrap();
    let ids: Vec<String> = resorted.row_ids().map(|id| id.encode().to_string()).collect();
    assert_eq!(ids, vec!["C", "B", "A"]);

    // the replaced snapshot is disposed but still pages for readers holding it
    let page = registry.selections().page(&old, 0, 10);
    assert_eq!(page.row_ids.len(), 2);
    assert!(registry.selections().page_by_id(&old.id, 0, 10).is_err());
}

#[test]
fn test_cancelled_creation_registers_nothing() {
    let store = world();
    let registry = registry(&store);
    let cancel = no_cancel();
    cancel.cancel();
    let err = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &cancel)
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(registry.is_empty());
    assert_eq!(registry.selections().stats().live_selections, 0);
}

#[test]
fn test_store_failures_surface_as_store_errors() {
    let store = world();
    let registry = registry(&store);
    store.fail_queries_with("connection reset");
    let err = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap_err();
    assert!(matches!(err, EngineError::StoreExecution(_)));
    assert!(!err.is_client_error());
    assert!(registry.is_empty());
}

#[test]
fn test_close_releases_everything() {
    let store = world();
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap()
        .handle()
        .clone();
    registry.attributes(&handle, &scope(), &RowId::record("A")).unwrap();

    registry.close(&handle, ViewCloseAction::Done).unwrap();
    assert!(registry.is_empty());
    assert_eq!(registry.selections().stats().live_selections, 0);
    assert!(matches!(
        registry.page(&handle, &scope(), 0, 10, &no_cancel()),
        Err(EngineError::ViewNotFound(_))
    ));
    assert!(registry.close(&handle, ViewCloseAction::Cancel).unwrap_err().is_not_found());
}

#[test]
fn test_concurrent_pages_never_observe_a_torn_order() {
    let store = world();
    let registry = registry(&store);
    let handle = registry
        .create(CreateViewRequest::new(CONTAINERS, scope()), &no_cancel())
        .unwrap()
        .handle()
        .clone();
    let ascending = vec!["A", "B", "C"];
    let descending = vec!["C", "B", "A"];

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..50 {
                let order = if i % 2 == 0 { OrderBy::desc("name") } else { OrderBy::asc("name") };
                registry.resort(&handle, &scope(), SortOrder(vec![order]), &no_cancel()).unwrap();
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    let page = registry.page(&handle, &scope(), 0, 3, &no_cancel()).unwrap();
                    let got = keys(&page);
                    assert!(got == ascending || got == descending, "torn page: {got:?}");
                }
            });
        }
    });
}
