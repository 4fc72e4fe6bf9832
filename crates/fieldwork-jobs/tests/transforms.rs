mod common;

use bson::{Bson, doc};
use common::{find, job, source, store_with, target};
use fieldwork_jobs::Runner;
use fieldwork_pipeline::JobState;

#[test]
fn rename_keeps_field_position() {
    let store = store_with(
        &source(),
        vec![
            doc! { "_id": 1, "a": 1, "old_name": "x", "z": true },
            doc! { "_id": 2, "a": 2, "z": false },
        ],
    );
    let spec = job(
        r#"
kind: rename-fields
namespace: { database: crm, collection: accounts }
rename: { old_name: new_name }
"#,
    );
    let report = Runner::new(&store).run(&spec).unwrap();
    assert_eq!(report.state, JobState::Completed);
    assert_eq!(report.total, Some(2));
    assert_eq!(report.processed, 2);

    let renamed = find(&store, &source(), 1).unwrap();
    let keys: Vec<&str> = renamed.keys().map(String::as_str).collect();
    assert_eq!(keys, ["_id", "a", "new_name", "z"]);
    assert_eq!(renamed.get_str("new_name").unwrap(), "x");
    assert_eq!(
        find(&store, &source(), 2).unwrap(),
        doc! { "_id": 2, "a": 2, "z": false }
    );
}

#[test]
fn rename_to_end_moves_fields_last() {
    let store = store_with(&source(), vec![doc! { "_id": 1, "old": 1, "keep": 2 }]);
    let spec = job(
        r#"
kind: rename-fields
namespace: { database: crm, collection: accounts }
rename: { old: new }
mode: move-to-end
"#,
    );
    Runner::new(&store).run(&spec).unwrap();
    let doc = find(&store, &source(), 1).unwrap();
    let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
    assert_eq!(keys, ["_id", "keep", "new"]);
}

#[test]
fn add_fields_is_idempotent() {
    let store = store_with(
        &source(),
        vec![
            doc! { "_id": 1, "name": "a" },
            doc! { "_id": 2, "name": "b", "status": "old" },
        ],
    );
    let spec = job(
        r#"
kind: add-fields
namespace: { database: crm, collection: accounts }
fields:
  - { field: status, value: active }
  - { field: tags, value: [] }
batch_size: 1
"#,
    );
    let runner = Runner::new(&store);
    runner.run(&spec).unwrap();
    let first = store.documents(&source()).unwrap();
    runner.run(&spec).unwrap();
    assert_eq!(store.documents(&source()).unwrap(), first);

    assert_eq!(
        find(&store, &source(), 2).unwrap(),
        doc! { "_id": 2, "name": "b", "status": "active", "tags": [] }
    );
}

#[test]
fn add_fields_stamps_one_instant() {
    let store = store_with(
        &source(),
        (0..20).map(|i| doc! { "_id": i }).collect(),
    );
    let spec = job(
        r#"
kind: add-fields
namespace: { database: crm, collection: accounts }
fields: [{ field: migrated, value: true }]
timestamp_field: migrated_at
batch_size: 3
workers: 4
"#,
    );
    let report = Runner::new(&store).run(&spec).unwrap();
    assert_eq!(report.processed, 20);
    let stamps: Vec<Bson> = store
        .documents(&source())
        .unwrap()
        .into_iter()
        .map(|d| d.get("migrated_at").cloned().unwrap())
        .collect();
    assert!(stamps.iter().all(|s| s == &stamps[0]));
}

#[test]
fn unset_respects_filter() {
    let store = store_with(
        &source(),
        vec![
            doc! { "_id": 1, "tmp": 1, "kind": "a" },
            doc! { "_id": 2, "tmp": 2, "kind": "b" },
        ],
    );
    let spec = job(
        r#"
kind: unset-fields
namespace: { database: crm, collection: accounts }
filter: { kind: a }
fields: [tmp, missing]
"#,
    );
    let report = Runner::new(&store).run(&spec).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(find(&store, &source(), 1).unwrap(), doc! { "_id": 1, "kind": "a" });
    assert_eq!(
        find(&store, &source(), 2).unwrap(),
        doc! { "_id": 2, "tmp": 2, "kind": "b" }
    );
}

#[test]
fn update_field_sets_value_on_matches() {
    let store = store_with(
        &source(),
        vec![
            doc! { "_id": 1, "state": "draft" },
            doc! { "_id": 2, "state": "live" },
        ],
    );
    let spec = job(
        r#"
kind: update-field
namespace: { database: crm, collection: accounts }
filter: { state: draft }
field: meta.reviewed
value: false
"#,
    );
    Runner::new(&store).run(&spec).unwrap();
    assert_eq!(
        find(&store, &source(), 1).unwrap(),
        doc! { "_id": 1, "state": "draft", "meta": { "reviewed": false } }
    );
    assert_eq!(
        find(&store, &source(), 2).unwrap(),
        doc! { "_id": 2, "state": "live" }
    );
}

#[test]
fn copy_insert_missing_never_overwrites() {
    let store = store_with(
        &source(),
        (1..=5)
            .map(|i| doc! { "_id": i, "name": format!("n{i}"), "secret": "s" })
            .collect(),
    );
    store
        .seed(&target(), vec![doc! { "_id": 2, "name": "kept" }])
        .unwrap();
    let spec = job(
        r#"
kind: copy-selected-fields
source: { database: crm, collection: accounts }
target: { database: crm, collection: archive }
fields: [name]
batch_size: 2
"#,
    );
    let runner = Runner::new(&store);
    let first = runner.run(&spec).unwrap();
    assert_eq!(first.processed, 4);
    assert_eq!(find(&store, &target(), 2).unwrap(), doc! { "_id": 2, "name": "kept" });
    assert_eq!(find(&store, &target(), 3).unwrap(), doc! { "_id": 3, "name": "n3" });

    let second = runner.run(&spec).unwrap();
    assert_eq!(second.state, JobState::Completed);
    assert_eq!(second.processed, 0);
    assert_eq!(store.documents(&target()).unwrap().len(), 5);
}

#[test]
fn copy_update_matching_touches_only_listed_fields() {
    let store = store_with(
        &source(),
        vec![
            doc! { "_id": 1, "price": 10, "name": "src" },
            doc! { "_id": 2, "price": 20 },
        ],
    );
    store
        .seed(&target(), vec![doc! { "_id": 1, "price": 1, "name": "dst", "extra": true }])
        .unwrap();
    let spec = job(
        r#"
kind: copy-selected-fields
source: { database: crm, collection: accounts }
target: { database: crm, collection: archive }
fields: [price]
mode: update-matching
"#,
    );
    let report = Runner::new(&store).run(&spec).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(
        store.documents(&target()).unwrap(),
        vec![doc! { "_id": 1, "price": 10, "name": "dst", "extra": true }]
    );
}

#[test]
fn mark_duplicates_leaves_other_documents_alone() {
    let store = store_with(
        &source(),
        vec![
            doc! { "_id": 1, "url": "a", "n": 1.5 },
            doc! { "_id": 2, "url": "b" },
            doc! { "_id": 3 },
        ],
    );
    store
        .seed(
            &target(),
            vec![doc! { "_id": 10, "url": "a" }, doc! { "_id": 11, "url": "z" }],
        )
        .unwrap();
    let spec = job(
        r#"
kind: mark-duplicates
source: { database: crm, collection: accounts }
reference: { database: crm, collection: archive }
field: url
"#,
    );
    let report = Runner::new(&store).run(&spec).unwrap();
    assert_eq!(report.state, JobState::Completed);
    assert_eq!(report.processed, 1);
    assert_eq!(
        find(&store, &source(), 1).unwrap(),
        doc! { "_id": 1, "url": "a", "n": 1.5, "duplicated": true }
    );
    assert_eq!(find(&store, &source(), 2).unwrap(), doc! { "_id": 2, "url": "b" });
    assert_eq!(find(&store, &source(), 3).unwrap(), doc! { "_id": 3 });
}
