#![allow(missing_docs)]

use std::sync::Arc;

use serde_json::{json, Map, Value};
use stixgraph::{
    error::LoadingError,
    load::{InsertHandler, Loader, LoaderOptions},
    mapping::Mapping,
    transform::{TransformOptions, Transformer},
};

/// In-memory store that rejects any batch holding a statement it cannot
/// accept, the way a transactional backend rolls back the whole batch.
#[derive(Default)]
struct FlakyStore {
    committed: Vec<String>,
    transactions: usize,
    order: Vec<&'static str>,
}

impl InsertHandler for FlakyStore {
    fn insert(&mut self, batch: &[String]) -> Result<(), LoadingError> {
        self.transactions += 1;
        if let Some(bad) = batch.iter().find(|statement| statement.contains("broken")) {
            return Err(LoadingError::new(
                "[THW08] Invalid Thing Write: the type 'identity' is not allowed to play the role 'marking:object-marking'",
                bad.clone(),
                batch.len(),
            ));
        }
        for statement in batch {
            self.order.push(if statement.starts_with("match") {
                "match"
            } else {
                "insert"
            });
        }
        self.committed.extend(batch.iter().cloned());
        Ok(())
    }
}

#[test]
fn one_bad_statement_does_not_block_its_batch() {
    let statements: Vec<String> = ["a", "b", "broken", "d", "e"]
        .iter()
        .map(|name| format!("insert\n$v0 isa {name};\n"))
        .collect();
    let mut store = FlakyStore::default();
    let summary = Loader::new(LoaderOptions { batch_size: 5 }).load(&mut store, &statements);

    assert_eq!(summary.statements, 5);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.rejected, 1);
    assert_eq!(store.committed.len(), 4);
    assert_eq!(store.transactions, 6);

    let error = &summary.errors[0];
    assert_eq!(error.batch_size(), 1);
    assert!(error.statement().contains("broken"));
    assert_eq!(
        error.message(),
        "[THW08] Referenced STIX objects of type 'identity' are not valid for the property 'marking'"
    );
    assert!(error.to_string().starts_with("Insert query skipped"));
}

#[test]
fn slots_load_in_dependency_order() {
    let mapping = Arc::new(Mapping::builtin().expect("builtin mapping"));
    let transformer = Transformer::new(mapping, TransformOptions::default());
    let objects: Vec<Map<String, Value>> = [
        json!({
            "type": "relationship",
            "id": "relationship--1",
            "relationship_type": "uses",
            "source_ref": "malware--1",
            "target_ref": "tool--1"
        }),
        json!({
            "type": "tool",
            "id": "tool--1",
            "name": "nmap",
            "created_by_ref": "identity--1"
        }),
        json!({"type": "identity", "id": "identity--1", "name": "ACME"}),
    ]
    .into_iter()
    .filter_map(|value| match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
    .collect();
    let output = transformer.transform_all(&objects);

    let mut store = FlakyStore::default();
    let summary = Loader::new(LoaderOptions { batch_size: 2 }).load_output(&mut store, &output);
    assert!(summary.is_clean());
    assert_eq!(summary.inserted, 4);
    // two entity statements, then the relation, then the embedded relation
    assert_eq!(store.order, ["insert", "insert", "match", "match"]);
    assert!(store.committed[2].contains("isa uses"));
    assert!(store.committed[3].contains("isa created-by-ref"));
}
