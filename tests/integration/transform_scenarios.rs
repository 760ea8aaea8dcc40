#![allow(missing_docs)]

use std::sync::Arc;

use serde_json::{json, Map, Value};
use stixgraph::{
    error::{MappingError, ObjectError},
    extract,
    mapping::{Mapping, ID_ATTRIBUTE},
    transform::{OrderedQueries, SkipReason, TransformOptions, Transformer},
    typeql::{render_insert_query, Entity, Thing},
};

fn transformer() -> Transformer {
    let mapping = Mapping::builtin().expect("builtin mapping");
    Transformer::new(Arc::new(mapping), TransformOptions::default())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn convert(value: Value) -> OrderedQueries {
    transformer()
        .convert(&object(value))
        .expect("conversion")
        .queries
}

#[test]
fn attack_pattern_becomes_one_entity() {
    let queries = convert(json!({
        "type": "attack-pattern",
        "id": "attack-pattern--0001",
        "name": "X"
    }));
    let entities = queries.entities.expect("entity batch");
    assert!(queries.relations.is_none());
    assert!(queries.embedded.is_none());
    assert!(entities.match_clause().is_empty());
    assert_eq!(
        entities.insert_clause(),
        &[Thing::Entity(
            Entity::with_variable("x", "attack-pattern")
                .with_attribute(ID_ATTRIBUTE, "\"attack-pattern--0001\"")
                .with_attribute("name", "\"X\"")
        )]
    );
    assert_eq!(
        render_insert_query(&entities).expect("render"),
        "insert\n$v0 isa attack-pattern, has stix-id \"attack-pattern--0001\", has name \"X\";\n"
    );
}

#[test]
fn relationship_goes_to_relation_batch() {
    let queries = convert(json!({
        "type": "relationship",
        "id": "relationship--0001",
        "spec_version": "2.1",
        "relationship_type": "uses",
        "source_ref": "malware--0001",
        "target_ref": "attack-pattern--0001",
        "created": "2024-05-02T14:10:11.123Z"
    }));
    assert!(queries.entities.is_none());
    assert!(queries.embedded.is_none());
    let relations = queries.relations.expect("relation batch");
    let text = render_insert_query(&relations).expect("render");
    assert_eq!(
        text,
        "match\n\
         $v1 isa malware, has stix-id \"malware--0001\";\n\
         $v2 isa attack-pattern, has stix-id \"attack-pattern--0001\";\n\
         insert\n\
         $v0 (user: $v1, used: $v2) isa uses, has stix-id \"relationship--0001\", \
         has spec-version \"2.1\", has created 2024-05-02T14:10:11.123;\n"
    );
}

#[test]
fn sighting_collects_list_roleplayers() {
    let queries = convert(json!({
        "type": "sighting",
        "id": "sighting--0001",
        "sighting_of_ref": "indicator--0001",
        "where_sighted_refs": ["identity--0001", "identity--0002"],
        "count": 3
    }));
    let relations = queries.relations.expect("relation batch");
    assert_eq!(relations.match_clause().len(), 3);
    let sighting = relations.insert_clause()[0]
        .as_relation()
        .expect("relation");
    assert_eq!(sighting.players("sighted-at").map(<[String]>::len), Some(2));
    assert_eq!(sighting.players("sighting-of").map(<[String]>::len), Some(1));
    assert_eq!(sighting.attributes().get("count"), Some(&["3".to_string()][..]));
}

#[test]
fn embedded_references_run_last() {
    let queries = convert(json!({
        "type": "malware",
        "id": "malware--0001",
        "is_family": false,
        "name": "dropper",
        "created_by_ref": "identity--0001",
        "object_marking_refs": ["marking-definition--0001", "marking-definition--0002"],
        "external_references": [
            {"source_name": "capec", "external_id": "CAPEC-1", "hashes": {"SHA-256": "abc"}}
        ]
    }));
    let entities = queries.entities.expect("entity batch");
    let main = entities.insert_clause()[0].as_entity().expect("entity");
    assert_eq!(main.type_name(), "malware-instance");
    // malware, external reference, its relation, hash entity, hash relation
    assert_eq!(entities.insert_clause().len(), 5);

    let embedded = queries.embedded.expect("embedded batch");
    assert_eq!(embedded.insert_clause().len(), 3);
    assert_eq!(embedded.match_clause().len(), 6);
    let types: Vec<&str> = embedded
        .insert_clause()
        .iter()
        .map(Thing::type_name)
        .collect();
    assert_eq!(types, ["created-by-ref", "object-marking", "object-marking"]);
}

#[test]
fn dictionary_properties_stay_distinguishable() {
    let mapping = Mapping::builtin().expect("builtin mapping");
    let transformer = Transformer::new(Arc::new(mapping), TransformOptions::default());
    let conversion = transformer
        .convert(&object(json!({
            "type": "process",
            "id": "process--0001",
            "environment_variables": {"PATH": "/usr/bin"},
            "extensions": {
                "windows-process-ext": {"startup_info": {"lpTitle": "cmd"}}
            }
        })))
        .expect("conversion");
    assert!(conversion.skipped.is_empty(), "{:?}", conversion.skipped);
    let entities = conversion.queries.entities.expect("entity batch");
    let names: Vec<String> = entities
        .insert_clause()
        .iter()
        .filter(|thing| thing.type_name() == "has-dictionary")
        .filter_map(|thing| thing.attributes().get("name"))
        .map(|values| values.join(","))
        .collect();
    assert_eq!(names, ["\"environment-variables\"", "\"startup-info\""]);
}

#[test]
fn conflicting_extensions_are_a_mapping_error() {
    let err = transformer()
        .convert(&object(json!({
            "type": "network-traffic",
            "id": "network-traffic--0001",
            "protocols": ["tcp"],
            "extensions": {"http-request-ext": {"request_method": "get"}, "icmp-ext": {}}
        })))
        .expect_err("conflict");
    assert!(err.is_config());
    assert!(matches!(
        err,
        ObjectError::Config(MappingError::ExtensionConflict { .. })
    ));
}

#[test]
fn bundle_run_is_best_effort() {
    let bundle = json!({
        "type": "bundle",
        "id": "bundle--0001",
        "objects": [
            {"type": "identity", "id": "identity--0001", "name": "ACME", "identity_class": "organization"},
            {"type": "indicator", "id": "indicator--0001", "name": "bad", "valid_from": "soon", "x_score": 4},
            {"type": "relationship", "id": "relationship--0001", "relationship_type": "uses"},
            {"type": "x509-certificate", "id": "x509-certificate--0001",
             "x509_v3_extensions": {"key_usage": "digitalSignature"}}
        ]
    });
    let objects = extract::parse_bundle(&bundle.to_string(), "inline").expect("bundle");
    let output = transformer().transform_all(&objects);
    assert_eq!(output.objects, 4);
    assert_eq!(output.entities.len(), 3);
    assert!(output.relations.is_empty());
    assert_eq!(output.failures.len(), 1);
    assert_eq!(
        output.failures[0].stix_id.as_deref(),
        Some("relationship--0001")
    );
    let skipped: Vec<(&str, &SkipReason)> = output
        .skipped
        .iter()
        .map(|(_, skipped)| (skipped.name.as_str(), &skipped.reason))
        .collect();
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0].0, "valid_from");
    assert!(matches!(skipped[0].1, SkipReason::InvalidValue(_)));
    assert_eq!(skipped[1], ("x_score", &SkipReason::Unmapped));

    let certificate = output.entities[2].insert_clause()[0]
        .as_entity()
        .expect("entity");
    assert_eq!(certificate.type_name(), "x509-v3-extensions");
    assert_eq!(
        certificate.attributes().get("key-usage"),
        Some(&["\"digitalSignature\"".to_string()][..])
    );
}
