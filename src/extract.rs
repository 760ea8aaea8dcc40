//! Reading STIX bundles.
//!
//! Accepts a bundle (`{"type": "bundle", "objects": [...]}`) or a bare array
//! of objects. Two legacy layouts are folded into the extension form the
//! mapping expects:
//!
//! - `x509_v3_extensions` on an `x509-certificate` moves to
//!   `extensions["x509-v3-extensions"]`;
//! - `definition` on a `marking-definition` moves to
//!   `extensions["definition-<definition_type>"]`.
//!
//! `created` and `modified` timestamps at or after the start of the read are
//! reset to [`BASE_TIME`].

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::ParsingError;
use crate::transform::Timestamp;

/// Replacement for `created`/`modified` values that are not in the past.
pub const BASE_TIME: &str = "1970-01-01T00:00:00Z";
const TIMESTAMP_PROPERTIES: [&str; 2] = ["created", "modified"];

const X509_LEGACY_PROPERTY: &str = "x509_v3_extensions";
const X509_EXTENSION: &str = "x509-v3-extensions";
const MARKING_DEFINITION_TYPES: [&str; 2] = ["tlp", "statement"];

/// Reads and decodes the bundle at `path`.
pub fn read_bundle(path: &Path) -> Result<Vec<Map<String, Value>>, ParsingError> {
    let text = fs::read_to_string(path).map_err(|source| ParsingError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bundle(&text, &path.display().to_string())
}

/// Decodes a bundle from `text`; `datasource` names the source in errors.
pub fn parse_bundle(text: &str, datasource: &str) -> Result<Vec<Map<String, Value>>, ParsingError> {
    parse_bundle_at(text, datasource, OffsetDateTime::now_utc())
}

/// Like [`parse_bundle`], with `start` as the start of the read.
pub fn parse_bundle_at(
    text: &str,
    datasource: &str,
    start: OffsetDateTime,
) -> Result<Vec<Map<String, Value>>, ParsingError> {
    let document: Value = serde_json::from_str(text).map_err(|source| ParsingError::Json {
        datasource: datasource.to_string(),
        source,
    })?;
    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut bundle)
            if bundle.get("type").and_then(Value::as_str) == Some("bundle") =>
        {
            match bundle.remove("objects") {
                None => Vec::new(),
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    return Err(ParsingError::NotABundle {
                        datasource: datasource.to_string(),
                    })
                }
            }
        }
        _ => {
            return Err(ParsingError::NotABundle {
                datasource: datasource.to_string(),
            })
        }
    };

    let objects = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let invalid = |reason: &str| ParsingError::InvalidObject {
                datasource: datasource.to_string(),
                index,
                reason: reason.to_string(),
            };
            match entry {
                Value::Object(object) => adapt(object, start).map_err(|reason| invalid(&reason)),
                _ => Err(invalid("not a JSON object")),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(datasource, objects = objects.len(), "extract.bundle.read");
    Ok(objects)
}

fn adapt(mut object: Map<String, Value>, start: OffsetDateTime) -> Result<Map<String, Value>, String> {
    match object.get("type").and_then(Value::as_str) {
        Some("x509-certificate") => {
            if let Some(legacy) = object.remove(X509_LEGACY_PROPERTY) {
                extensions_mut(&mut object)?.insert(X509_EXTENSION.to_string(), legacy);
            }
        }
        Some("marking-definition") => {
            if let Some(definition) = object.remove("definition") {
                let kind = object
                    .get("definition_type")
                    .and_then(Value::as_str)
                    .ok_or("a legacy marking definition needs a definition_type")?;
                if !MARKING_DEFINITION_TYPES.contains(&kind) {
                    return Err(format!("unsupported marking definition type '{kind}'"));
                }
                let name = format!("definition-{kind}");
                extensions_mut(&mut object)?.insert(name, definition);
            }
        }
        _ => {}
    }
    for property in TIMESTAMP_PROPERTIES {
        let Some(raw) = object.get(property).and_then(Value::as_str) else {
            continue;
        };
        // malformed values are left for the transform stage to report
        let Ok(timestamp) = Timestamp::parse(raw) else {
            continue;
        };
        if timestamp.instant() >= start {
            warn!(property, value = raw, "extract.timestamp.reset");
            object.insert(property.to_string(), Value::from(BASE_TIME));
        }
    }
    Ok(object)
}

fn extensions_mut(object: &mut Map<String, Value>) -> Result<&mut Map<String, Value>, String> {
    object
        .entry("extensions")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| "extensions must be an object".to_string())
}
