//! Declarative STIX to TypeQL mapping.
//!
//! A [`Mapping`] is an immutable snapshot of the ten mapping documents. It is
//! loaded once, validated, and then shared read-only (typically behind an
//! `Arc`) by every conversion. The lookup surface lives in [`lookup`].

pub mod documents;
pub mod lookup;
pub mod value_type;

use std::fmt;
use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::MappingError;
use documents::{
    AttributeTable, ClassesDocument, CompositeMapping, DictionaryMapping, KeyValueMapping,
    ObjectMapping, RoleTable,
};
pub use documents::AttributeInfo;
pub use value_type::{default_value_type, ValueType};

/// Separator inside embedded relation names (`objectRole::valueRole`).
pub const ROLE_SEPARATOR: &str = "::";

/// Attribute holding the STIX identifier on every stored object.
pub const ID_ATTRIBUTE: &str = "stix-id";

const CLASSES: &str = "classes.json";
const SDOS: &str = "sdos.json";
const SROS: &str = "sros.json";
const SCOS: &str = "scos.json";
const SMOS: &str = "smos.json";
const COMMON_ATTRIBUTES: &str = "common_attributes.json";
const COMPOSITES: &str = "composites.json";
const SROS_ROLES: &str = "sros_roles.json";
const KEY_VALUE_PAIRS: &str = "key-value-pairs.json";
const DICTIONARY: &str = "dictionary.json";

/// File names a mapping directory must contain.
pub const DOCUMENT_NAMES: [&str; 10] = [
    CLASSES,
    SDOS,
    SROS,
    SCOS,
    SMOS,
    COMMON_ATTRIBUTES,
    COMPOSITES,
    SROS_ROLES,
    KEY_VALUE_PAIRS,
    DICTIONARY,
];

macro_rules! builtin_document {
    ($name:literal) => {
        ($name, include_str!(concat!("../../assets/mapping/", $name)))
    };
}

const BUILTIN_DOCUMENTS: [(&str, &str); 10] = [
    builtin_document!("classes.json"),
    builtin_document!("sdos.json"),
    builtin_document!("sros.json"),
    builtin_document!("scos.json"),
    builtin_document!("smos.json"),
    builtin_document!("common_attributes.json"),
    builtin_document!("composites.json"),
    builtin_document!("sros_roles.json"),
    builtin_document!("key-value-pairs.json"),
    builtin_document!("dictionary.json"),
];

/// Top-level STIX object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    /// STIX Domain Object.
    Domain,
    /// STIX Relationship Object.
    Relationship,
    /// STIX Cyber-observable Object.
    CyberObservable,
    /// STIX Meta Object.
    Meta,
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectClass::Domain => "SDO",
            ObjectClass::Relationship => "SRO",
            ObjectClass::CyberObservable => "SCO",
            ObjectClass::Meta => "SMO",
        })
    }
}

/// Immutable, validated mapping snapshot.
#[derive(Debug, Clone)]
pub struct Mapping {
    classes: FxHashMap<String, ObjectClass>,
    objects: FxHashMap<String, ObjectMapping>,
    common: AttributeTable,
    composites: FxHashMap<String, CompositeMapping>,
    roles: RoleTable,
    key_values: FxHashMap<String, KeyValueMapping>,
    dictionary: DictionaryMapping,
}

impl Mapping {
    /// Loads the mapping compiled into the crate.
    pub fn builtin() -> Result<Self, MappingError> {
        Self::from_documents(BUILTIN_DOCUMENTS.iter().copied())
    }

    /// Loads the mapping documents found in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, MappingError> {
        let mut sources = Vec::with_capacity(DOCUMENT_NAMES.len());
        for name in DOCUMENT_NAMES {
            let path = dir.join(name);
            let text = fs::read_to_string(&path)
                .map_err(|source| MappingError::Read { path, source })?;
            sources.push((name, text));
        }
        Self::from_documents(
            sources
                .iter()
                .map(|(name, text)| (*name, text.as_str())),
        )
    }

    /// Builds a mapping from `(document name, JSON text)` pairs.
    ///
    /// Every name in [`DOCUMENT_NAMES`] must be present exactly once.
    pub fn from_documents<'a, I>(documents: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let texts: FxHashMap<&str, &str> = documents.into_iter().collect();
        let text = |name: &'static str| {
            texts.get(name).copied().ok_or_else(|| {
                MappingError::Missing(format!("mapping document '{name}' was not provided"))
            })
        };

        let classes_doc: ClassesDocument = decode(CLASSES, text(CLASSES)?)?;
        let mut objects: FxHashMap<String, ObjectMapping> = FxHashMap::default();
        for name in [SDOS, SROS, SCOS, SMOS] {
            let table: FxHashMap<String, ObjectMapping> = decode(name, text(name)?)?;
            for (stix_type, mapping) in table {
                if objects.insert(stix_type.clone(), mapping).is_some() {
                    return Err(MappingError::Inconsistent {
                        document: name,
                        reason: format!("STIX type '{stix_type}' is mapped more than once"),
                    });
                }
            }
        }

        let mut classes = FxHashMap::default();
        for (class, types) in [
            (ObjectClass::Domain, &classes_doc.domain_objects),
            (ObjectClass::Relationship, &classes_doc.relationship_objects),
            (ObjectClass::CyberObservable, &classes_doc.cyber_observables),
            (ObjectClass::Meta, &classes_doc.meta_objects),
        ] {
            for stix_type in types {
                if classes.insert(stix_type.clone(), class).is_some() {
                    return Err(MappingError::Inconsistent {
                        document: CLASSES,
                        reason: format!("STIX type '{stix_type}' belongs to several classes"),
                    });
                }
            }
        }

        let mapping = Self {
            classes,
            objects,
            common: decode(COMMON_ATTRIBUTES, text(COMMON_ATTRIBUTES)?)?,
            composites: decode(COMPOSITES, text(COMPOSITES)?)?,
            roles: decode(SROS_ROLES, text(SROS_ROLES)?)?,
            key_values: decode(KEY_VALUE_PAIRS, text(KEY_VALUE_PAIRS)?)?,
            dictionary: decode(DICTIONARY, text(DICTIONARY)?)?,
        };
        mapping.validate()?;
        debug!(
            types = mapping.objects.len(),
            composites = mapping.composites.len(),
            key_values = mapping.key_values.len(),
            "mapping.loaded"
        );
        Ok(mapping)
    }

    /// Checks cross-document consistency.
    ///
    /// Decoding already guarantees well-formed documents and known value-type
    /// tags; this verifies that references between documents resolve.
    pub fn validate(&self) -> Result<(), MappingError> {
        for (stix_type, class) in &self.classes {
            let Some(object) = self.objects.get(stix_type) else {
                return Err(MappingError::Inconsistent {
                    document: CLASSES,
                    reason: format!("{class} type '{stix_type}' has no object mapping"),
                });
            };
            if *class == ObjectClass::Relationship {
                self.validate_roles(stix_type, object)?;
            }
        }
        for stix_type in self.objects.keys() {
            if !self.classes.contains_key(stix_type) {
                return Err(MappingError::Inconsistent {
                    document: CLASSES,
                    reason: format!("STIX type '{stix_type}' is mapped but has no class"),
                });
            }
        }

        self.validate_table(COMMON_ATTRIBUTES, &self.common)?;
        for object in self.objects.values() {
            self.validate_table(SDOS, &object.attributes)?;
            for extension in object.extensions.values() {
                self.validate_table(SDOS, &extension.attributes)?;
            }
        }
        for composite in self.composites.values() {
            self.validate_table(COMPOSITES, &composite.attributes)?;
        }
        for (name, pairs) in &self.key_values {
            if !pairs.value_type.is_primitive() {
                return Err(MappingError::Inconsistent {
                    document: KEY_VALUE_PAIRS,
                    reason: format!("values of '{name}' must have a primitive type"),
                });
            }
        }
        for tag in self.dictionary.subitems.keys() {
            let value_type: ValueType = tag.parse()?;
            if !value_type.is_primitive() {
                return Err(MappingError::Inconsistent {
                    document: DICTIONARY,
                    reason: format!("dictionary item type '{tag}' is not primitive"),
                });
            }
        }
        Ok(())
    }

    fn validate_table(
        &self,
        document: &'static str,
        table: &AttributeTable,
    ) -> Result<(), MappingError> {
        for (property, info) in table {
            let inconsistent = |reason: String| MappingError::Inconsistent {
                document,
                reason: format!("property '{property}': {reason}"),
            };
            match info.value_type.element_type() {
                ValueType::Composite(name) if !self.composites.contains_key(name) => {
                    return Err(inconsistent(format!("unknown composite '{name}'")));
                }
                ValueType::KeyValue(name) if !self.key_values.contains_key(name) => {
                    return Err(inconsistent(format!("unknown key-value schema '{name}'")));
                }
                ValueType::Relation(_) if !info.typedb_name.contains(ROLE_SEPARATOR) => {
                    return Err(inconsistent(format!(
                        "relation name '{}' must be 'objectRole{ROLE_SEPARATOR}valueRole'",
                        info.typedb_name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_roles(&self, stix_type: &str, object: &ObjectMapping) -> Result<(), MappingError> {
        let mut relation_types: Vec<&str> = match &object.subtypes {
            Some(subtypes) => subtypes.values.values().map(String::as_str).collect(),
            None => vec![object.type_name.as_str()],
        };
        relation_types.extend(
            object
                .extensions
                .values()
                .filter_map(|extension| extension.type_name.as_deref()),
        );
        let roleplayers: Vec<&str> = object
            .attributes
            .iter()
            .filter(|(_, info)| info.value_type == ValueType::Roleplayer)
            .map(|(property, _)| property.as_str())
            .collect();
        for relation_type in relation_types {
            let roles = self.roles.get(relation_type);
            for property in &roleplayers {
                if roles.and_then(|roles| roles.get(*property)).is_none() {
                    return Err(MappingError::Inconsistent {
                        document: SROS_ROLES,
                        reason: format!(
                            "relation '{relation_type}' of '{stix_type}' has no role for '{property}'"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of mapped STIX object types.
    pub fn object_type_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of composite schemas.
    pub fn composite_count(&self) -> usize {
        self.composites.len()
    }

    /// Number of key-value schemas.
    pub fn key_value_count(&self) -> usize {
        self.key_values.len()
    }

    /// Number of relation types with role tables.
    pub fn role_table_count(&self) -> usize {
        self.roles.len()
    }
}

fn decode<T: DeserializeOwned>(document: &str, text: &str) -> Result<T, MappingError> {
    serde_json::from_str(text).map_err(|source| MappingError::Decode {
        document: document.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_mapping_loads_and_validates() {
        let mapping = Mapping::builtin().expect("builtin mapping");
        assert!(mapping.object_type_count() > 40);
        assert!(mapping.composite_count() >= 3);
        assert_eq!(mapping.class_of("attack-pattern"), Some(ObjectClass::Domain));
    }

    #[test]
    fn missing_document_is_reported() {
        let docs: Vec<(&str, &str)> = BUILTIN_DOCUMENTS
            .iter()
            .copied()
            .filter(|(name, _)| *name != DICTIONARY)
            .collect();
        let err = Mapping::from_documents(docs).expect_err("dictionary missing");
        assert!(err.to_string().contains("dictionary.json"));
    }

    #[test]
    fn dangling_composite_reference_is_inconsistent() {
        let common = r#"{
            "id": {"typedb_name": "stix-id", "typedb_value_type": "string"},
            "kill_chain_phases": {"typedb_name": "kcp", "typedb_value_type": "list:composite:nope"}
        }"#;
        let docs = BUILTIN_DOCUMENTS
            .iter()
            .copied()
            .map(|(name, text)| if name == COMMON_ATTRIBUTES { (name, common) } else { (name, text) });
        let err = Mapping::from_documents(docs).expect_err("unknown composite");
        assert!(matches!(err, MappingError::Inconsistent { .. }), "{err}");
    }

    #[test]
    fn loads_from_directory() {
        let dir = tempdir().expect("tempdir");
        for (name, text) in BUILTIN_DOCUMENTS {
            fs::write(dir.path().join(name), text).expect("write document");
        }
        let mapping = Mapping::from_dir(dir.path()).expect("mapping from dir");
        assert_eq!(mapping.class_of("relationship"), Some(ObjectClass::Relationship));
    }

    #[test]
    fn loads_directory_with_stix_value_types() {
        let dir = tempdir().expect("tempdir");
        for (name, text) in BUILTIN_DOCUMENTS {
            let text = if name == COMMON_ATTRIBUTES {
                let mut common: serde_json::Value = serde_json::from_str(text).expect("json");
                common["id"]["stix_value_type"] = serde_json::json!("identifier");
                common.to_string()
            } else {
                text.to_string()
            };
            fs::write(dir.path().join(name), text).expect("write document");
        }
        assert!(dir.path().join("key-value-pairs.json").is_file());
        let mapping = Mapping::from_dir(dir.path()).expect("mapping from dir");
        let info = mapping
            .attribute_info("attack-pattern", "id")
            .expect("lookup")
            .expect("id attribute");
        assert_eq!(info.typedb_name, ID_ATTRIBUTE);
        assert_eq!(info.stix_value_type.as_deref(), Some("identifier"));
    }

    #[test]
    fn unreadable_directory_is_a_read_error() {
        let dir = tempdir().expect("tempdir");
        let err = Mapping::from_dir(&dir.path().join("absent")).expect_err("missing dir");
        assert!(matches!(err, MappingError::Read { .. }));
    }
}
