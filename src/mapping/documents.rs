//! Typed shapes of the mapping documents.
//!
//! Decoding rejects unknown fields, so a misspelled key fails at load time
//! instead of silently disabling part of the mapping.

use rustc_hash::FxHashMap;
use serde::Deserialize;

use super::value_type::ValueType;

/// Key of the fallback entry in a subtype table.
pub const DEFAULT_SUBTYPE_KEY: &str = "_";

/// Target attribute of one STIX property.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeInfo {
    /// Attribute (or relation role pair) name in the target schema.
    pub typedb_name: String,
    /// Declared value type.
    #[serde(rename = "typedb_value_type")]
    pub value_type: ValueType,
    /// STIX-side type of the property; informational only.
    #[serde(default)]
    pub stix_value_type: Option<String>,
}

/// Property name to attribute info.
pub type AttributeTable = FxHashMap<String, AttributeInfo>;

/// `classes.json`: STIX types grouped by object class.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassesDocument {
    /// Domain objects.
    #[serde(rename = "STIXDomainObject", default)]
    pub domain_objects: Vec<String>,
    /// Relationship objects.
    #[serde(rename = "STIXRelationshipObject", default)]
    pub relationship_objects: Vec<String>,
    /// Cyber-observable objects.
    #[serde(rename = "STIXCyberObservable", default)]
    pub cyber_observables: Vec<String>,
    /// Meta objects.
    #[serde(rename = "STIXMetaObject", default)]
    pub meta_objects: Vec<String>,
}

/// Mapping of one STIX object type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectMapping {
    /// Target type, and the supertype used when the object is referenced.
    #[serde(rename = "typedb-thing-type")]
    pub type_name: String,
    /// Subtype selection keyed by one property's value.
    #[serde(default)]
    pub subtypes: Option<SubtypeTable>,
    /// Predefined extensions.
    #[serde(default)]
    pub extensions: FxHashMap<String, ExtensionMapping>,
    /// Type-specific attributes.
    #[serde(default)]
    pub attributes: AttributeTable,
}

/// Subtype table: `{"<property>": {"<lower-cased value>": "<type>", "_": "<default>"}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "FxHashMap<String, FxHashMap<String, String>>")]
pub struct SubtypeTable {
    /// Property whose value selects the subtype.
    pub property: String,
    /// Lower-cased value to target type.
    pub values: FxHashMap<String, String>,
}

impl SubtypeTable {
    /// Target type for `value`, falling back to the default entry.
    pub fn resolve(&self, value: &str) -> Option<&str> {
        self.values
            .get(value)
            .or_else(|| self.values.get(DEFAULT_SUBTYPE_KEY))
            .map(String::as_str)
    }
}

impl TryFrom<FxHashMap<String, FxHashMap<String, String>>> for SubtypeTable {
    type Error = String;

    fn try_from(raw: FxHashMap<String, FxHashMap<String, String>>) -> Result<Self, Self::Error> {
        if raw.len() != 1 {
            return Err(format!(
                "subtypes must be keyed by exactly one property (found {})",
                raw.len()
            ));
        }
        let (property, values) = raw
            .into_iter()
            .next()
            .ok_or_else(|| "subtypes table is empty".to_string())?;
        Ok(Self { property, values })
    }
}

/// Mapping of one predefined extension.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionMapping {
    /// Target type overriding the base type; the base type is kept when absent.
    #[serde(rename = "typedb-thing-type", default)]
    pub type_name: Option<String>,
    /// Attributes of the extension object.
    #[serde(default)]
    pub attributes: AttributeTable,
}

/// Helper relation linking an owner to a helper entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelperRelation {
    /// Relation type.
    #[serde(rename = "relation-name")]
    pub relation_name: String,
    /// Role played by the owner.
    #[serde(rename = "object-role")]
    pub object_role: String,
    /// Role played by the helper entity.
    #[serde(rename = "value-role", alias = "item-role")]
    pub value_role: String,
}

/// `composites.json` entry: a nested STIX object stored as a helper entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeMapping {
    /// Helper entity type.
    #[serde(rename = "typedb-name")]
    pub type_name: String,
    /// Attributes of the nested object.
    pub attributes: AttributeTable,
    /// Relation linking owner and helper entity.
    #[serde(rename = "helper-relation")]
    pub relation: HelperRelation,
}

/// Fallback scheme for keys missing from a key-value lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomKey {
    /// Entity type used for unknown keys.
    #[serde(rename = "entity-name")]
    pub entity_name: String,
    /// Attribute holding the original key.
    #[serde(rename = "name-attribute")]
    pub name_attribute: String,
}

/// `key-value-pairs.json` entry, e.g. `hashes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyValueMapping {
    /// Type of every value.
    pub value_type: ValueType,
    /// Attribute holding the value on the item entity.
    pub attribute_name: String,
    /// Known key to item entity type.
    pub keys: FxHashMap<String, String>,
    /// Relation linking owner and item.
    pub relation: HelperRelation,
    /// Scheme for unknown keys; unknown keys are rejected without it.
    #[serde(default)]
    pub custom: Option<CustomKey>,
}

/// Item entity of one dictionary value type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DictionaryItem {
    /// Item entity type.
    pub entity: String,
    /// Attribute holding the value.
    #[serde(rename = "value-attribute")]
    pub value_attribute: String,
}

/// `dictionary.json`: storage scheme of open-ended key/value maps.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DictionaryMapping {
    /// Attribute holding the dictionary key on the item entity.
    pub attribute_key: String,
    /// Attribute holding the source property name on the relation.
    pub attribute_property: String,
    /// Relation linking owner and item.
    pub relation: HelperRelation,
    /// Primitive value-type tag to item entity.
    pub subitems: FxHashMap<String, DictionaryItem>,
}

/// `sros_roles.json`: relation type to (property to role).
pub type RoleTable = FxHashMap<String, FxHashMap<String, String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_table_falls_back_to_default() {
        let table: SubtypeTable = serde_json::from_str(
            r#"{"relationship_type": {"uses": "uses", "_": "custom-relationship"}}"#,
        )
        .expect("decode");
        assert_eq!(table.property, "relationship_type");
        assert_eq!(table.resolve("uses"), Some("uses"));
        assert_eq!(table.resolve("hosts"), Some("custom-relationship"));
    }

    #[test]
    fn subtype_table_needs_one_property() {
        let decoded: Result<SubtypeTable, _> =
            serde_json::from_str(r#"{"a": {"x": "y"}, "b": {"x": "y"}}"#);
        assert!(decoded.is_err());
    }

    #[test]
    fn attribute_info_rejects_unknown_fields() {
        let decoded: Result<AttributeInfo, _> = serde_json::from_str(
            r#"{"typedb_name": "name", "typedb_value_type": "string", "extra": 1}"#,
        );
        assert!(decoded.is_err());
        let decoded: Result<AttributeInfo, _> =
            serde_json::from_str(r#"{"typedb_name": "name", "typedb_value_type": "strng"}"#);
        assert!(decoded.is_err());
    }

    #[test]
    fn helper_relation_accepts_item_role_alias() {
        let relation: HelperRelation = serde_json::from_str(
            r#"{"relation-name": "has-hash", "object-role": "resource", "item-role": "hash"}"#,
        )
        .expect("decode");
        assert_eq!(relation.value_role, "hash");
    }
}
