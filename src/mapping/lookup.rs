//! Pure lookups over a [`Mapping`] snapshot.

use serde_json::{Map, Value};

use super::documents::{
    AttributeInfo, CompositeMapping, DictionaryItem, DictionaryMapping, KeyValueMapping,
    ObjectMapping,
};
use super::value_type::ValueType;
use super::{Mapping, ObjectClass, ROLE_SEPARATOR};
use crate::error::MappingError;

/// Separator between the type prefix and the UUID of a STIX identifier.
const ID_SEPARATOR: &str = "--";

/// STIX type encoded in an identifier (`malware--1234` -> `malware`).
pub fn type_from_id(stix_id: &str) -> Option<&str> {
    stix_id
        .split_once(ID_SEPARATOR)
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
}

/// Splits an embedded relation name into `(object role, value role)`.
pub fn split_roles(name: &str) -> Result<(&str, &str), MappingError> {
    name.split_once(ROLE_SEPARATOR)
        .filter(|(object, value)| !object.is_empty() && !value.is_empty())
        .ok_or_else(|| {
            MappingError::Missing(format!(
                "embedded relation name '{name}' must be 'objectRole{ROLE_SEPARATOR}valueRole'"
            ))
        })
}

impl Mapping {
    /// Class of a STIX type; `None` for custom or unmapped types.
    pub fn class_of(&self, stix_type: &str) -> Option<ObjectClass> {
        self.classes.get(stix_type).copied()
    }

    fn object(&self, stix_type: &str) -> Result<&ObjectMapping, MappingError> {
        self.objects.get(stix_type).ok_or_else(|| {
            MappingError::Missing(format!("no mapping defined for STIX type '{stix_type}'"))
        })
    }

    /// Resolves the concrete target type of an object.
    ///
    /// Applies the static type, then subtype selection, then the override of
    /// the single predefined extension present. Returns `Ok(None)` for types
    /// the mapping does not know.
    pub fn target_type_name(
        &self,
        stix_id: &str,
        stix_type: &str,
        properties: &Map<String, Value>,
        extensions: Option<&Map<String, Value>>,
    ) -> Result<Option<String>, MappingError> {
        let Some(object) = self.objects.get(stix_type) else {
            return Ok(None);
        };
        let mut type_name = object.type_name.clone();

        if let Some(subtypes) = &object.subtypes {
            let value = properties.get(&subtypes.property).ok_or_else(|| {
                MappingError::SubtypePropertyMissing {
                    stix_type: stix_type.to_string(),
                    property: subtypes.property.clone(),
                }
            })?;
            let key = subtype_key(value);
            type_name = subtypes
                .resolve(&key)
                .ok_or_else(|| MappingError::SubtypeUndefined {
                    stix_id: stix_id.to_string(),
                    stix_type: stix_type.to_string(),
                    property: subtypes.property.clone(),
                    value: key.clone(),
                })?
                .to_string();
        }

        if let Some(extension) = self.relevant_extension(stix_id, stix_type, extensions)? {
            if let Some(override_type) = object
                .extensions
                .get(extension)
                .and_then(|ext| ext.type_name.as_ref())
            {
                type_name = override_type.clone();
            }
        }
        Ok(Some(type_name))
    }

    /// The single predefined extension present on an object, if any.
    ///
    /// Two or more predefined extensions on one object are an error; custom
    /// extensions are ignored.
    pub fn relevant_extension<'e>(
        &self,
        stix_id: &str,
        stix_type: &str,
        extensions: Option<&'e Map<String, Value>>,
    ) -> Result<Option<&'e str>, MappingError> {
        let (Some(object), Some(extensions)) = (self.objects.get(stix_type), extensions) else {
            return Ok(None);
        };
        let mut found: Option<&'e str> = None;
        for name in extensions.keys() {
            if !object.extensions.contains_key(name) {
                continue;
            }
            if let Some(first) = found {
                return Err(MappingError::ExtensionConflict {
                    stix_id: stix_id.to_string(),
                    stix_type: stix_type.to_string(),
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
            found = Some(name.as_str());
        }
        Ok(found)
    }

    /// Returns `true` when `extension` is predefined for `stix_type`.
    pub fn is_defined_extension(
        &self,
        stix_type: &str,
        extension: &str,
    ) -> Result<bool, MappingError> {
        Ok(self.object(stix_type)?.extensions.contains_key(extension))
    }

    /// Least specific target type of a STIX type, used to match referenced
    /// objects by id.
    pub fn supertype(&self, stix_type: &str) -> Result<&str, MappingError> {
        Ok(self.object(stix_type)?.type_name.as_str())
    }

    /// Attribute info of a property; `Ok(None)` for custom properties.
    ///
    /// Common attributes take precedence over type-specific ones.
    pub fn attribute_info(
        &self,
        stix_type: &str,
        property: &str,
    ) -> Result<Option<&AttributeInfo>, MappingError> {
        if let Some(info) = self.common.get(property) {
            return Ok(Some(info));
        }
        Ok(self.object(stix_type)?.attributes.get(property))
    }

    /// Attribute info of a property inside a predefined extension.
    pub fn extension_attribute_info(
        &self,
        stix_type: &str,
        extension: &str,
        property: &str,
    ) -> Result<Option<&AttributeInfo>, MappingError> {
        let object = self.object(stix_type)?;
        let ext = object.extensions.get(extension).ok_or_else(|| {
            MappingError::Missing(format!(
                "extension '{extension}' is not defined for '{stix_type}'"
            ))
        })?;
        Ok(ext.attributes.get(property))
    }

    /// Properties of an SRO type that name role players, sorted.
    pub fn roleplayer_properties(&self, stix_type: &str) -> Result<Vec<&str>, MappingError> {
        let mut properties: Vec<&str> = self
            .object(stix_type)?
            .attributes
            .iter()
            .filter(|(_, info)| info.value_type == ValueType::Roleplayer)
            .map(|(property, _)| property.as_str())
            .collect();
        properties.sort_unstable();
        Ok(properties)
    }

    /// Role played through `property` in relations of type `relation_type`.
    pub fn role_for(&self, relation_type: &str, property: &str) -> Result<&str, MappingError> {
        self.roles
            .get(relation_type)
            .and_then(|roles| roles.get(property))
            .map(String::as_str)
            .ok_or_else(|| {
                MappingError::Missing(format!(
                    "no role defined for '{property}' in relation '{relation_type}'"
                ))
            })
    }

    /// Composite schema by name.
    pub fn composite(&self, name: &str) -> Result<&CompositeMapping, MappingError> {
        self.composites
            .get(name)
            .ok_or_else(|| MappingError::Missing(format!("composite type '{name}' is not defined")))
    }

    /// Attribute info of a property inside a composite.
    pub fn composite_attribute_info(
        &self,
        name: &str,
        property: &str,
    ) -> Result<&AttributeInfo, MappingError> {
        self.composite(name)?.attributes.get(property).ok_or_else(|| {
            MappingError::Missing(format!(
                "property '{property}' is not defined for composite '{name}'"
            ))
        })
    }

    /// Key-value schema by name.
    pub fn key_value(&self, name: &str) -> Result<&KeyValueMapping, MappingError> {
        self.key_values.get(name).ok_or_else(|| {
            MappingError::Missing(format!("key-value type '{name}' is not defined"))
        })
    }

    /// Dictionary storage scheme.
    pub fn dictionary(&self) -> &DictionaryMapping {
        &self.dictionary
    }

    /// Item entity for dictionary values of `value_type`; lists use their
    /// element type.
    pub fn dictionary_item(&self, value_type: &ValueType) -> Result<&DictionaryItem, MappingError> {
        let tag = value_type.element_type().to_string();
        self.dictionary.subitems.get(&tag).ok_or_else(|| {
            MappingError::Missing(format!("dictionary values of type '{tag}' are not supported"))
        })
    }
}

impl KeyValueMapping {
    /// Item entity type for a known key.
    pub fn item_type(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// Known keys, sorted.
    pub fn valid_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }
}

fn subtype_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}
