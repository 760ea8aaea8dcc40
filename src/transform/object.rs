//! Per-object conversion: type resolution, property iteration and bundle
//! assembly.

use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::bundle::{Identification, QueryBundle};
use super::value::{RenderContext, ValueConverter};
use super::TransformOptions;
use crate::error::{ConvertError, ObjectError, TransformError, TransformErrorKind};
use crate::mapping::lookup::type_from_id;
use crate::mapping::{Mapping, ObjectClass};
use crate::typeql::{quote_string, Entity, Relation, VariableDealer};

/// Relation type used for relationships outside the predefined vocabulary.
const CUSTOM_RELATIONSHIP: &str = "custom-relationship";

/// Attribute storing the original `relationship_type` of a custom relationship.
const RELATION_NAME_ATTRIBUTE: &str = "relation-name";

/// Why a property did not make it into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The mapping has no entry for the property.
    Unmapped,
    /// The value does not fit the declared type.
    InvalidValue(String),
    /// The mapping could not answer a lookup the value needed.
    Mapping(String),
}

/// A property dropped from a lenient conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProperty {
    /// Property name, prefixed with the extension name for extension properties.
    pub name: String,
    /// Why it was dropped.
    pub reason: SkipReason,
}

impl SkippedProperty {
    fn new(name: String, err: ConvertError) -> Self {
        let reason = match err {
            ConvertError::Mapping(err) => SkipReason::Mapping(err.to_string()),
            ConvertError::Value(err) => SkipReason::InvalidValue(err.to_string()),
        };
        Self { name, reason }
    }
}

impl fmt::Display for SkippedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SkipReason::Unmapped => write!(f, "{}: not mapped", self.name),
            SkipReason::InvalidValue(reason) => write!(f, "{}: {reason}", self.name),
            SkipReason::Mapping(reason) => write!(f, "{}: {reason}", self.name),
        }
    }
}

/// Statements and warnings produced for one object.
#[derive(Debug, Default)]
pub(crate) struct Built {
    pub bundle: QueryBundle,
    pub skipped: Vec<SkippedProperty>,
}

/// Attribute values and helper statements gathered from properties.
#[derive(Default)]
struct Collected {
    attributes: Vec<(String, Vec<String>)>,
    extra: QueryBundle,
    skipped: Vec<SkippedProperty>,
}

/// Converter for one STIX object.
pub(crate) struct ObjectConverter<'a> {
    mapping: &'a Mapping,
    options: TransformOptions,
    object: &'a Map<String, Value>,
    stix_id: &'a str,
    stix_type: &'a str,
    class: Option<ObjectClass>,
}

impl<'a> ObjectConverter<'a> {
    /// Reads the identifying properties of `object` and picks its class.
    pub fn create(
        mapping: &'a Mapping,
        options: TransformOptions,
        object: &'a Map<String, Value>,
    ) -> Result<Self, TransformError> {
        let stix_id = required_string(object, "id", None)?;
        let stix_type = required_string(object, "type", Some(stix_id))?;
        Ok(Self {
            mapping,
            options,
            object,
            stix_id,
            stix_type,
            class: mapping.class_of(stix_type),
        })
    }

    /// Identifier of the object.
    pub fn stix_id(&self) -> &'a str {
        self.stix_id
    }

    /// Class of the object; `None` for custom types.
    pub fn class(&self) -> Option<ObjectClass> {
        self.class
    }

    /// Converts the object into a bundle.
    pub fn build(&self, vars: &mut VariableDealer) -> Result<Built, ObjectError> {
        let Some(class) = self.class else {
            warn!(
                stix_id = self.stix_id,
                stix_type = self.stix_type,
                "transform.object.custom_type"
            );
            return Ok(Built::default());
        };
        let extensions = self.extensions()?;
        let type_name = self
            .mapping
            .target_type_name(self.stix_id, self.stix_type, self.object, extensions)?
            .ok_or_else(|| {
                self.error(TransformErrorKind::UnsupportedCustomType)
                    .with_detail(self.stix_type)
            })?;
        debug!(stix_id = self.stix_id, %class, type_name = %type_name, "transform.object.start");

        match class {
            ObjectClass::Relationship => self.build_relation(&type_name, extensions, vars),
            ObjectClass::Domain | ObjectClass::CyberObservable | ObjectClass::Meta => {
                self.build_entity(&type_name, extensions, vars)
            }
        }
    }

    fn build_entity(
        &self,
        type_name: &str,
        extensions: Option<&Map<String, Value>>,
        vars: &mut VariableDealer,
    ) -> Result<Built, ObjectError> {
        let mut entity = Entity::new(type_name, vars);
        let reference =
            Identification::new(Some(self.stix_id), Some(entity.variable()), Some(type_name));
        let collected = self.collect_all(&[], extensions, &reference, vars)?;
        for (name, values) in collected.attributes {
            for value in values {
                entity.add_attribute(&name, value);
            }
        }

        let mut bundle = QueryBundle::new();
        bundle.add_main_entity(entity)?;
        bundle.extend(collected.extra)?;
        Ok(Built {
            bundle,
            skipped: collected.skipped,
        })
    }

    fn build_relation(
        &self,
        type_name: &str,
        extensions: Option<&Map<String, Value>>,
        vars: &mut VariableDealer,
    ) -> Result<Built, ObjectError> {
        let mut relation = Relation::new(type_name, vars);
        let roleplayers = self.mapping.roleplayer_properties(self.stix_type)?;
        let mut matches = Vec::new();
        for property in &roleplayers {
            let Some(raw) = self.object.get(*property) else {
                continue;
            };
            let ids = self.roleplayer_ids(property, raw)?;
            let role = self.mapping.role_for(type_name, property)?;
            for id in ids {
                let player_type = type_from_id(id).ok_or_else(|| {
                    self.error(TransformErrorKind::InvalidPropertyValue)
                        .with_detail(format!("{property}: '{id}' is not a STIX identifier"))
                })?;
                let supertype = self.mapping.supertype(player_type)?;
                let player = Identification::new(Some(id), None, Some(supertype))
                    .match_object(vars)
                    .map_err(|err| {
                        self.error(TransformErrorKind::InvalidPropertyValue)
                            .with_detail(format!("{property}: {err}"))
                    })?;
                relation.add_roleplayer(role, player.variable());
                matches.push(player);
            }
        }
        if !relation.has_roles() {
            return Err(self
                .error(TransformErrorKind::UnspecifiedProperty)
                .with_detail(roleplayers.join(", "))
                .into());
        }
        if type_name == CUSTOM_RELATIONSHIP {
            if let Some(name) = self.object.get("relationship_type").and_then(Value::as_str) {
                relation.add_attribute(RELATION_NAME_ATTRIBUTE, quote_string(name));
            }
        }

        let reference =
            Identification::new(Some(self.stix_id), Some(relation.variable()), Some(type_name));
        let collected = self.collect_all(&roleplayers, extensions, &reference, vars)?;
        for (name, values) in collected.attributes {
            for value in values {
                relation.add_attribute(&name, value);
            }
        }

        let mut bundle = QueryBundle::new();
        bundle.add_main_relation(relation, matches)?;
        bundle.extend(collected.extra)?;
        Ok(Built {
            bundle,
            skipped: collected.skipped,
        })
    }

    /// Converts the object's own properties, then the relevant extension.
    fn collect_all(
        &self,
        skip: &[&str],
        extensions: Option<&Map<String, Value>>,
        reference: &Identification,
        vars: &mut VariableDealer,
    ) -> Result<Collected, ObjectError> {
        let mut collected = Collected::default();
        self.collect(self.object, None, skip, reference, vars, &mut collected)?;

        let relevant =
            self.mapping
                .relevant_extension(self.stix_id, self.stix_type, extensions)?;
        for name in extensions.into_iter().flat_map(|map| map.keys()) {
            if relevant != Some(name.as_str())
                && !self.mapping.is_defined_extension(self.stix_type, name)?
            {
                warn!(stix_id = self.stix_id, extension = %name, "transform.extension.custom");
            }
        }
        if let (Some(name), Some(extensions)) = (relevant, extensions) {
            let properties = extensions.get(name).and_then(Value::as_object).ok_or_else(|| {
                self.error(TransformErrorKind::InvalidPropertyType)
                    .with_detail(format!("extensions.{name} must be an object"))
            })?;
            self.collect(properties, Some(name), &[], reference, vars, &mut collected)?;
        }
        Ok(collected)
    }

    fn collect(
        &self,
        properties: &Map<String, Value>,
        extension: Option<&str>,
        skip: &[&str],
        reference: &Identification,
        vars: &mut VariableDealer,
        out: &mut Collected,
    ) -> Result<(), ObjectError> {
        for (property, raw) in properties {
            if skip.contains(&property.as_str()) {
                continue;
            }
            let label = match extension {
                Some(extension) => format!("{extension}.{property}"),
                None => property.clone(),
            };
            let info = match extension {
                Some(extension) => {
                    self.mapping
                        .extension_attribute_info(self.stix_type, extension, property)?
                }
                None => self.mapping.attribute_info(self.stix_type, property)?,
            };
            let Some(info) = info else {
                debug!(stix_id = self.stix_id, property = %label, "transform.property.unmapped");
                out.skipped.push(SkippedProperty {
                    name: label,
                    reason: SkipReason::Unmapped,
                });
                continue;
            };

            let ctx = RenderContext {
                mapping: self.mapping,
                reference,
                attribute_name: &info.typedb_name,
            };
            let rendered = ValueConverter::parse(&info.value_type, raw)
                .map_err(ConvertError::from)
                .and_then(|converter| converter.render(ctx, vars));
            match rendered {
                Ok(rendered) => {
                    if !rendered.values.is_empty() {
                        out.attributes
                            .push((info.typedb_name.clone(), rendered.values));
                    }
                    out.extra.extend(rendered.extra)?;
                }
                Err(err) if self.options.strict => {
                    return Err(ObjectError::from_convert(err, &label, self.stix_id));
                }
                Err(err) => {
                    warn!(stix_id = self.stix_id, property = %label, error = %err, "transform.property.dropped");
                    out.skipped.push(SkippedProperty::new(label, err));
                }
            }
        }
        Ok(())
    }

    fn extensions(&self) -> Result<Option<&'a Map<String, Value>>, TransformError> {
        match self.object.get("extensions") {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(self
                .error(TransformErrorKind::InvalidPropertyType)
                .with_detail("extensions must be an object")),
        }
    }

    fn roleplayer_ids<'v>(
        &self,
        property: &str,
        raw: &'v Value,
    ) -> Result<Vec<&'v str>, TransformError> {
        let ids = match raw {
            Value::String(id) => vec![id.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        self.error(TransformErrorKind::InvalidPropertyValue)
                            .with_detail(format!("{property}: expected a list of identifiers"))
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(self
                    .error(TransformErrorKind::InvalidPropertyType)
                    .with_detail(property.to_string()))
            }
        };
        if ids.is_empty() || ids.iter().any(|id| id.is_empty()) {
            return Err(self
                .error(TransformErrorKind::UnspecifiedProperty)
                .with_detail(property.to_string()));
        }
        Ok(ids)
    }

    fn error(&self, kind: TransformErrorKind) -> TransformError {
        TransformError::new(kind).with_stix_id(self.stix_id)
    }
}

fn required_string<'o>(
    object: &'o Map<String, Value>,
    property: &str,
    stix_id: Option<&str>,
) -> Result<&'o str, TransformError> {
    let tag = |err: TransformError| match stix_id {
        Some(id) => err.with_stix_id(id),
        None => err,
    };
    match object.get(property) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        Some(Value::String(_)) | None => Err(tag(
            TransformError::new(TransformErrorKind::MissingRequiredProperty)
                .with_detail(property.to_string()),
        )),
        Some(_) => Err(tag(
            TransformError::new(TransformErrorKind::InvalidPropertyType)
                .with_detail(property.to_string()),
        )),
    }
}
