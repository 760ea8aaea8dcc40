//! Conversion of single STIX property values.
//!
//! A [`ValueConverter`] is parsed from a raw JSON value according to its
//! declared [`ValueType`], then rendered into attribute literals plus any
//! helper statements the value needs. Every kind returns the same
//! [`Rendered`] shape.

use serde_json::{Map, Value};

use super::bundle::{Identification, QueryBundle};
use super::timestamp::Timestamp;
use crate::error::{ConvertError, MappingError, ValueError};
use crate::mapping::lookup::{split_roles, type_from_id};
use crate::mapping::{default_value_type, Mapping, ValueType};
use crate::typeql::{quote_string, Entity, Relation, VariableDealer};

/// Output of rendering one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Attribute literals for the owning thing, in order.
    pub values: Vec<String>,
    /// Helper statements the value needs.
    pub extra: QueryBundle,
}

impl Rendered {
    fn literal(value: String) -> Self {
        Self {
            values: vec![value],
            extra: QueryBundle::new(),
        }
    }

    fn statements(extra: QueryBundle) -> Self {
        Self {
            values: Vec::new(),
            extra,
        }
    }
}

/// What a value renders against.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Mapping snapshot.
    pub mapping: &'a Mapping,
    /// The object owning the property.
    pub reference: &'a Identification,
    /// Target name of the property; role pair for embedded relations.
    pub attribute_name: &'a str,
}

/// A parsed property value, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueConverter {
    /// Renders nothing (`empty` and `roleplayer`).
    Empty,
    /// `true` / `false`.
    Boolean(bool),
    /// Integer literal.
    Long(i64),
    /// Floating point literal.
    Double(f64),
    /// Quoted string literal.
    String(String),
    /// Datetime literal.
    Datetime(Timestamp),
    /// Elements converted with the list's element type.
    List(Vec<ValueConverter>),
    /// Nested object stored as a helper entity.
    Composite {
        /// Composite schema name.
        name: String,
        /// Properties of the nested object.
        fields: Map<String, Value>,
    },
    /// Reference to another object, stored as an embedded relation.
    Relation {
        /// Relation type.
        relation: String,
        /// Identifier of the referenced object.
        target_id: String,
    },
    /// Map with keys from a fixed vocabulary (e.g. hash algorithms).
    KeyValue {
        /// Key-value schema name.
        schema: String,
        /// Raw pairs.
        pairs: Map<String, Value>,
    },
    /// Open-ended map.
    Dictionary(Map<String, Value>),
}

impl ValueConverter {
    /// Parses `raw` as a value of `value_type`.
    pub fn parse(value_type: &ValueType, raw: &Value) -> Result<Self, ValueError> {
        let converter = match value_type {
            ValueType::Empty | ValueType::Roleplayer => ValueConverter::Empty,
            ValueType::Boolean => match raw {
                Value::Bool(flag) => ValueConverter::Boolean(*flag),
                other => return Err(mismatch("a boolean", other)),
            },
            ValueType::Long => ValueConverter::Long(parse_long(raw)?),
            ValueType::Double => ValueConverter::Double(parse_double(raw)?),
            ValueType::String => match raw {
                Value::String(text) => ValueConverter::String(text.clone()),
                other => return Err(mismatch("a string", other)),
            },
            ValueType::Datetime => match raw {
                Value::String(text) => ValueConverter::Datetime(Timestamp::parse(text)?),
                other => return Err(mismatch("a timestamp string", other)),
            },
            ValueType::List(inner) => match raw {
                Value::Array(items) => ValueConverter::List(
                    items
                        .iter()
                        .map(|item| ValueConverter::parse(inner, item))
                        .collect::<Result<_, _>>()?,
                ),
                other => return Err(mismatch("a list", other)),
            },
            ValueType::Composite(name) => ValueConverter::Composite {
                name: name.clone(),
                fields: expect_object(raw)?.clone(),
            },
            ValueType::Relation(relation) => match raw {
                Value::String(target_id) if type_from_id(target_id).is_some() => {
                    ValueConverter::Relation {
                        relation: relation.clone(),
                        target_id: target_id.clone(),
                    }
                }
                other => return Err(mismatch("a STIX identifier", other)),
            },
            ValueType::KeyValue(schema) => ValueConverter::KeyValue {
                schema: schema.clone(),
                pairs: expect_object(raw)?.clone(),
            },
            ValueType::Dictionary => ValueConverter::Dictionary(expect_object(raw)?.clone()),
        };
        Ok(converter)
    }

    /// Renders the value against `ctx`, allocating variables from `vars`.
    pub fn render(
        &self,
        ctx: RenderContext<'_>,
        vars: &mut VariableDealer,
    ) -> Result<Rendered, ConvertError> {
        match self {
            ValueConverter::Empty => Ok(Rendered::default()),
            ValueConverter::Boolean(flag) => Ok(Rendered::literal(flag.to_string())),
            ValueConverter::Long(number) => Ok(Rendered::literal(number.to_string())),
            ValueConverter::Double(number) => Ok(Rendered::literal(format!("{number:?}"))),
            ValueConverter::String(text) => Ok(Rendered::literal(quote_string(text))),
            ValueConverter::Datetime(timestamp) => Ok(Rendered::literal(timestamp.to_string())),
            ValueConverter::List(items) => {
                let mut out = Rendered::default();
                for item in items {
                    let rendered = item.render(ctx, vars)?;
                    out.values.extend(rendered.values);
                    merge(&mut out.extra, rendered.extra)?;
                }
                Ok(out)
            }
            ValueConverter::Composite { name, fields } => {
                render_composite(name, fields, ctx, vars).map(Rendered::statements)
            }
            ValueConverter::Relation {
                relation,
                target_id,
            } => render_embedded_relation(relation, target_id, ctx, vars).map(Rendered::statements),
            ValueConverter::KeyValue { schema, pairs } => {
                render_key_value(schema, pairs, ctx, vars).map(Rendered::statements)
            }
            ValueConverter::Dictionary(entries) => {
                render_dictionary(entries, ctx, vars).map(Rendered::statements)
            }
        }
    }
}

fn render_composite(
    name: &str,
    fields: &Map<String, Value>,
    ctx: RenderContext<'_>,
    vars: &mut VariableDealer,
) -> Result<QueryBundle, ConvertError> {
    let composite = ctx.mapping.composite(name)?;
    let mut entity = Entity::new(&composite.type_name, vars);
    let local = Identification::new(
        None,
        Some(entity.variable()),
        Some(composite.type_name.as_str()),
    );
    let mut nested = QueryBundle::new();
    for (property, raw) in fields {
        let info = ctx.mapping.composite_attribute_info(name, property)?;
        let sub_ctx = RenderContext {
            mapping: ctx.mapping,
            reference: &local,
            attribute_name: &info.typedb_name,
        };
        let rendered = ValueConverter::parse(&info.value_type, raw)?.render(sub_ctx, vars)?;
        for value in rendered.values {
            entity.add_attribute(&info.typedb_name, value);
        }
        merge(&mut nested, rendered.extra)?;
    }

    let owner = ctx.reference.variable()?;
    let relation = Relation::new(&composite.relation.relation_name, vars)
        .with_roleplayer(&composite.relation.object_role, owner)
        .with_roleplayer(&composite.relation.value_role, entity.variable());
    let mut bundle = QueryBundle::new();
    bundle.add_structured_attribute(entity, relation);
    merge(&mut bundle, nested)?;
    Ok(bundle)
}

fn render_embedded_relation(
    relation_type: &str,
    target_id: &str,
    ctx: RenderContext<'_>,
    vars: &mut VariableDealer,
) -> Result<QueryBundle, ConvertError> {
    let (object_role, value_role) = split_roles(ctx.attribute_name)?;
    let target_type = type_from_id(target_id)
        .ok_or_else(|| ValueError::new(format!("'{target_id}' is not a STIX identifier")))?;
    let supertype = ctx.mapping.supertype(target_type)?;
    let target = Identification::new(Some(target_id), None, Some(supertype)).match_object(vars)?;
    let owner = ctx.reference.match_object(vars)?;
    let relation = Relation::new(relation_type, vars)
        .with_roleplayer(object_role, owner.variable())
        .with_roleplayer(value_role, target.variable());
    let mut bundle = QueryBundle::new();
    bundle.add_embedded_relation(owner, target, relation);
    Ok(bundle)
}

fn render_key_value(
    schema: &str,
    pairs: &Map<String, Value>,
    ctx: RenderContext<'_>,
    vars: &mut VariableDealer,
) -> Result<QueryBundle, ConvertError> {
    let mapping = ctx.mapping.key_value(schema)?;
    let owner = ctx.reference.variable()?;
    let mut bundle = QueryBundle::new();
    for (key, raw) in pairs {
        let rendered = render_primitive(&mapping.value_type, raw, ctx, vars)?;
        let mut entity = match (mapping.item_type(key), &mapping.custom) {
            (Some(item_type), _) => Entity::new(item_type, vars),
            (None, Some(custom)) => Entity::new(&custom.entity_name, vars)
                .with_attribute(&custom.name_attribute, quote_string(key)),
            (None, None) => {
                return Err(MappingError::UnsupportedKey {
                    pair_type: schema.to_string(),
                    key: key.clone(),
                    valid: mapping.valid_keys(),
                }
                .into())
            }
        };
        for value in rendered {
            entity.add_attribute(&mapping.attribute_name, value);
        }
        let relation = Relation::new(&mapping.relation.relation_name, vars)
            .with_roleplayer(&mapping.relation.object_role, owner)
            .with_roleplayer(&mapping.relation.value_role, entity.variable());
        bundle.add_structured_attribute(entity, relation);
    }
    Ok(bundle)
}

fn render_dictionary(
    entries: &Map<String, Value>,
    ctx: RenderContext<'_>,
    vars: &mut VariableDealer,
) -> Result<QueryBundle, ConvertError> {
    let dictionary = ctx.mapping.dictionary();
    let owner = ctx.reference.variable()?;
    let mut bundle = QueryBundle::new();
    for (key, raw) in entries {
        let value_type = default_value_type(raw)?;
        if !value_type.element_type().is_primitive() {
            return Err(ValueError::new(format!(
                "dictionary entry '{key}' holds a {value_type} value; only primitive values are supported"
            ))
            .into());
        }
        let item = ctx.mapping.dictionary_item(&value_type)?;
        let rendered = render_primitive(&value_type, raw, ctx, vars)?;
        let mut entity = Entity::new(&item.entity, vars)
            .with_attribute(&dictionary.attribute_key, quote_string(key));
        for value in rendered {
            entity.add_attribute(&item.value_attribute, value);
        }
        let relation = Relation::new(&dictionary.relation.relation_name, vars)
            .with_attribute(
                &dictionary.attribute_property,
                quote_string(ctx.attribute_name),
            )
            .with_roleplayer(&dictionary.relation.object_role, owner)
            .with_roleplayer(&dictionary.relation.value_role, entity.variable());
        bundle.add_structured_attribute(entity, relation);
    }
    Ok(bundle)
}

/// Renders a value that must not need helper statements.
fn render_primitive(
    value_type: &ValueType,
    raw: &Value,
    ctx: RenderContext<'_>,
    vars: &mut VariableDealer,
) -> Result<Vec<String>, ConvertError> {
    let rendered = ValueConverter::parse(value_type, raw)?.render(ctx, vars)?;
    if !rendered.extra.is_empty() {
        return Err(ValueError::new(format!(
            "values of type {value_type} cannot be nested here"
        ))
        .into());
    }
    Ok(rendered.values)
}

fn merge(into: &mut QueryBundle, other: QueryBundle) -> Result<(), ValueError> {
    into.extend(other)
        .map_err(|err| ValueError::new(err.to_string()))
}

fn expect_object(raw: &Value) -> Result<&Map<String, Value>, ValueError> {
    raw.as_object().ok_or_else(|| mismatch("an object", raw))
}

fn parse_long(raw: &Value) -> Result<i64, ValueError> {
    match raw {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| mismatch("an integer", raw)),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| mismatch("an integer", raw)),
        other => Err(mismatch("an integer", other)),
    }
}

fn parse_double(raw: &Value) -> Result<f64, ValueError> {
    let number = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    number
        .filter(|f: &f64| f.is_finite())
        .ok_or_else(|| mismatch("a finite number", raw))
}

fn mismatch(expected: &str, found: &Value) -> ValueError {
    ValueError::new(format!("expected {expected}, found {found}"))
}
