//! Serializes the graph model into TypeQL text.
//!
//! Output shape:
//!
//! ```text
//! match
//! $v1 isa identity, has stix-id "identity--1";
//! insert
//! $v0 (creator: $v1, object-created: $v2) isa created-by-ref;
//! ```

use super::query::InsertQuery;
use super::thing::{Attributes, Entity, Relation, Thing};
use crate::error::RenderError;

const MATCH_KEYWORD: &str = "match";
const INSERT_KEYWORD: &str = "insert";
const VARIABLE_PREFIX: char = '$';

/// Quotes and escapes a string literal.
///
/// Backslashes are doubled first, then inner double quotes become single
/// quotes, then the text is wrapped in double quotes.
pub fn quote_string(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "'");
    format!("\"{escaped}\"")
}

/// Renders one thing as a `;`-terminated pattern.
pub fn render_thing(thing: &Thing) -> Result<String, RenderError> {
    match thing {
        Thing::Entity(entity) => Ok(render_entity(entity)),
        Thing::Relation(relation) => render_relation(relation),
    }
}

/// Renders a full statement; a statement with nothing to insert renders as
/// the empty string.
pub fn render_insert_query(query: &InsertQuery) -> Result<String, RenderError> {
    let mut out = String::new();
    if query.insert_clause().is_empty() {
        return Ok(out);
    }
    if !query.match_clause().is_empty() {
        out.push_str(MATCH_KEYWORD);
        out.push('\n');
        for thing in query.match_clause() {
            out.push_str(&render_thing(thing)?);
            out.push('\n');
        }
    }
    out.push_str(INSERT_KEYWORD);
    out.push('\n');
    for thing in query.insert_clause() {
        out.push_str(&render_thing(thing)?);
        out.push('\n');
    }
    Ok(out)
}

fn render_entity(entity: &Entity) -> String {
    let mut out = format!(
        "{VARIABLE_PREFIX}{} isa {}",
        entity.variable(),
        entity.type_name()
    );
    push_attributes(&mut out, entity.attributes());
    out.push(';');
    out
}

fn render_relation(relation: &Relation) -> Result<String, RenderError> {
    if !relation.has_roles() {
        return Err(RenderError::RelationWithoutRoles {
            variable: relation.variable().to_string(),
            type_name: relation.type_name().to_string(),
        });
    }
    let players: Vec<String> = relation
        .roles()
        .flat_map(|(role, vars)| {
            vars.iter()
                .map(move |var| format!("{role}: {VARIABLE_PREFIX}{var}"))
        })
        .collect();
    let mut out = format!(
        "{VARIABLE_PREFIX}{} ({}) isa {}",
        relation.variable(),
        players.join(", "),
        relation.type_name()
    );
    push_attributes(&mut out, relation.attributes());
    out.push(';');
    Ok(out)
}

fn push_attributes(out: &mut String, attributes: &Attributes) {
    for (name, values) in attributes.iter() {
        for value in values {
            out.push_str(", has ");
            out.push_str(name);
            out.push(' ');
            out.push_str(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_string_escapes_backslashes_before_quotes() {
        assert_eq!(quote_string("plain"), "\"plain\"");
        assert_eq!(quote_string("say \"hi\""), "\"say 'hi'\"");
        assert_eq!(quote_string("C:\\temp"), "\"C:\\\\temp\"");
        assert_eq!(quote_string("\\\""), "\"\\\\'\"");
    }

    #[test]
    fn renders_entity_with_repeated_attributes() {
        let entity = Entity::with_variable("v0", "malware")
            .with_attribute("name", "\"x\"")
            .with_attribute("alias", "\"a\"")
            .with_attribute("alias", "\"b\"");
        assert_eq!(
            render_thing(&entity.into()).expect("render"),
            "$v0 isa malware, has name \"x\", has alias \"a\", has alias \"b\";"
        );
    }

    #[test]
    fn renders_relation_roles_in_order() {
        let relation = Relation::with_variable("v0", "uses")
            .with_roleplayer("user", "v1")
            .with_roleplayer("used", "v2")
            .with_attribute("stix-id", "\"relationship--1\"");
        assert_eq!(
            render_thing(&relation.into()).expect("render"),
            "$v0 (user: $v1, used: $v2) isa uses, has stix-id \"relationship--1\";"
        );
    }

    #[test]
    fn relation_without_roles_is_rejected() {
        let relation = Relation::with_variable("v3", "uses");
        let err = render_thing(&relation.into()).expect_err("no roles");
        assert_eq!(
            err,
            RenderError::RelationWithoutRoles {
                variable: "v3".into(),
                type_name: "uses".into()
            }
        );
    }

    #[test]
    fn renders_match_and_insert_clauses() {
        let mut query = InsertQuery::new();
        query.push_match(
            Entity::with_variable("v1", "identity").with_attribute("stix-id", "\"identity--1\""),
        );
        query.push_insert(
            Relation::with_variable("v0", "created-by-ref").with_roleplayer("creator", "v1"),
        );
        assert_eq!(
            render_insert_query(&query).expect("render"),
            "match\n$v1 isa identity, has stix-id \"identity--1\";\ninsert\n$v0 (creator: $v1) isa created-by-ref;\n"
        );
    }

    #[test]
    fn statement_without_inserts_renders_empty() {
        let mut query = InsertQuery::new();
        query.push_match(Entity::with_variable("v1", "identity"));
        assert_eq!(render_insert_query(&query).expect("render"), "");
    }
}
