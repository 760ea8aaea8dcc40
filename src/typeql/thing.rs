//! In-memory graph primitives produced by the transform stage.
//!
//! Equality on [`Entity`] and [`Relation`] ignores scratch variable names:
//! two things are equal when they would insert the same data.

use super::variable::VariableDealer;

/// Ordered multimap of attribute name to rendered values.
///
/// Names keep their first-insertion order; values keep insertion order within
/// a name. Equality compares the name set and each value list, regardless of
/// the order names were added in.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, Vec<String>)>,
}

impl Attributes {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rendered value under `name`.
    ///
    /// Empty names or values are ignored.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name.is_empty() || value.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    /// Values stored under `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Iterates `(name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Number of distinct attribute names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no attribute was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(key, values)| other.get(key) == Some(values.as_slice()))
    }
}

impl Eq for Attributes {}

/// A graph entity to be inserted or matched.
#[derive(Debug, Clone)]
pub struct Entity {
    variable: String,
    type_name: String,
    attributes: Attributes,
}

impl Entity {
    /// Creates an entity with a freshly allocated variable.
    pub fn new(type_name: impl Into<String>, vars: &mut VariableDealer) -> Self {
        Self::with_variable(vars.next(), type_name)
    }

    /// Creates an entity bound to an existing variable.
    pub fn with_variable(variable: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            type_name: type_name.into(),
            attributes: Attributes::new(),
        }
    }

    /// Scratch variable name, without the `$` prefix.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Target type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Attributes attached to this entity.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Appends an attribute value; empty names or values are ignored.
    pub fn add_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.add(name, value);
    }

    /// Builder form of [`Entity::add_attribute`].
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_attribute(name, value);
        self
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.attributes == other.attributes
    }
}

impl Eq for Entity {}

/// An n-ary graph relation; each role may be played by several variables.
#[derive(Debug, Clone)]
pub struct Relation {
    variable: String,
    type_name: String,
    attributes: Attributes,
    roles: Vec<(String, Vec<String>)>,
}

impl Relation {
    /// Creates a relation with a freshly allocated variable and no roles.
    pub fn new(type_name: impl Into<String>, vars: &mut VariableDealer) -> Self {
        Self::with_variable(vars.next(), type_name)
    }

    /// Creates a relation bound to an existing variable.
    pub fn with_variable(variable: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            type_name: type_name.into(),
            attributes: Attributes::new(),
            roles: Vec::new(),
        }
    }

    /// Scratch variable name, without the `$` prefix.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Target type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Attributes attached to this relation.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Appends an attribute value; empty names or values are ignored.
    pub fn add_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.add(name, value);
    }

    /// Builder form of [`Relation::add_attribute`].
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_attribute(name, value);
        self
    }

    /// Adds `variable` as a player of `role`.
    pub fn add_roleplayer(&mut self, role: &str, variable: impl Into<String>) {
        let variable = variable.into();
        match self.roles.iter_mut().find(|(name, _)| name == role) {
            Some((_, players)) => players.push(variable),
            None => self.roles.push((role.to_string(), vec![variable])),
        }
    }

    /// Builder form of [`Relation::add_roleplayer`].
    pub fn with_roleplayer(mut self, role: &str, variable: impl Into<String>) -> Self {
        self.add_roleplayer(role, variable);
        self
    }

    /// Iterates `(role, players)` pairs in insertion order.
    pub fn roles(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.roles
            .iter()
            .map(|(role, players)| (role.as_str(), players.as_slice()))
    }

    /// Players of `role`.
    pub fn players(&self, role: &str) -> Option<&[String]> {
        self.roles
            .iter()
            .find(|(name, _)| name == role)
            .map(|(_, players)| players.as_slice())
    }

    /// Returns `true` when at least one role has been assigned.
    pub fn has_roles(&self) -> bool {
        !self.roles.is_empty()
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.attributes == other.attributes
            && self.roles.len() == other.roles.len()
            && self
                .roles
                .iter()
                .all(|(role, _)| other.players(role).is_some())
    }
}

impl Eq for Relation {}

/// Either kind of graph object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thing {
    /// An entity.
    Entity(Entity),
    /// A relation.
    Relation(Relation),
}

impl Thing {
    /// Scratch variable name, without the `$` prefix.
    pub fn variable(&self) -> &str {
        match self {
            Thing::Entity(entity) => entity.variable(),
            Thing::Relation(relation) => relation.variable(),
        }
    }

    /// Target type name.
    pub fn type_name(&self) -> &str {
        match self {
            Thing::Entity(entity) => entity.type_name(),
            Thing::Relation(relation) => relation.type_name(),
        }
    }

    /// Attributes attached to this thing.
    pub fn attributes(&self) -> &Attributes {
        match self {
            Thing::Entity(entity) => entity.attributes(),
            Thing::Relation(relation) => relation.attributes(),
        }
    }

    /// Appends an attribute value to either kind.
    pub fn add_attribute(&mut self, name: &str, value: impl Into<String>) {
        match self {
            Thing::Entity(entity) => entity.add_attribute(name, value),
            Thing::Relation(relation) => relation.add_attribute(name, value),
        }
    }

    /// The entity, when this is one.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Thing::Entity(entity) => Some(entity),
            Thing::Relation(_) => None,
        }
    }

    /// The relation, when this is one.
    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Thing::Relation(relation) => Some(relation),
            Thing::Entity(_) => None,
        }
    }
}

impl From<Entity> for Thing {
    fn from(entity: Entity) -> Self {
        Thing::Entity(entity)
    }
}

impl From<Relation> for Thing {
    fn from(relation: Relation) -> Self {
        Thing::Relation(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_and_values_are_ignored() {
        let mut attrs = Attributes::new();
        attrs.add("", "\"x\"");
        attrs.add("name", "");
        assert!(attrs.is_empty());
    }

    #[test]
    fn repeated_names_accumulate_values() {
        let mut attrs = Attributes::new();
        attrs.add("alias", "\"a\"");
        attrs.add("name", "\"n\"");
        attrs.add("alias", "\"b\"");
        assert_eq!(attrs.len(), 2);
        assert_eq!(
            attrs.get("alias"),
            Some(&["\"a\"".to_string(), "\"b\"".to_string()][..])
        );
    }

    #[test]
    fn attribute_equality_ignores_name_order() {
        let mut left = Attributes::new();
        left.add("a", "1");
        left.add("b", "2");
        let mut right = Attributes::new();
        right.add("b", "2");
        right.add("a", "1");
        assert_eq!(left, right);
        right.add("a", "3");
        assert_ne!(left, right);
    }

    #[test]
    fn entity_equality_ignores_variable() {
        let left = Entity::with_variable("v1", "malware").with_attribute("name", "\"x\"");
        let right = Entity::with_variable("v9", "malware").with_attribute("name", "\"x\"");
        assert_eq!(left, right);
        let other = Entity::with_variable("v1", "tool").with_attribute("name", "\"x\"");
        assert_ne!(left, other);
    }

    #[test]
    fn relation_equality_compares_role_names() {
        let left = Relation::with_variable("v0", "uses")
            .with_roleplayer("user", "v1")
            .with_roleplayer("used", "v2");
        let right = Relation::with_variable("v5", "uses")
            .with_roleplayer("used", "v7")
            .with_roleplayer("user", "v6");
        assert_eq!(left, right);
        let partial = Relation::with_variable("v5", "uses").with_roleplayer("user", "v6");
        assert_ne!(left, partial);
    }

    #[test]
    fn roleplayers_accumulate_per_role() {
        let relation = Relation::with_variable("v0", "sighting")
            .with_roleplayer("sighted-at", "v1")
            .with_roleplayer("sighted-at", "v2");
        assert_eq!(
            relation.players("sighted-at"),
            Some(&["v1".to_string(), "v2".to_string()][..])
        );
        assert!(relation.has_roles());
    }
}
