//! Per-object statement accumulation and dependency ordering.

use crate::error::{TransformError, TransformErrorKind, ValueError};
use crate::mapping::ID_ATTRIBUTE;
use crate::typeql::{quote_string, Entity, InsertQuery, Relation, VariableDealer};

/// How an object can be referenced from other statements.
///
/// An identification built from an id and a type can produce a
/// "match by id" entity usable from any statement; one built from a variable
/// is only meaningful inside the statement that binds the variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identification {
    stix_id: Option<String>,
    variable: Option<String>,
    type_name: Option<String>,
}

impl Identification {
    /// Creates an identification from whatever is known about the object.
    pub fn new(
        stix_id: Option<&str>,
        variable: Option<&str>,
        type_name: Option<&str>,
    ) -> Self {
        let own = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);
        Self {
            stix_id: own(stix_id),
            variable: own(variable),
            type_name: own(type_name),
        }
    }

    /// STIX identifier of the object.
    pub fn stix_id(&self) -> Result<&str, ValueError> {
        self.stix_id
            .as_deref()
            .ok_or_else(|| ValueError::new("the referenced object has no STIX id"))
    }

    /// Variable bound to the object in the current statement.
    pub fn variable(&self) -> Result<&str, ValueError> {
        self.variable
            .as_deref()
            .ok_or_else(|| ValueError::new("the referenced object has no variable"))
    }

    /// Target type of the object.
    pub fn type_name(&self) -> Result<&str, ValueError> {
        self.type_name
            .as_deref()
            .ok_or_else(|| ValueError::new("the referenced object has no type"))
    }

    /// Builds an entity matching the object by id, bound to a fresh variable.
    pub fn match_object(&self, vars: &mut VariableDealer) -> Result<Entity, ValueError> {
        let type_name = self.type_name()?;
        let stix_id = self.stix_id()?;
        Ok(Entity::new(type_name, vars).with_attribute(ID_ATTRIBUTE, quote_string(stix_id)))
    }
}

/// Kind of the main object held by a [`QueryBundle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MainObjectKind {
    /// No main object yet.
    #[default]
    None,
    /// The object is stored as an entity.
    Entity,
    /// The object is stored as a relation.
    Relation,
}

/// Statements produced while converting one STIX object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBundle {
    main_object: InsertQuery,
    main_kind: MainObjectKind,
    attributes: InsertQuery,
    embedded_relations: InsertQuery,
}

/// Statements of one object in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedQueries {
    /// Created entities and their helper structures.
    pub entities: Option<InsertQuery>,
    /// Created relations with their matched role players.
    pub relations: Option<InsertQuery>,
    /// Relations between independently identified objects; run last.
    pub embedded: Option<InsertQuery>,
}

impl QueryBundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kind of the main object.
    pub fn main_kind(&self) -> MainObjectKind {
        self.main_kind
    }

    /// Statement creating the main object.
    pub fn main_object(&self) -> &InsertQuery {
        &self.main_object
    }

    /// Helper structures for structured property values.
    pub fn attributes(&self) -> &InsertQuery {
        &self.attributes
    }

    /// Relations to independently identified objects.
    pub fn embedded_relations(&self) -> &InsertQuery {
        &self.embedded_relations
    }

    /// Registers the main entity.
    pub fn add_main_entity(&mut self, entity: Entity) -> Result<(), TransformError> {
        self.ensure_no_main_object()?;
        self.main_object.push_insert(entity);
        self.main_kind = MainObjectKind::Entity;
        Ok(())
    }

    /// Registers the main relation and the role players it matches.
    pub fn add_main_relation(
        &mut self,
        relation: Relation,
        matches: impl IntoIterator<Item = Entity>,
    ) -> Result<(), TransformError> {
        self.ensure_no_main_object()?;
        for entity in matches {
            self.main_object.push_match(entity);
        }
        self.main_object.push_insert(relation);
        self.main_kind = MainObjectKind::Relation;
        Ok(())
    }

    /// Adds a helper entity and the relation linking it to its owner.
    pub fn add_structured_attribute(&mut self, entity: Entity, relation: Relation) {
        self.attributes.push_insert(entity);
        self.attributes.push_insert(relation);
    }

    /// Adds a relation between two matched objects.
    pub fn add_embedded_relation(&mut self, owner: Entity, target: Entity, relation: Relation) {
        self.embedded_relations.push_match(owner);
        self.embedded_relations.push_match(target);
        self.embedded_relations.push_insert(relation);
    }

    /// Merges `other` into this bundle.
    ///
    /// At most one of the two bundles may carry a main object.
    pub fn extend(&mut self, other: QueryBundle) -> Result<(), TransformError> {
        if other.main_kind != MainObjectKind::None {
            self.ensure_no_main_object()?;
            self.main_kind = other.main_kind;
        }
        self.main_object.extend(other.main_object);
        self.attributes.extend(other.attributes);
        self.embedded_relations.extend(other.embedded_relations);
        Ok(())
    }

    /// Returns `true` when every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.main_object.is_empty()
            && self.attributes.is_empty()
            && self.embedded_relations.is_empty()
    }

    /// Routes the slots into entity, relation and embedded batches.
    ///
    /// The main object and its helper structures go to the batch matching the
    /// main object's kind. A bundle without a main object must be empty.
    pub fn order(self) -> Result<OrderedQueries, TransformError> {
        let non_empty = |query: InsertQuery| (!query.is_empty()).then_some(query);
        let mut primary = self.main_object;
        primary.extend(self.attributes);
        let (entities, relations) = match self.main_kind {
            MainObjectKind::Entity => (non_empty(primary), None),
            MainObjectKind::Relation => (None, non_empty(primary)),
            MainObjectKind::None => {
                if !primary.is_empty() || !self.embedded_relations.is_empty() {
                    return Err(TransformError::new(TransformErrorKind::Other)
                        .with_detail("statements were produced without a main object"));
                }
                (None, None)
            }
        };
        Ok(OrderedQueries {
            entities,
            relations,
            embedded: non_empty(self.embedded_relations),
        })
    }

    fn ensure_no_main_object(&self) -> Result<(), TransformError> {
        if self.main_kind != MainObjectKind::None {
            return Err(TransformError::new(TransformErrorKind::Other)
                .with_detail("a bundle can hold only one main object"));
        }
        Ok(())
    }
}

impl OrderedQueries {
    /// Returns `true` when no batch holds statements.
    pub fn is_empty(&self) -> bool {
        self.entities.is_none() && self.relations.is_none() && self.embedded.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(vars: &mut VariableDealer) -> Relation {
        Relation::new("uses", vars).with_roleplayer("user", "x")
    }

    #[test]
    fn identification_reports_missing_parts() {
        let by_var = Identification::new(None, Some("v0"), Some("malware"));
        assert_eq!(by_var.variable(), Ok("v0"));
        assert!(by_var.stix_id().is_err());
        let mut vars = VariableDealer::new();
        assert!(by_var.match_object(&mut vars).is_err());
        let empty = Identification::new(Some(""), None, None);
        assert!(empty.stix_id().is_err());
    }

    #[test]
    fn match_object_matches_by_id() {
        let mut vars = VariableDealer::new();
        let reference = Identification::new(Some("identity--1"), None, Some("identity"));
        let entity = reference.match_object(&mut vars).expect("match object");
        assert_eq!(entity.type_name(), "identity");
        assert_eq!(entity.variable(), "v0");
        assert_eq!(
            entity.attributes().get(ID_ATTRIBUTE),
            Some(&["\"identity--1\"".to_string()][..])
        );
    }

    #[test]
    fn only_one_main_object() {
        let mut vars = VariableDealer::new();
        let mut bundle = QueryBundle::new();
        bundle
            .add_main_entity(Entity::new("malware", &mut vars))
            .expect("first main");
        assert!(bundle.add_main_entity(Entity::new("tool", &mut vars)).is_err());
        assert!(bundle
            .add_main_relation(relation(&mut vars), Vec::new())
            .is_err());
    }

    #[test]
    fn extend_rejects_two_main_objects() {
        let mut vars = VariableDealer::new();
        let mut first = QueryBundle::new();
        first
            .add_main_entity(Entity::new("malware", &mut vars))
            .expect("main");
        let mut second = QueryBundle::new();
        second
            .add_main_entity(Entity::new("tool", &mut vars))
            .expect("main");
        assert!(first.clone().extend(second).is_err());

        let mut helper = QueryBundle::new();
        helper.add_structured_attribute(
            Entity::new("external-reference", &mut vars),
            relation(&mut vars),
        );
        first.extend(helper).expect("merge helper");
        assert_eq!(first.attributes().insert_clause().len(), 2);
        assert_eq!(first.main_kind(), MainObjectKind::Entity);
    }

    #[test]
    fn entity_bundle_routes_to_entity_and_embedded_batches() {
        let mut vars = VariableDealer::new();
        let mut bundle = QueryBundle::new();
        bundle
            .add_main_entity(Entity::new("attack-pattern", &mut vars))
            .expect("main");
        bundle.add_embedded_relation(
            Entity::new("attack-pattern", &mut vars),
            Entity::new("identity", &mut vars),
            relation(&mut vars),
        );
        let ordered = bundle.order().expect("order");
        assert!(ordered.entities.is_some());
        assert!(ordered.relations.is_none());
        let embedded = ordered.embedded.expect("embedded");
        assert_eq!(embedded.match_clause().len(), 2);
        assert_eq!(embedded.insert_clause().len(), 1);
    }

    #[test]
    fn relation_bundle_routes_to_relation_batch() {
        let mut vars = VariableDealer::new();
        let mut bundle = QueryBundle::new();
        let player = Entity::new("identity", &mut vars);
        bundle
            .add_main_relation(relation(&mut vars), vec![player])
            .expect("main");
        let ordered = bundle.order().expect("order");
        assert!(ordered.entities.is_none());
        let relations = ordered.relations.expect("relations");
        assert_eq!(relations.match_clause().len(), 1);
        assert!(ordered.embedded.is_none());
    }

    #[test]
    fn orphan_statements_are_rejected() {
        let mut vars = VariableDealer::new();
        let mut bundle = QueryBundle::new();
        assert!(bundle.clone().order().expect("empty").is_empty());
        bundle.add_structured_attribute(
            Entity::new("external-reference", &mut vars),
            relation(&mut vars),
        );
        assert!(bundle.order().is_err());
    }
}
