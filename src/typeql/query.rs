//! Match/insert statement model.

use super::thing::Thing;

/// A single insert statement: things to match, then things to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertQuery {
    match_clause: Vec<Thing>,
    insert_clause: Vec<Thing>,
}

impl InsertQuery {
    /// Creates an empty statement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Things the statement references without creating them.
    pub fn match_clause(&self) -> &[Thing] {
        &self.match_clause
    }

    /// Things the statement creates.
    pub fn insert_clause(&self) -> &[Thing] {
        &self.insert_clause
    }

    /// Adds a referenced thing.
    pub fn push_match(&mut self, thing: impl Into<Thing>) {
        self.match_clause.push(thing.into());
    }

    /// Adds a created thing.
    pub fn push_insert(&mut self, thing: impl Into<Thing>) {
        self.insert_clause.push(thing.into());
    }

    /// Appends both clauses of `other` to this statement.
    pub fn extend(&mut self, other: InsertQuery) {
        self.match_clause.extend(other.match_clause);
        self.insert_clause.extend(other.insert_clause);
    }

    /// Returns `true` when both clauses are empty.
    pub fn is_empty(&self) -> bool {
        self.match_clause.is_empty() && self.insert_clause.is_empty()
    }
}
