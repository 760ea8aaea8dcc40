//! TypeQL graph model, variable allocation and statement rendering.

pub mod builder;
pub mod query;
pub mod thing;
pub mod variable;

pub use builder::{quote_string, render_insert_query, render_thing};
pub use query::InsertQuery;
pub use thing::{Attributes, Entity, Relation, Thing};
pub use variable::VariableDealer;
