//! STIX object to TypeQL statement conversion.
//!
//! A [`Transformer`] owns a shared [`Mapping`] snapshot and converts one
//! object at a time. Every object gets its own [`VariableDealer`], so the
//! variable names of a conversion never depend on what was converted before
//! it and objects can be converted from several threads at once.

pub mod bundle;
pub mod object;
pub mod timestamp;
pub mod value;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::error::ObjectError;
use crate::mapping::Mapping;
use crate::typeql::{InsertQuery, VariableDealer};
pub use bundle::{Identification, MainObjectKind, OrderedQueries, QueryBundle};
use object::ObjectConverter;
pub use object::{SkipReason, SkippedProperty};
pub use timestamp::Timestamp;
pub use value::{RenderContext, Rendered, ValueConverter};

/// Behaviour switches for a [`Transformer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    /// Abort an object on its first failing property instead of dropping the
    /// property.
    pub strict: bool,
}

/// Result of converting one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Identifier of the converted object.
    pub stix_id: String,
    /// Statements in execution order.
    pub queries: OrderedQueries,
    /// Properties left out of the statements.
    pub skipped: Vec<SkippedProperty>,
}

/// An object that could not be converted.
#[derive(Debug)]
pub struct ObjectFailure {
    /// Identifier of the object, when it had one.
    pub stix_id: Option<String>,
    /// Why the conversion failed.
    pub error: ObjectError,
}

/// Statements for a collection of objects, grouped by execution slot.
#[derive(Debug, Default)]
pub struct TransformOutput {
    /// Number of objects seen.
    pub objects: usize,
    /// Entity batches; run first.
    pub entities: Vec<InsertQuery>,
    /// Relation batches; run after every entity batch.
    pub relations: Vec<InsertQuery>,
    /// Embedded relation batches; run last.
    pub embedded: Vec<InsertQuery>,
    /// Objects dropped from the output.
    pub failures: Vec<ObjectFailure>,
    /// Properties dropped from converted objects, keyed by object id.
    pub skipped: Vec<(String, SkippedProperty)>,
}

impl TransformOutput {
    /// Appends the batches of one object.
    pub fn push(&mut self, queries: OrderedQueries) {
        self.entities.extend(queries.entities);
        self.relations.extend(queries.relations);
        self.embedded.extend(queries.embedded);
    }

    /// Total number of statements across all slots.
    pub fn statement_count(&self) -> usize {
        self.entities.len() + self.relations.len() + self.embedded.len()
    }

    /// Slots in execution order, labelled.
    pub fn slots(&self) -> [(&'static str, &[InsertQuery]); 3] {
        [
            ("entities", self.entities.as_slice()),
            ("relations", self.relations.as_slice()),
            ("embedded relations", self.embedded.as_slice()),
        ]
    }
}

/// Converts STIX objects using a shared mapping.
#[derive(Debug, Clone)]
pub struct Transformer {
    mapping: Arc<Mapping>,
    options: TransformOptions,
}

impl Transformer {
    /// Creates a transformer over `mapping`.
    pub fn new(mapping: Arc<Mapping>, options: TransformOptions) -> Self {
        Self { mapping, options }
    }

    /// The mapping in use.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Options in use.
    pub fn options(&self) -> TransformOptions {
        self.options
    }

    /// Converts one object.
    ///
    /// Custom object types convert to an empty result.
    pub fn convert(&self, object: &Map<String, Value>) -> Result<Conversion, ObjectError> {
        let converter = ObjectConverter::create(&self.mapping, self.options, object)?;
        let mut vars = VariableDealer::new();
        let built = converter.build(&mut vars)?;
        let queries = built.bundle.order()?;
        debug!(
            stix_id = converter.stix_id(),
            class = ?converter.class(),
            variables = vars.issued(),
            skipped = built.skipped.len(),
            "transform.object.done"
        );
        Ok(Conversion {
            stix_id: converter.stix_id().to_string(),
            queries,
            skipped: built.skipped,
        })
    }

    /// Converts one object, logging and dropping it on failure.
    pub fn transform(&self, object: &Map<String, Value>) -> Option<OrderedQueries> {
        match self.convert(object) {
            Ok(conversion) => Some(conversion.queries),
            Err(err) => {
                log_failure(object_id(object), &err);
                None
            }
        }
    }

    /// Converts a collection of objects; failures never stop the run.
    pub fn transform_all<'o, I>(&self, objects: I) -> TransformOutput
    where
        I: IntoIterator<Item = &'o Map<String, Value>>,
    {
        let mut output = TransformOutput::default();
        for object in objects {
            output.objects += 1;
            match self.convert(object) {
                Ok(conversion) => {
                    output.push(conversion.queries);
                    let stix_id = conversion.stix_id;
                    output.skipped.extend(
                        conversion
                            .skipped
                            .into_iter()
                            .map(|skipped| (stix_id.clone(), skipped)),
                    );
                }
                Err(err) => {
                    let stix_id = object_id(object);
                    log_failure(stix_id.as_deref(), &err);
                    output.failures.push(ObjectFailure {
                        stix_id: stix_id.map(str::to_string),
                        error: err,
                    });
                }
            }
        }
        debug!(
            objects = output.objects,
            failures = output.failures.len(),
            statements = output.statement_count(),
            "transform.collection.done"
        );
        output
    }
}

fn object_id(object: &Map<String, Value>) -> Option<&str> {
    object.get("id").and_then(Value::as_str)
}

fn log_failure(stix_id: Option<&str>, err: &ObjectError) {
    let stix_id = stix_id.unwrap_or("<no id>");
    if err.is_config() {
        error!(stix_id, error = %err, "transform.object.mapping_defect");
    } else {
        warn!(stix_id, error = %err, "transform.object.dropped");
    }
}
