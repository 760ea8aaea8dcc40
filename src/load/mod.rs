//! Batched statement loading.
//!
//! Statements are sent to an [`InsertHandler`] in fixed-size batches. A
//! failing batch of several statements is retried one statement at a time so a
//! single bad statement cannot block its siblings. Statements that fail on
//! their own are reported and never retried.

pub mod writer;

use std::slice;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::LoadingError;
use crate::transform::TransformOutput;
use crate::typeql::{render_insert_query, InsertQuery};
pub use writer::TypeQlWriter;

/// Default number of statements per batch.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Destination of rendered statements.
///
/// A call inserts the whole batch atomically or fails as a whole.
pub trait InsertHandler {
    /// Inserts `batch` in one transaction.
    fn insert(&mut self, batch: &[String]) -> Result<(), LoadingError>;
}

impl<T: InsertHandler + ?Sized> InsertHandler for &mut T {
    fn insert(&mut self, batch: &[String]) -> Result<(), LoadingError> {
        (**self).insert(batch)
    }
}

/// Loader tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderOptions {
    /// Statements per batch; at least 1.
    pub batch_size: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Counters for one load run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Statements handed to the loader.
    pub statements: usize,
    /// Batches attempted.
    pub batches: usize,
    /// Batches that failed and were retried statement by statement.
    pub failed_batches: usize,
    /// Statements inserted.
    pub inserted: usize,
    /// Statements that could not be rendered or inserted.
    pub rejected: usize,
    /// Failures of single-statement inserts, in order.
    pub errors: Vec<LoadingError>,
}

impl LoadSummary {
    /// Adds the counters of `other`.
    pub fn merge(&mut self, other: LoadSummary) {
        self.statements += other.statements;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.inserted += other.inserted;
        self.rejected += other.rejected;
        self.errors.extend(other.errors);
    }

    /// Returns `true` when every statement was inserted.
    pub fn is_clean(&self) -> bool {
        self.rejected == 0
    }
}

/// Sends statements to a handler in batches.
#[derive(Debug, Clone, Copy)]
pub struct Loader {
    batch_size: usize,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderOptions::default())
    }
}

impl Loader {
    /// Creates a loader; a batch size of zero is raised to one.
    pub fn new(options: LoaderOptions) -> Self {
        if options.batch_size == 0 {
            warn!("load.batch_size.zero");
        }
        Self {
            batch_size: options.batch_size.max(1),
        }
    }

    /// Statements per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Inserts rendered statements in order.
    pub fn load<H>(&self, handler: &mut H, statements: &[String]) -> LoadSummary
    where
        H: InsertHandler + ?Sized,
    {
        let mut summary = LoadSummary {
            statements: statements.len(),
            ..LoadSummary::default()
        };
        for (batch, chunk) in statements.chunks(self.batch_size).enumerate() {
            summary.batches += 1;
            match handler.insert(chunk) {
                Ok(()) => {
                    summary.inserted += chunk.len();
                    debug!(batch, size = chunk.len(), "load.batch.inserted");
                }
                Err(err) if chunk.len() == 1 => Self::reject(batch, err, &mut summary),
                Err(err) => {
                    summary.failed_batches += 1;
                    warn!(batch, size = chunk.len(), error = %err, "load.batch.retry");
                    self.retry_singly(handler, batch, chunk, &mut summary);
                }
            }
        }
        summary
    }

    fn reject(batch: usize, err: LoadingError, summary: &mut LoadSummary) {
        summary.rejected += 1;
        error!(batch, error = %err, "load.statement.rejected");
        summary.errors.push(err);
    }

    fn retry_singly<H>(
        &self,
        handler: &mut H,
        batch: usize,
        chunk: &[String],
        summary: &mut LoadSummary,
    ) where
        H: InsertHandler + ?Sized,
    {
        for statement in chunk {
            match handler.insert(slice::from_ref(statement)) {
                Ok(()) => summary.inserted += 1,
                Err(err) => Self::reject(batch, err, summary),
            }
        }
    }

    /// Renders and inserts statements; render failures count as rejected.
    pub fn load_queries<H>(&self, handler: &mut H, queries: &[InsertQuery]) -> LoadSummary
    where
        H: InsertHandler + ?Sized,
    {
        let mut rendered = Vec::with_capacity(queries.len());
        let mut render_failures = 0;
        for query in queries {
            match render_insert_query(query) {
                Ok(statement) if statement.is_empty() => {}
                Ok(statement) => rendered.push(statement),
                Err(err) => {
                    render_failures += 1;
                    error!(error = %err, "load.statement.render_failed");
                }
            }
        }
        let mut summary = self.load(handler, &rendered);
        summary.statements += render_failures;
        summary.rejected += render_failures;
        summary
    }

    /// Loads every slot of `output`: entities, then relations, then embedded
    /// relations.
    pub fn load_output<H>(&self, handler: &mut H, output: &TransformOutput) -> LoadSummary
    where
        H: InsertHandler + ?Sized,
    {
        let mut summary = LoadSummary::default();
        for (slot, queries) in output.slots() {
            let part = self.load_queries(handler, queries);
            debug!(
                slot,
                inserted = part.inserted,
                rejected = part.rejected,
                "load.slot.done"
            );
            summary.merge(part);
        }
        summary
    }
}
