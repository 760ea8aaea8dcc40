//! Offline export of statements as a TypeQL script.

use std::io::Write;

use super::InsertHandler;
use crate::error::LoadingError;

/// [`InsertHandler`] writing each batch to a stream.
///
/// Every batch starts with a `#` comment line; statements are separated by a
/// blank line.
#[derive(Debug)]
pub struct TypeQlWriter<W: Write> {
    out: W,
    batches: usize,
    statements: usize,
}

impl<W: Write> TypeQlWriter<W> {
    /// Wraps `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            batches: 0,
            statements: 0,
        }
    }

    /// Batches written so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Statements written so far.
    pub fn statements(&self) -> usize {
        self.statements
    }

    /// Flushes and returns the underlying stream.
    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    /// Writes the whole batch with one `write_all` so a failed batch leaves
    /// no statements behind for the single-statement retry to repeat.
    fn write_batch(&mut self, batch: &[String]) -> std::io::Result<()> {
        let mut text = format!("# batch {} ({} statements)\n", self.batches + 1, batch.len());
        for statement in batch {
            text.push_str(statement);
            if !statement.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
        }
        self.out.write_all(text.as_bytes())
    }
}

impl<W: Write> InsertHandler for TypeQlWriter<W> {
    fn insert(&mut self, batch: &[String]) -> Result<(), LoadingError> {
        self.write_batch(batch).map_err(|err| {
            let first = batch.first().cloned().unwrap_or_default();
            LoadingError::new(err.to_string(), first, batch.len())
        })?;
        self.batches += 1;
        self.statements += batch.len();
        Ok(())
    }
}
