//! Stixgraph compiles STIX 2.1 threat-intelligence objects into TypeQL insert
//! statements and loads them in dependency order.
//!
//! The pipeline runs in three stages:
//!
//! 1. [`extract`] decodes a bundle into JSON objects;
//! 2. [`transform`] converts each object into entity, relation and embedded
//!    relation statements, driven by the declarative [`mapping`];
//! 3. [`load`] renders the statements with [`typeql`] and hands them to an
//!    [`load::InsertHandler`] in batches, retrying failed batches one
//!    statement at a time.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stixgraph::{extract, load, mapping::Mapping, transform};
//!
//! # fn main() -> stixgraph::Result<()> {
//! let mapping = Arc::new(Mapping::builtin()?);
//! let transformer = transform::Transformer::new(mapping, Default::default());
//! let objects = extract::read_bundle("bundle.json".as_ref())?;
//! let output = transformer.transform_all(&objects);
//! let mut writer = load::TypeQlWriter::new(std::io::stdout());
//! let summary = load::Loader::default().load_output(&mut writer, &output);
//! println!("{} statements inserted", summary.inserted);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod mapping;
pub mod transform;
pub mod typeql;

pub use error::{Error, Result};
pub use load::{InsertHandler, LoadSummary, Loader, LoaderOptions};
pub use mapping::Mapping;
pub use transform::{Conversion, TransformOptions, TransformOutput, Transformer};
