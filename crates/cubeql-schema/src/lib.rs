//! Mondrian-style XML schema parser
//!
//! Turns a `<Schema>` document into [`cubeql_model::Cube`] records. Parsing is
//! all-or-nothing: a document with any invalid cube yields a [`SchemaError`]
//! and no cubes.

mod dom;
mod error;
mod mondrian;

pub use error::SchemaError;
pub use mondrian::{parse_file, parse_str, SchemaDocument};
