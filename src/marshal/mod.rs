//! Structural marshalling
//!
//! Converts between loosely typed structured values (LLM JSON responses,
//! persisted evaluation logs, API payloads) and statically declared records.
//!
//! - `schema`: field declarations, registration and type resolution
//! - `convert`: the two conversion directions and the record traits
//! - `error`: `MarshalError`

mod convert;
mod error;
mod schema;

pub use convert::{
    conform, from_structured, from_validated, to_structured, to_validated, FieldReader,
    FieldWriter, PlainRecord, ValidatedRecord,
};
pub use error::MarshalError;
pub use schema::{
    FieldDescriptor, FieldType, RecordFamily, RecordKind, RecordType, Scalar, TypeDecl,
};

/// The interchange value: null, boolean, number, string, sequence or mapping.
pub type StructuredValue = serde_json::Value;
