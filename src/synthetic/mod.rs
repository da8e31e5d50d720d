//! Synthetic problem generation
//!
//! Turns a repository's related file pairs into problem statements with a
//! dynamic checklist each.

pub mod generator;
pub mod template;

pub use generator::{
    resolve_model_alias, CountPolicy, FilePairSelection, ProblemGenerator,
    ProblemGeneratorParameters,
};
pub use template::{FilesTemplate, PromptTemplate, DEFAULT_TEMPLATE};
