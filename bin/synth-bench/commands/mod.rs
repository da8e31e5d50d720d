//! CLI command implementations

pub mod evaluate;
pub mod generate;
pub mod inspect;
pub mod score;

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}
