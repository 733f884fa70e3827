//! Process definitions from JSON or TOML documents.
//!
//! Every loaded definition is validated before it is returned.

use std::path::Path;

use braid_core::error::{BraidError, Result};

use crate::process::ProcessDefinition;

pub fn from_json_str(content: &str) -> Result<ProcessDefinition> {
    let definition: ProcessDefinition = serde_json::from_str(content)?;
    definition.validate()?;
    Ok(definition)
}

pub fn from_toml_str(content: &str) -> Result<ProcessDefinition> {
    let definition: ProcessDefinition =
        toml::from_str(content).map_err(|e| BraidError::MalformedProcess(e.to_string()))?;
    definition.validate()?;
    Ok(definition)
}

/// Load a definition file, choosing the format by extension.
pub fn load_file(path: &Path) -> Result<ProcessDefinition> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json_str(&content),
        Some("toml") => from_toml_str(&content),
        other => Err(BraidError::MalformedProcess(format!(
            "unsupported definition format '{}' for {}",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}
