//! Reading units from JSON

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use wv_tree::Node;

#[derive(Deserialize)]
#[serde(untagged)]
enum Source {
    Many(Vec<Node>),
    One(Node),
}

/// Reads the top-level trees of a unit
pub fn read_unit(path: &Path) -> Result<Vec<Node>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;

    let source: Source = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse source file: {}", path.display()))?;

    Ok(match source {
        Source::Many(trees) => trees,
        Source::One(tree) => vec![tree],
    })
}

/// Unit name derived from the file name
pub fn unit_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "main".to_owned(), |stem| stem.to_string_lossy().into_owned())
}
