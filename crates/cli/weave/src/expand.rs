//! Expand command implementation

use crate::config::Settings;
use crate::source::{read_unit, unit_name};
use anyhow::{Context, Result, anyhow};
use miette::Report;
use std::path::Path;
use tracing::debug;
use wv_expand::{ExpandError, ExpansionSession};
use wv_tree::Node;

/// Builds a session with the harness rules
pub fn session(settings: &Settings) -> Result<ExpansionSession> {
    let rules = wv_testkit::rules().context("Failed to register rules")?;
    Ok(ExpansionSession::new(rules).with_config(settings.expand.clone()))
}

/// Expands the unit in `path`, rendering expansion errors as diagnostics
pub fn compile(path: &Path, settings: &Settings) -> Result<Node> {
    let trees = read_unit(path)?;
    let session = session(settings)?;
    let unit = unit_name(path);
    debug!(%unit, trees = trees.len(), "compiling unit");
    wv_testkit::compile(&session, &unit, &trees).map_err(report)
}

/// Prints the expanded program as JSON or in s-expression form
pub fn expand(path: &Path, settings: &Settings, json: bool) -> Result<()> {
    let program = compile(path, settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&program)?);
    } else {
        println!("{program}");
    }

    Ok(())
}

/// Prints `err` as a diagnostic; the returned error only marks the failure
fn report(err: ExpandError) -> anyhow::Error {
    eprintln!("{:?}", Report::new(err));
    anyhow!("Expansion failed")
}
