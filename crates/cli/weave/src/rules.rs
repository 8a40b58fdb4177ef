//! Rules command implementation

use anyhow::{Context, Result};
use colored::Colorize;

pub fn list() -> Result<()> {
    let rules = wv_testkit::rules().context("Failed to register rules")?;

    println!("{} {} rules in `{}`", "Registered:".bold(), rules.len(), rules.owner());
    for rule in rules.rules() {
        println!("  {rule}");
    }

    Ok(())
}
