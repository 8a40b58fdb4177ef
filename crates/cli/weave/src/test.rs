//! Test command implementation

use crate::config::Settings;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use wv_testkit::Outcome;

/// Runs every case in the unit and prints a colored report
pub fn test(path: &Path, settings: &Settings) -> Result<()> {
    println!("{} {}", "Testing".green().bold(), path.display());

    let program = crate::expand::compile(path, settings)?;
    let report = wv_testkit::run(&program)?;

    for case in &report.cases {
        match &case.outcome {
            Outcome::Passed => println!("  {} {}", "✓".green(), case.description),
            Outcome::Failed(message) => {
                println!("  {} {}", "✗".red(), case.description);
                for line in message.lines() {
                    println!("      {line}");
                }
            }
        }
    }

    println!();
    if report.is_success() {
        println!("{} {report}", "Success:".green().bold());
        Ok(())
    } else {
        eprintln!("{} {report}", "Failed:".red().bold());
        anyhow::bail!("Tests failed")
    }
}
