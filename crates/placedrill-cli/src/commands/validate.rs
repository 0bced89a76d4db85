//! The `placedrill validate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Table};

use placedrill_content::{validate_bank, ItemBank, Severity};

pub fn execute(content: PathBuf) -> Result<()> {
    let bank = ItemBank::load_dir(&content)
        .with_context(|| format!("failed to load content from {}", content.display()))?;

    println!(
        "Content: {} placement item(s), {} rule(s)",
        bank.placement_items().len(),
        bank.remediations().count()
    );

    let issues = validate_bank(&bank);
    if issues.is_empty() {
        println!("Dataset valid.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["severity", "location", "message"]);
    for issue in &issues {
        table.add_row(vec![
            issue.severity.to_string(),
            issue.location.clone(),
            issue.message.clone(),
        ]);
    }
    println!("{table}");

    let errors = issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count();
    let warnings = issues.len() - errors;
    println!("{errors} error(s), {warnings} warning(s).");
    if errors > 0 {
        anyhow::bail!("dataset has validation errors");
    }
    Ok(())
}
