//! The `placedrill run` command: a console transport loop.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use placedrill_collab::{create_explainer, load_config, load_config_from};
use placedrill_content::{validate_bank, ItemBank, Severity};
use placedrill_core::engine::Engine;
use placedrill_core::prompt::PromptKind;
use placedrill_core::traits::Explainer;
use placedrill_store::SqliteStore;

pub async fn execute(learner: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config_from(Some(&path))?,
        None => load_config()?,
    };

    let bank = ItemBank::load_dir(&config.content_dir).with_context(|| {
        format!("failed to load content from {}", config.content_dir.display())
    })?;
    let errors = validate_bank(&bank)
        .into_iter()
        .filter(|i| i.severity == Severity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!(
            "content directory has {errors} validation error(s); run `placedrill validate` for details"
        );
    }

    let store = SqliteStore::open(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.display()))?;
    let explainer: Option<Arc<dyn Explainer>> = config
        .explainer
        .as_ref()
        .map(|c| Arc::from(create_explainer(c)));

    let engine = Engine::new(
        Arc::new(bank),
        Arc::new(store),
        explainer,
        config.engine.clone(),
    );

    println!("placedrill session for '{learner}'. Say hi to begin; Ctrl-D quits.");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        // Surface any recheck that came due between turns.
        for delivery in engine.poll_due(Utc::now()).await? {
            if delivery.learner_id == learner {
                println!("\n{}", delivery.prompt.text);
                engine
                    .ack_delivery(&delivery.learner_id, &delivery.rule_key, delivery.kind)
                    .await?;
            }
        }

        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nbye");
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = engine.handle_message(&learner, line, Utc::now()).await?;
        println!("\n{}", reply.text);
        if reply.kind == PromptKind::Completed {
            return Ok(());
        }
    }
}
