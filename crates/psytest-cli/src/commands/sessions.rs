//! The `psytest sessions` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use psytest_client::config::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let mirror = super::open_mirror(&config)?;
    let sessions = mirror.list()?;

    if sessions.is_empty() {
        println!("No saved sessions in {}.", mirror.dir().display());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Test", "Token", "Answered", "Last saved"]);
    for session in &sessions {
        table.add_row(vec![
            Cell::new(session.kind),
            Cell::new(&session.token),
            Cell::new(format!(
                "{}/{}",
                session.answered,
                session.kind.question_count()
            )),
            Cell::new(
                session
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }
    println!("{table}");
    Ok(())
}
