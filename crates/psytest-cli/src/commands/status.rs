//! The `psytest status` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use psytest_core::model::TestKind;

use super::render::question_list;
use super::SessionContext;

pub async fn execute(kind: TestKind, token: String, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = SessionContext::open(config_path.as_deref())?;
    let mut session = ctx.load_session(kind, &token).await?;

    let countdown = session.countdown();
    let missing = session.missing();
    let total = session.questions().len();

    let mut table = Table::new();
    table.set_header(vec!["Test", "State", "Time left", "Answered", "Missing"]);
    table.add_row(vec![
        Cell::new(kind),
        Cell::new(session.state()),
        Cell::new(countdown),
        Cell::new(format!("{}/{total}", session.answered_count())),
        Cell::new(if missing.is_empty() {
            "-".to_string()
        } else {
            question_list(&missing, 10)
        }),
    ]);
    println!("{table}");

    if session.store().mirror_dirty() {
        eprintln!("Warning: local answers could not be saved to disk.");
    }
    Ok(())
}
