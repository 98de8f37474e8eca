//! The `psytest clear` command.

use std::path::PathBuf;

use anyhow::Result;

use psytest_client::config::load_config_from;
use psytest_core::mirror::{MirrorKey, MirrorStore};
use psytest_core::model::TestKind;

pub fn execute(kind: TestKind, token: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let mirror = super::open_mirror(&config)?;
    let key = MirrorKey::new(kind, token).to_string();

    if mirror.load(&key)?.is_none() {
        println!("No saved answers for {key}.");
        return Ok(());
    }
    mirror.remove(&key)?;
    println!("Removed saved answers for {key}.");
    Ok(())
}
