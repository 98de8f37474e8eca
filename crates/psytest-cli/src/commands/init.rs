//! The `psytest init` command.

use anyhow::Result;

use psytest_client::config::STARTER_CONFIG;

pub fn execute() -> Result<()> {
    if std::path::Path::new("psytest.toml").exists() {
        println!("psytest.toml already exists, skipping.");
    } else {
        std::fs::write("psytest.toml", STARTER_CONFIG)?;
        println!("Created psytest.toml");
    }

    println!("\nNext steps:");
    println!("  1. Point [api] base_url at the assessment server");
    println!("  2. Run: psytest take --test 16pf --token <access token>");

    Ok(())
}
