//! Print a value.

use anyhow::Result;

use super::Session;

/// Run the get command.
pub async fn run(session: &Session, key: &str) -> Result<()> {
    match session.engine.get(key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => anyhow::bail!("No value for {}", key),
    }
    Ok(())
}
