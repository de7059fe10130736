//! Delete a value and queue the deletion.

use anyhow::Result;

use super::Session;

/// Run the delete command.
pub async fn run(session: &Session, key: &str) -> Result<()> {
    match session.engine.remove(key).await? {
        Some(entry) => println!("Deleted {} (version {}, queued for sync)", key, entry.version),
        None => println!("Nothing to delete for {}", key),
    }
    Ok(())
}
