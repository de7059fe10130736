//! Write a value and queue it for sync.

use anyhow::Result;

use super::{parse_value, Session};

/// Run the set command.
pub async fn run(session: &Session, key: &str, raw: &str) -> Result<()> {
    let value = parse_value(raw)?;
    match session.engine.put(key, value).await? {
        Some(entry) => println!(
            "{} {} (version {}, queued for sync)",
            entry.operation, key, entry.version
        ),
        None => println!("Wrote {} (not tracked: filtered out)", key),
    }
    Ok(())
}
