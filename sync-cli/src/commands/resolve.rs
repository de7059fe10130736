//! Settle a conflict by hand.

use anyhow::{Context, Result};
use driftsync_types::ConflictId;

use super::{parse_value, Session};

/// Run the resolve command. `None` resolves by deleting the key.
pub async fn run(session: &Session, id: &str, raw: Option<&str>) -> Result<()> {
    let id = ConflictId::parse(id).context("Invalid conflict id")?;
    let value = raw.map(parse_value).transpose()?;

    let conflict = session.engine.manual_resolve(&id, value).await?;
    println!("Resolved conflict on {}.", conflict.key);
    println!("The chosen value will be pushed on the next sync.");
    Ok(())
}
