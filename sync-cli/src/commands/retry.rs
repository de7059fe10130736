//! Requeue entries that ran out of retries.

use anyhow::Result;

use super::Session;

/// Run the retry command.
pub async fn run(session: &Session) -> Result<()> {
    let reset = session.engine.retry_failed().await?;
    if reset == 0 {
        println!("No failed entries to retry.");
    } else {
        println!("Requeued {} entries. Run 'driftsync sync' to push them.", reset);
    }
    Ok(())
}
