//! Drop synced entries and resolved conflicts.

use anyhow::Result;

use super::Session;

/// Run the cleanup command.
pub async fn run(session: &Session) -> Result<()> {
    let report = session.engine.cleanup().await?;
    println!(
        "Removed {} synced entries and {} resolved conflicts.",
        report.entries, report.conflicts
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::device;
    use tempfile::tempdir;

    #[tokio::test]
    async fn cleanup_on_empty_device() {
        let root = tempdir().unwrap();
        let session = device(&root, "laptop").await;

        run(&session).await.unwrap();
        assert!(session.engine.pending().await.is_empty());
    }
}
