//! Run one push/pull cycle.

use anyhow::Result;
use driftsync_client::SyncReport;

use super::Session;

/// Run the sync command.
///
/// Fails when the cycle reported errors, so scripts can retry.
pub async fn run(session: &Session) -> Result<()> {
    println!("Syncing with {}...", session.device.remote_dir.display());
    let report = session.engine.sync().await?;
    print_report(&report);

    if !report.success {
        anyhow::bail!("Sync failed: {}", report.errors.join("; "));
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!();
    println!("  Pushed:    {}", report.pushed);
    println!("  Failed:    {}", report.failed);
    println!("  Pulled:    {}", report.pulled);
    println!(
        "  Conflicts: {} ({} resolved)",
        report.conflicts, report.resolved
    );
    println!("  Duration:  {:?}", report.duration);
    for error in &report.errors {
        println!("  Error:     {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{set, testing::device};
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn two_devices_converge() {
        let root = tempdir().unwrap();
        let laptop = device(&root, "laptop").await;
        let phone = device(&root, "phone").await;

        set::run(&laptop, "notes/1", "{\"title\": \"groceries\"}")
            .await
            .unwrap();
        run(&laptop).await.unwrap();
        run(&phone).await.unwrap();

        assert_eq!(
            phone.engine.get("notes/1").await.unwrap(),
            Some(json!({"title": "groceries"}))
        );
        assert!(laptop.engine.pending().await.is_empty());
    }

    #[tokio::test]
    async fn sync_fails_when_remote_is_gone() {
        let root = tempdir().unwrap();
        let laptop = device(&root, "laptop").await;
        tokio::fs::remove_dir_all(root.path().join("remote"))
            .await
            .unwrap();
        set::run(&laptop, "k", "1").await.unwrap();

        assert!(run(&laptop).await.is_err());
        assert_eq!(laptop.engine.pending().await.len(), 1);
    }
}
