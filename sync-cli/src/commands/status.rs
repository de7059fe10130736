//! Show sync status.

use anyhow::Result;
use driftsync_client::SyncProvider;
use driftsync_types::Timestamp;

use super::Session;
use crate::remote::DirectoryProvider;

/// Run the status command.
pub async fn run(session: &Session) -> Result<()> {
    let state = session.engine.state().await;
    let reachable = DirectoryProvider::new(&session.device.remote_dir)
        .check_connection()
        .await;

    println!("=== driftsync status ===");
    println!();
    println!("Device:");
    println!("  ID:     {}", session.device.device_id);
    println!("  Remote: {}", session.device.remote_dir.display());
    println!(
        "          {}",
        if reachable { "reachable" } else { "UNREACHABLE" }
    );
    println!();
    println!("Sync:");
    println!("  Last sync: {}", format_last_sync(state.last_sync, Timestamp::now()));
    println!("  Pending:   {}", state.pending_count);
    println!("  Conflicts: {}", state.conflict_count);

    Ok(())
}

/// Format the last sync time relative to `now`.
fn format_last_sync(last_sync: Option<Timestamp>, now: Timestamp) -> String {
    let Some(at) = last_sync else {
        return "never".to_string();
    };
    let diff = now.since(at).as_secs();

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::device;
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_for_new_device() {
        let root = tempdir().unwrap();
        let session = device(&root, "laptop").await;

        assert!(run(&session).await.is_ok());
    }

    #[test]
    fn format_last_sync_works() {
        let now = Timestamp::from_millis(1_000_000_000);
        let ago = |secs: u64| Some(Timestamp::from_millis(1_000_000_000 - secs * 1000));

        assert_eq!(format_last_sync(None, now), "never");
        assert_eq!(format_last_sync(ago(5), now), "just now");
        assert!(format_last_sync(ago(120), now).contains("minutes"));
        assert!(format_last_sync(ago(7200), now).contains("hours"));
        assert!(format_last_sync(ago(172_800), now).contains("days"));
    }
}
