//! List entries waiting to be pushed.

use anyhow::Result;
use driftsync_types::SyncEntry;

use super::Session;

/// Run the pending command.
pub async fn run(session: &Session) -> Result<()> {
    let pending = session.engine.pending().await;
    if pending.is_empty() {
        println!("Nothing pending.");
        return Ok(());
    }

    println!("{} pending entries:", pending.len());
    for entry in &pending {
        println!("  {}", describe(entry));
    }
    Ok(())
}

fn describe(entry: &SyncEntry) -> String {
    let mut line = format!(
        "{} {} v{} ({})",
        entry.operation, entry.key, entry.version, entry.id
    );
    if entry.attempts > 0 {
        line.push_str(&format!(", {} failed attempts", entry.attempts));
    }
    if let Some(error) = &entry.error {
        line.push_str(&format!(", last error: {}", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_types::{DeviceId, Operation, Timestamp};
    use serde_json::json;

    #[test]
    fn describe_includes_failures() {
        let mut entry = SyncEntry::new(
            "notes/1",
            Operation::Update,
            Some(json!(1)),
            DeviceId::new("laptop"),
            3,
            Timestamp::ZERO,
        );
        assert!(!describe(&entry).contains("failed"));

        entry.record_failure("rejected by remote", Timestamp::ZERO);
        let line = describe(&entry);
        assert!(line.contains("notes/1 v3"));
        assert!(line.contains("1 failed attempts"));
        assert!(line.contains("rejected by remote"));
    }
}
