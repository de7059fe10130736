//! List conflicts waiting for a value.

use anyhow::Result;
use serde_json::Value;

use super::Session;

/// Run the conflicts command.
pub async fn run(session: &Session) -> Result<()> {
    let conflicts = session.engine.conflicts().await;
    if conflicts.is_empty() {
        println!("No open conflicts.");
        return Ok(());
    }

    println!("{} open conflicts:", conflicts.len());
    for conflict in &conflicts {
        println!();
        println!("  {} on {}", conflict.id, conflict.key);
        println!(
            "    local:  {} (from {})",
            show(&conflict.local.value),
            conflict.local.device_id
        );
        println!(
            "    remote: {} (from {})",
            show(&conflict.remote.value),
            conflict.remote.device_id
        );
    }
    println!();
    println!("Resolve with: driftsync resolve <id> <json>");
    Ok(())
}

fn show(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "<deleted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn show_marks_deletes() {
        assert_eq!(show(&None), "<deleted>");
        assert_eq!(show(&Some(json!({"a": 1}))), "{\"a\":1}");
    }
}
