//! Initialize device identity.

use anyhow::Result;
use std::path::Path;

use crate::config::DeviceConfig;
use crate::remote::DirectoryProvider;

/// Run the init command.
pub async fn run(data_dir: &Path, remote: Option<&Path>, device_id: Option<&str>) -> Result<()> {
    // Check if already initialized
    if DeviceConfig::exists(data_dir) {
        anyhow::bail!(
            "Device already initialized. Delete {} to reinitialize.",
            DeviceConfig::path(data_dir).display()
        );
    }
    let Some(remote) = remote else {
        anyhow::bail!("--remote <dir> is required for init");
    };
    if device_id.is_some_and(str::is_empty) {
        anyhow::bail!("--device-id must not be empty");
    }

    DirectoryProvider::create(remote).await?;
    let config = DeviceConfig::new(device_id, remote);
    config.save(data_dir).await?;

    println!("Device initialized successfully!");
    println!();
    println!("  Device ID: {}", config.device_id);
    println!("  Remote:    {}", config.remote_dir.display());
    println!("  Data dir:  {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Write a value: driftsync set <key> <json>");
    println!("  2. Sync it:       driftsync sync");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_creates_device_config_and_remote() {
        let dir = tempdir().unwrap();
        let remote = dir.path().join("remote");
        run(dir.path(), Some(&remote), Some("laptop")).await.unwrap();

        let config = DeviceConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.device_id, "laptop");
        assert_eq!(config.remote_dir, remote);
        assert!(remote.is_dir());
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let dir = tempdir().unwrap();
        let remote = dir.path().join("remote");

        run(dir.path(), Some(&remote), None).await.unwrap();
        assert!(run(dir.path(), Some(&remote), None).await.is_err());
    }

    #[tokio::test]
    async fn init_requires_remote() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), None, None).await.is_err());
        assert!(!DeviceConfig::exists(dir.path()));
    }
}
