//! Configuration management for the driftsync CLI.

use anyhow::{Context, Result};
use driftsync_client::SyncConfig;
use driftsync_types::{DeviceId, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEVICE_FILE: &str = "device.json";

/// Device configuration stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier.
    pub device_id: String,
    /// Directory shared with the other devices.
    pub remote_dir: PathBuf,
    /// When the device was initialized (Unix millis).
    pub created_at: u64,
}

impl DeviceConfig {
    /// Create a new device configuration.
    pub fn new(device_id: Option<&str>, remote_dir: &Path) -> Self {
        let device_id = match device_id {
            Some(id) => DeviceId::new(id),
            None => DeviceId::random(),
        };
        Self {
            device_id: device_id.to_string(),
            remote_dir: remote_dir.to_path_buf(),
            created_at: Timestamp::now().as_millis(),
        }
    }

    /// Load device configuration from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(DEVICE_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Device not initialized. Run 'driftsync init --remote <dir>' first.")?;
        serde_json::from_str(&contents).context("Invalid device configuration")
    }

    /// Save device configuration to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(DEVICE_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save device configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if device is initialized.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(DEVICE_FILE).exists()
    }

    /// Path of the device file.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(DEVICE_FILE)
    }
}

/// Build the engine configuration for a CLI run.
///
/// Settings come from the optional TOML file. The device id always comes
/// from the device file, and background syncing is off because every
/// command is a single short-lived process.
pub fn engine_config(device: &DeviceConfig, config_path: Option<&Path>) -> Result<SyncConfig> {
    let config = match config_path {
        Some(path) => SyncConfig::from_file(path)
            .with_context(|| format!("Failed to load engine config {}", path.display()))?,
        None => SyncConfig::default(),
    };
    Ok(config
        .with_device_id(device.device_id.as_str())
        .with_sync_on_change(false)
        .with_auto_sync_interval(std::time::Duration::ZERO))
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_types::ResolutionStrategy;
    use tempfile::tempdir;

    #[tokio::test]
    async fn device_config_roundtrip() {
        let dir = tempdir().unwrap();
        let config = DeviceConfig::new(Some("laptop"), Path::new("/srv/shared"));
        config.save(dir.path()).await.unwrap();

        let loaded = DeviceConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.device_id, "laptop");
        assert!(DeviceConfig::exists(dir.path()));
    }

    #[test]
    fn random_device_id_when_omitted() {
        let a = DeviceConfig::new(None, Path::new("remote"));
        let b = DeviceConfig::new(None, Path::new("remote"));
        assert!(!a.device_id.is_empty());
        assert_ne!(a.device_id, b.device_id);
    }

    #[tokio::test]
    async fn load_without_init_fails() {
        let dir = tempdir().unwrap();
        let err = DeviceConfig::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn engine_config_pins_device_and_disables_background_sync() {
        let device = DeviceConfig::new(Some("phone"), Path::new("remote"));
        let config = engine_config(&device, None).unwrap();

        assert_eq!(config.device_id, Some(DeviceId::new("phone")));
        assert!(!config.sync_on_change);
        assert!(config.auto_sync_interval().is_none());
    }

    #[test]
    fn engine_config_reads_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("driftsync.toml");
        std::fs::write(
            &path,
            "device_id = \"ignored\"\nconflict_strategy = \"manual\"\nbatch_size = 5\n",
        )
        .unwrap();
        let device = DeviceConfig::new(Some("phone"), Path::new("remote"));

        let config = engine_config(&device, Some(&path)).unwrap();

        assert_eq!(config.device_id, Some(DeviceId::new("phone")));
        assert_eq!(config.conflict_strategy, ResolutionStrategy::Manual);
        assert_eq!(config.batch_size, 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn device_config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let config = DeviceConfig::new(None, Path::new("remote"));
        config.save(dir.path()).await.unwrap();

        let path = DeviceConfig::path(dir.path());
        let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
