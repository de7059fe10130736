//! CLI command implementations.

pub mod cleanup;
pub mod conflicts;
pub mod delete;
pub mod get;
pub mod init;
pub mod pending;
pub mod resolve;
pub mod retry;
pub mod set;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use driftsync_client::SyncEngine;
use serde_json::Value;
use std::path::Path;

use crate::config::{engine_config, set_file_permissions_0600, DeviceConfig};
use crate::remote::DirectoryProvider;
use crate::store::FileStorage;

const STORE_FILE: &str = "store.json";

/// Engine type every command works with.
pub type Engine = SyncEngine<FileStorage, DirectoryProvider>;

/// An opened device: its configuration and a ready engine.
pub struct Session {
    /// The device file contents.
    pub device: DeviceConfig,
    /// The engine over the device's store and the remote directory.
    pub engine: Engine,
}

impl Session {
    /// Load the device and build its engine.
    pub async fn open(
        data_dir: &Path,
        remote: Option<&Path>,
        config_path: Option<&Path>,
    ) -> Result<Self> {
        let device = DeviceConfig::load(data_dir).await?;
        let config = engine_config(&device, config_path)?;
        let remote_dir = remote.unwrap_or(device.remote_dir.as_path());

        let store_path = data_dir.join(STORE_FILE);
        let storage = FileStorage::open(&store_path)
            .await
            .context("Failed to open local store")?;
        if store_path.exists() {
            set_file_permissions_0600(&store_path).await?;
        }

        let engine = SyncEngine::new(config, storage, DirectoryProvider::new(remote_dir))
            .await
            .context("Failed to start sync engine")?;
        Ok(Self { device, engine })
    }
}

/// Parse a command-line value as JSON.
pub fn parse_value(raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .with_context(|| format!("Value is not valid JSON: {} (quote strings: '\"text\"')", raw))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::commands::init;
    use tempfile::TempDir;

    /// A device initialized in a temporary directory, syncing through `remote`.
    pub async fn device(root: &TempDir, name: &str) -> Session {
        let data_dir = root.path().join(name);
        let remote = root.path().join("remote");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        init::run(&data_dir, Some(&remote), Some(name)).await.unwrap();
        Session::open(&data_dir, None, None).await.unwrap()
    }
}
