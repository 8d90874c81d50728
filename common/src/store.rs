use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{config::RuntimeConfig, error::StoreError};

pub const DATA_DIR_ENV: &str = "SMARTNODE_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "./.smartnode";
const RUNTIME_FILE: &str = "runtime.json";

/// Location of the persisted `runtime.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    runtime_path: PathBuf,
}

impl ConfigStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        Self::in_dir(data_dir)
    }

    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            runtime_path: data_dir.as_ref().join(RUNTIME_FILE),
        }
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime_path
    }

    /// Reads the runtime config. A missing file yields the defaults.
    pub async fn load_runtime_config(&self) -> Result<RuntimeConfig, StoreError> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(source) => Err(StoreError::Io {
                path: self.runtime_path.display().to_string(),
                source,
            }),
        }
    }
}
