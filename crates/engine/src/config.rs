//! Store configuration.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Configuration for a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the segment files. Created if missing.
    pub data_dir: PathBuf,

    /// If true, every append is fsync'd before the write returns; if false,
    /// durability is best-effort (the OS decides when bytes hit disk).
    pub sync_on_write: bool,

    /// Active-segment byte threshold. An append that would push the active
    /// segment past this size triggers rotation first.
    pub max_file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cinderkv_data"),
            sync_on_write: false,
            max_file_size: 256 * 1024 * 1024, // 256 MiB
        }
    }
}

impl Config {
    /// Config for `data_dir` with default durability and rotation settings.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(StoreError::Config(
                "max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
