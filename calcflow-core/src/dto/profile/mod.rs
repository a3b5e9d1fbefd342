//! Profile DTOs

use serde::{Deserialize, Serialize};

use crate::domain::profile::{Credentials, DEFAULT_SMALL_FILE_SIZE_BYTES};
use crate::path::FsConvention;

/// Request to create a connection profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfile {
    /// Drawn from the name pool when absent
    #[serde(default)]
    pub label: Option<String>,
    pub gateway_url: String,
    pub credentials: Credentials,
    pub machine_name: String,
    pub work_dir: String,
    #[serde(default)]
    pub fs_convention: FsConvention,
    #[serde(default = "default_small_file_size")]
    pub small_file_size_bytes: u64,
}

fn default_small_file_size() -> u64 {
    DEFAULT_SMALL_FILE_SIZE_BYTES
}

impl CreateProfile {
    pub fn new(
        gateway_url: impl Into<String>,
        credentials: Credentials,
        machine_name: impl Into<String>,
        work_dir: impl Into<String>,
    ) -> Self {
        Self {
            label: None,
            gateway_url: gateway_url.into(),
            credentials,
            machine_name: machine_name.into(),
            work_dir: work_dir.into(),
            fs_convention: FsConvention::default(),
            small_file_size_bytes: DEFAULT_SMALL_FILE_SIZE_BYTES,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_fs_convention(mut self, convention: FsConvention) -> Self {
        self.fs_convention = convention;
        self
    }

    pub fn with_small_file_size(mut self, bytes: u64) -> Self {
        self.small_file_size_bytes = bytes;
        self
    }
}
