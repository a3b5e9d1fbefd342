//! Template DTOs

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::ProfileId;
use crate::manifest::UploadManifest;

/// Request to create an executable template under a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub profile_id: ProfileId,
    /// Drawn from the name pool when absent
    #[serde(default)]
    pub label: Option<String>,
    pub script: String,
    #[serde(default)]
    pub upload: UploadManifest,
}

impl CreateTemplate {
    pub fn new(profile_id: ProfileId, script: impl Into<String>) -> Self {
        Self {
            profile_id,
            label: None,
            script: script.into(),
            upload: UploadManifest::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_upload(mut self, upload: UploadManifest) -> Self {
        self.upload = upload;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.upload.validate()
    }
}
