//! CalcJob DTOs

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::TemplateId;
use crate::manifest::{DownloadGlobs, UploadManifest};

/// Request to create a job invocation of a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCalcJob {
    pub template_id: TemplateId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub upload: UploadManifest,
    #[serde(default)]
    pub download_globs: DownloadGlobs,
}

impl CreateCalcJob {
    pub fn new(template_id: TemplateId) -> Self {
        Self {
            template_id,
            label: String::new(),
            parameters: serde_json::Map::new(),
            upload: UploadManifest::new(),
            download_globs: DownloadGlobs::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_upload(mut self, upload: UploadManifest) -> Self {
        self.upload = upload;
        self
    }

    pub fn with_download_globs(mut self, globs: DownloadGlobs) -> Self {
        self.download_globs = globs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.upload.validate()?;
        self.download_globs.validate()
    }
}
