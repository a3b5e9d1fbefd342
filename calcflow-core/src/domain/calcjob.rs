//! Job invocation domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::domain::profile::Profile;
use crate::ids::{CalcJobId, TemplateId};
use crate::manifest::{DownloadGlobs, UploadManifest};
use crate::path::RemotePath;

/// Fixed segment between the working directory and the invocation folders
pub const WORKFLOWS_DIR: &str = "workflows";

/// Name of the rendered batch script inside the remote folder
pub const JOB_SCRIPT_NAME: &str = "job.sh";

/// One concrete, parameterized run of a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcJob {
    pub id: CalcJobId,
    pub template_id: TemplateId,
    pub label: String,
    /// Names the remote folder; hyphenated hex is safe on every convention
    pub uuid: Uuid,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub upload: UploadManifest,
    pub download_globs: DownloadGlobs,
    pub created_at: DateTime<Utc>,
}

impl CalcJob {
    /// `<work_dir>/workflows/<uuid>` in the profile's convention
    pub fn remote_path(&self, profile: &Profile) -> RemotePath {
        remote_folder(profile, &self.uuid.to_string())
    }

    pub fn script_path(&self, profile: &Profile) -> RemotePath {
        self.remote_path(profile).join(JOB_SCRIPT_NAME)
    }
}

/// Remote folder for an invocation identifier under a profile
pub fn remote_folder(profile: &Profile, identifier: &str) -> RemotePath {
    profile.work_path().join(WORKFLOWS_DIR).join(identifier)
}

impl PartialEq for CalcJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CalcJob {}

impl Hash for CalcJob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
