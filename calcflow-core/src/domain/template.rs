//! Executable template domain types

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::ids::{ProfileId, TemplateId};
use crate::manifest::UploadManifest;

/// A reusable batch-script template plus the files to stage next to it
///
/// The label is unique within the owning profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub profile_id: ProfileId,
    pub label: String,
    /// Jinja source rendered against `profile`, `template` and `invocation`
    pub script: String,
    pub upload: UploadManifest,
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Template {}

impl Hash for Template {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
