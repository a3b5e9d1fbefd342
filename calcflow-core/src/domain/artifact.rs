//! Output artifact domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::ids::{ArtifactId, CalcJobId};

/// A data record produced by a calcjob
///
/// Attributes are opaque to the core; the runner stores object-store keys of
/// retrieved files in them. Artifacts live exactly as long as their creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub id: ArtifactId,
    pub creator_id: CalcJobId,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for OutputArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OutputArtifact {}

impl Hash for OutputArtifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
