//! Output artifact DTOs

use serde::{Deserialize, Serialize};

use crate::ids::CalcJobId;

/// Request to record an artifact produced by a calcjob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArtifact {
    pub creator_id: CalcJobId,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl CreateArtifact {
    pub fn new(
        creator_id: CalcJobId,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            creator_id,
            attributes,
        }
    }
}
