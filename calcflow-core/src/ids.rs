//! Entity identities
//!
//! Every entity carries an integer identity assigned by the store at creation.
//! Identities are never reused, and entity equality is defined by them alone.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of a connection profile
    ProfileId
);
entity_id!(
    /// Identity of an executable template
    TemplateId
);
entity_id!(
    /// Identity of a job invocation
    CalcJobId
);
entity_id!(ProcessingId);
entity_id!(ArtifactId);
