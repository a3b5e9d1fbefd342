//! Connection profile domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::ids::ProfileId;
use crate::path::{FsConvention, RemotePath};

/// Files at or below this size go through a direct transfer by default
pub const DEFAULT_SMALL_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Client credentials used to authenticate against the gateway
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_uri: token_uri.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// One user's remote connection and filesystem configuration
///
/// Root of the ownership tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub label: String,
    pub gateway_url: String,
    pub credentials: Credentials,
    pub machine_name: String,
    pub work_dir: String,
    pub fs_convention: FsConvention,
    pub small_file_size_bytes: u64,
}

/// How a file travels to or from the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Inline in a single gateway request
    Direct,
    /// Through an intermediate staging area
    Staged,
}

impl Profile {
    /// Working directory interpreted under the profile's convention
    pub fn work_path(&self) -> RemotePath {
        RemotePath::parse(self.fs_convention, &self.work_dir)
    }

    pub fn transfer_mode(&self, size: u64) -> TransferMode {
        if size <= self.small_file_size_bytes {
            TransferMode::Direct
        } else {
            TransferMode::Staged
        }
    }
}

impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Profile {}

impl Hash for Profile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
pub(crate) fn sample_profile(convention: FsConvention, work_dir: &str) -> Profile {
    Profile {
        id: ProfileId(1),
        label: "digital_dynamo".to_string(),
        gateway_url: "https://gateway.example".to_string(),
        credentials: Credentials::new("client", "secret", "https://auth.example/token"),
        machine_name: "daint".to_string(),
        work_dir: work_dir.to_string(),
        fs_convention: convention,
        small_file_size_bytes: DEFAULT_SMALL_FILE_SIZE_BYTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_transfer_mode_threshold() {
        let profile = sample_profile(FsConvention::Posix, "/home/u");
        assert_eq!(profile.transfer_mode(0), TransferMode::Direct);
        assert_eq!(
            profile.transfer_mode(DEFAULT_SMALL_FILE_SIZE_BYTES),
            TransferMode::Direct
        );
        assert_eq!(
            profile.transfer_mode(DEFAULT_SMALL_FILE_SIZE_BYTES + 1),
            TransferMode::Staged
        );
    }

    #[test]
    fn test_work_path_uses_convention() {
        let profile = sample_profile(FsConvention::Windows, "C:/Users/u");
        assert_eq!(profile.work_path().to_string(), "C:\\Users\\u");
    }

    #[test]
    fn test_equality_by_id_only() {
        let a = sample_profile(FsConvention::Posix, "/a");
        let mut b = sample_profile(FsConvention::Posix, "/b");
        assert_eq!(a, b);
        b.id = ProfileId(2);
        assert_ne!(a, b);

        let set: HashSet<Profile> = [a.clone(), a].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let profile = sample_profile(FsConvention::Posix, "/a");
        let rendered = format!("{:?}", profile);
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
