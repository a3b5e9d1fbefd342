//! Upload manifests and download globs
//!
//! Manifest keys are relative POSIX paths regardless of the remote host's
//! convention. They are resolved against the remote folder only when the
//! orchestrator stages files.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::path::RemotePath;

/// Relative remote path → object-store key, or `None` for "create directory only"
///
/// Entries iterate in path order, so a directory entry always precedes the
/// files below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadManifest(BTreeMap<String, Option<String>>);

/// What to stage at one manifest path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEntry<'a> {
    Directory,
    File { key: &'a str },
}

/// A manifest entry resolved against a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUpload {
    pub relative: String,
    pub target: RemotePath,
    pub key: Option<String>,
}

impl UploadManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, key: impl Into<String>) -> Self {
        self.0.insert(path.into(), Some(key.into()));
        self
    }

    pub fn with_dir(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), None);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, key: Option<String>) {
        self.0.insert(path.into(), key);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UploadEntry<'_>)> {
        self.0.iter().map(|(path, key)| {
            let entry = match key {
                Some(key) => UploadEntry::File { key: key.as_str() },
                None => UploadEntry::Directory,
            };
            (path.as_str(), entry)
        })
    }

    /// Object-store keys referenced by this manifest
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.values().filter_map(|key| key.as_deref())
    }

    /// Checks every path is a relative POSIX path inside the remote folder
    pub fn validate(&self) -> Result<()> {
        self.0.keys().try_for_each(|path| validate_relative_posix(path))
    }

    /// Resolves every entry against `folder` in the folder's convention
    pub fn resolve(&self, folder: &RemotePath) -> Vec<ResolvedUpload> {
        self.0
            .iter()
            .map(|(path, key)| ResolvedUpload {
                relative: path.clone(),
                target: folder.join_posix(path),
                key: key.clone(),
            })
            .collect()
    }
}

impl FromIterator<(String, Option<String>)> for UploadManifest {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Validates a manifest path
///
/// # Returns
/// `InvalidManifestPath` when the path is empty or absolute, uses
/// backslashes, carries a drive prefix, has empty or `.` segments, or climbs
/// out with `..`. Every accepted path names one entry under exactly one
/// spelling.
pub fn validate_relative_posix(path: &str) -> Result<()> {
    let reason = if path.trim().is_empty() {
        Some("path is empty")
    } else if path.starts_with('/') {
        Some("path must be relative")
    } else if path.contains('\\') {
        Some("path must use forward slashes")
    } else if has_drive_prefix(path) {
        Some("path must not carry a drive prefix")
    } else if path.split('/').any(|segment| segment == "..") {
        Some("path must stay inside the remote folder")
    } else if path.split('/').any(|segment| segment.is_empty() || segment == ".") {
        Some("path must not contain empty or '.' segments")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoreError::InvalidManifestPath {
            path: path.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Ordered glob patterns selecting which remote files to retrieve
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadGlobs(Vec<String>);

impl DownloadGlobs {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        self.matcher().map(|_| ())
    }

    /// Compiles the patterns; `*` does not cross `/`, `**` does
    pub fn matcher(&self) -> Result<DownloadMatcher> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.0 {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| CoreError::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| CoreError::InvalidGlob {
            pattern: self.0.join(", "),
            reason: e.to_string(),
        })?;
        Ok(DownloadMatcher { set })
    }
}

/// Compiled download globs
#[derive(Debug, Clone)]
pub struct DownloadMatcher {
    set: GlobSet,
}

impl DownloadMatcher {
    /// Matches a path relative to the remote folder, in POSIX form
    pub fn is_match(&self, relative: &str) -> bool {
        self.set.is_match(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FsConvention;

    #[test]
    fn test_valid_paths() {
        for path in ["input.txt", "data/a.bin", "deep/er/dir", ".hidden", "a/..b"] {
            assert!(validate_relative_posix(path).is_ok(), "{path}");
        }
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", "/etc/passwd", "a\\b", "C:/x", "../up", "a/../../b"] {
            let err = validate_relative_posix(path).unwrap_err();
            assert!(matches!(err, CoreError::InvalidManifestPath { .. }), "{path}");
        }
    }

    #[test]
    fn test_paths_with_empty_or_dot_segments_rejected() {
        for path in [".", "./", "./rel", "a//b", "dir/", "a/./b", "a/."] {
            let err = validate_relative_posix(path).unwrap_err();
            assert!(matches!(err, CoreError::InvalidManifestPath { .. }), "{path}");
        }
    }

    #[test]
    fn test_manifest_orders_directories_first() {
        let manifest = UploadManifest::new()
            .with_file("inputs/b.txt", "k2")
            .with_dir("inputs")
            .with_file("a.txt", "k1");
        let entries: Vec<_> = manifest.iter().collect();
        assert_eq!(entries[0], ("a.txt", UploadEntry::File { key: "k1" }));
        assert_eq!(entries[1], ("inputs", UploadEntry::Directory));
        assert_eq!(entries[2].0, "inputs/b.txt");
        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["k1", "k2"]);
    }

    #[test]
    fn test_resolve_against_windows_folder() {
        let folder = RemotePath::parse(FsConvention::Windows, "C:\\w\\abc");
        let manifest = UploadManifest::new().with_file("in/x.dat", "key");
        let resolved = manifest.resolve(&folder);
        assert_eq!(resolved[0].target.to_string(), "C:\\w\\abc\\in\\x.dat");
        assert_eq!(resolved[0].relative, "in/x.dat");
        assert_eq!(resolved[0].key.as_deref(), Some("key"));
    }

    #[test]
    fn test_manifest_json_shape() {
        let manifest: UploadManifest =
            serde_json::from_str(r#"{"dir": null, "dir/f.txt": "abc"}"#).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.validate().is_ok());
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["dir"], serde_json::Value::Null);
    }

    #[test]
    fn test_download_globs() {
        let globs = DownloadGlobs::new(["*.out", "results/**"]);
        let matcher = globs.matcher().unwrap();
        assert!(matcher.is_match("job.out"));
        assert!(!matcher.is_match("sub/job.out"));
        assert!(matcher.is_match("results/a/b.csv"));
        assert!(!matcher.is_match("job.sh"));
    }

    #[test]
    fn test_invalid_glob() {
        let err = DownloadGlobs::new(["[unclosed"]).validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidGlob { .. }));
    }
}
