//! Remote path semantics
//!
//! Paths on the remote host follow either posix or windows rules. Both share
//! one representation: an optional prefix (drive letter or UNC share), a root
//! flag, and the list of segments below it. Rendering picks the separator of
//! the convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseEnumError;

/// Filesystem convention of the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsConvention {
    #[default]
    Posix,
    Windows,
}

impl FsConvention {
    pub fn as_str(self) -> &'static str {
        match self {
            FsConvention::Posix => "posix",
            FsConvention::Windows => "windows",
        }
    }

    pub fn separator(self) -> char {
        match self {
            FsConvention::Posix => '/',
            FsConvention::Windows => '\\',
        }
    }
}

impl fmt::Display for FsConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsConvention {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posix" => Ok(FsConvention::Posix),
            "windows" => Ok(FsConvention::Windows),
            other => Err(ParseEnumError {
                kind: "filesystem convention",
                value: other.to_string(),
            }),
        }
    }
}

/// A path on the remote host, interpreted under one convention
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
    convention: FsConvention,
    prefix: String,
    root: bool,
    segments: Vec<String>,
}

impl RemotePath {
    /// Parses a path written in the given convention
    ///
    /// Windows paths accept both `\` and `/` as separators, a drive prefix
    /// (`C:`) and UNC shares (`\\server\share`). `.` segments are dropped;
    /// `..` is kept verbatim since the remote host resolves it.
    pub fn parse(convention: FsConvention, raw: &str) -> Self {
        match convention {
            FsConvention::Posix => Self {
                convention,
                prefix: String::new(),
                root: raw.starts_with('/'),
                segments: split_segments(raw, '/'),
            },
            FsConvention::Windows => {
                let normalized = raw.replace('/', "\\");
                let (prefix, rest, unc) = split_windows_prefix(&normalized);
                Self {
                    convention,
                    prefix,
                    root: unc || rest.starts_with('\\'),
                    segments: split_segments(rest, '\\'),
                }
            }
        }
    }

    pub fn convention(&self) -> FsConvention {
        self.convention
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_absolute(&self) -> bool {
        match self.convention {
            FsConvention::Posix => self.root,
            FsConvention::Windows => self.root && !self.prefix.is_empty(),
        }
    }

    /// Joins a path written in this path's convention
    ///
    /// An absolute right-hand side replaces the left; a rooted windows path
    /// without a drive keeps the left drive.
    pub fn join(&self, other: &str) -> Self {
        let other = Self::parse(self.convention, other);
        if !other.prefix.is_empty() {
            return other;
        }
        if other.root {
            return Self {
                prefix: self.prefix.clone(),
                ..other
            };
        }
        let mut joined = self.clone();
        joined.segments.extend(other.segments);
        joined
    }

    /// Joins a relative POSIX path regardless of this path's convention
    pub fn join_posix(&self, relative: &str) -> Self {
        let mut joined = self.clone();
        joined.segments.extend(split_segments(relative, '/'));
        joined
    }

    /// Appends a single entry name, as returned by a directory listing
    pub fn child(&self, name: &str) -> Self {
        let mut joined = self.clone();
        joined.segments.push(name.to_string());
        joined
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns this path relative to `base`, in POSIX form
    pub fn relative_to(&self, base: &RemotePath) -> Option<String> {
        if self.convention != base.convention
            || self.prefix != base.prefix
            || self.root != base.root
            || !self.segments.starts_with(&base.segments)
        {
            return None;
        }
        Some(self.segments[base.segments.len()..].join("/"))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = self.convention.separator();
        let body = self.segments.join(&sep.to_string());
        if self.prefix.is_empty() && !self.root && body.is_empty() {
            return f.write_str(".");
        }
        f.write_str(&self.prefix)?;
        if self.root {
            write!(f, "{}", sep)?;
        }
        f.write_str(&body)
    }
}

fn split_segments(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

/// Splits a backslash-normalized windows path into (prefix, rest, is_unc)
fn split_windows_prefix(path: &str) -> (String, &str, bool) {
    if let Some(unc) = path.strip_prefix("\\\\") {
        let mut parts = unc.splitn(3, '\\');
        let server = parts.next().unwrap_or_default();
        let share = parts.next().unwrap_or_default();
        if !server.is_empty() && !share.is_empty() {
            let prefix = format!("\\\\{}\\{}", server, share);
            let rest = &path[prefix.len()..];
            return (prefix, rest, true);
        }
    }

    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return (path[..2].to_string(), &path[2..], false);
    }

    (String::new(), path, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_workflow_folder() {
        let path = RemotePath::parse(FsConvention::Posix, "/home/u")
            .join("workflows")
            .join("abc-123");
        assert_eq!(path.to_string(), "/home/u/workflows/abc-123");
        assert!(path.is_absolute());
    }

    #[test]
    fn test_windows_workflow_folder() {
        let path = RemotePath::parse(FsConvention::Windows, "C:\\Users\\u")
            .join("workflows")
            .join("abc-123");
        assert_eq!(path.to_string(), "C:\\Users\\u\\workflows\\abc-123");
        assert!(path.is_absolute());
    }

    #[test]
    fn test_windows_accepts_forward_slashes() {
        let path = RemotePath::parse(FsConvention::Windows, "C:/Users/u/");
        assert_eq!(path.to_string(), "C:\\Users\\u");
    }

    #[test]
    fn test_windows_unc_share() {
        let path = RemotePath::parse(FsConvention::Windows, "\\\\cluster\\scratch\\u").join("run");
        assert_eq!(path.to_string(), "\\\\cluster\\scratch\\u\\run");
        assert!(path.is_absolute());
    }

    #[test]
    fn test_windows_rooted_join_keeps_drive() {
        let path = RemotePath::parse(FsConvention::Windows, "D:\\work").join("\\tmp");
        assert_eq!(path.to_string(), "D:\\tmp");
        let other = RemotePath::parse(FsConvention::Windows, "D:\\work").join("E:\\x");
        assert_eq!(other.to_string(), "E:\\x");
    }

    #[test]
    fn test_posix_absolute_join_replaces() {
        let path = RemotePath::parse(FsConvention::Posix, "/home/u").join("/scratch/x");
        assert_eq!(path.to_string(), "/scratch/x");
    }

    #[test]
    fn test_join_posix_on_windows() {
        let path = RemotePath::parse(FsConvention::Windows, "C:\\run").join_posix("inputs/a.txt");
        assert_eq!(path.to_string(), "C:\\run\\inputs\\a.txt");
        assert_eq!(path.file_name(), Some("a.txt"));
    }

    #[test]
    fn test_parent_and_relative() {
        let base = RemotePath::parse(FsConvention::Posix, "/w/abc");
        let file = base.join_posix("out/result.dat");
        assert_eq!(file.parent().unwrap().to_string(), "/w/abc/out");
        assert_eq!(file.relative_to(&base).as_deref(), Some("out/result.dat"));
        assert_eq!(base.relative_to(&file), None);
        assert_eq!(base.child("x.out").to_string(), "/w/abc/x.out");
    }

    #[test]
    fn test_relative_rendering() {
        assert_eq!(RemotePath::parse(FsConvention::Posix, "./").to_string(), ".");
        assert_eq!(RemotePath::parse(FsConvention::Posix, "a//b/").to_string(), "a/b");
        assert!(!RemotePath::parse(FsConvention::Windows, "\\x").is_absolute());
    }

    #[test]
    fn test_convention_parse() {
        assert_eq!("windows".parse::<FsConvention>().unwrap(), FsConvention::Windows);
        assert!("vms".parse::<FsConvention>().is_err());
        assert_eq!(FsConvention::default(), FsConvention::Posix);
    }
}
