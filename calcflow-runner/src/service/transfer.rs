//! File transfer service
//!
//! Stages upload manifests into a remote folder and collects the files a
//! finished job left behind. Manifest keys are resolved against the remote
//! folder here, in the profile's path convention.

use anyhow::{Context, Result, bail};
use calcflow_core::domain::{Profile, TransferMode};
use calcflow_core::manifest::{DownloadMatcher, UploadManifest};
use calcflow_core::path::RemotePath;
use std::collections::BTreeMap;
use tracing::debug;

use crate::gateway::{EntryKind, Gateway};
use crate::object_store::ObjectStore;

/// A file found while walking a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: RemotePath,
    /// Path relative to the walked folder, in POSIX form
    pub relative: String,
    pub size: u64,
}

/// Uploads raw bytes, choosing the transfer mode from the profile threshold
pub async fn upload_bytes(
    gateway: &dyn Gateway,
    profile: &Profile,
    target: &RemotePath,
    content: Vec<u8>,
) -> Result<TransferMode> {
    let mode = profile.transfer_mode(content.len() as u64);
    debug!("Uploading {} ({} bytes, {:?})", target, content.len(), mode);
    gateway
        .upload(target, content, mode)
        .await
        .with_context(|| format!("Failed to upload {}", target))?;
    Ok(mode)
}

/// Stages every manifest entry below `folder`
///
/// Directory entries are created; file entries get their parent created and
/// their object-store content uploaded.
///
/// # Returns
/// The number of files uploaded
pub async fn stage_manifest(
    gateway: &dyn Gateway,
    objects: &dyn ObjectStore,
    profile: &Profile,
    folder: &RemotePath,
    manifest: &UploadManifest,
) -> Result<usize> {
    let mut uploaded = 0;

    for entry in manifest.resolve(folder) {
        match &entry.key {
            None => {
                gateway
                    .mkdir(&entry.target)
                    .await
                    .with_context(|| format!("Failed to create directory {}", entry.target))?;
            }
            Some(key) => {
                if let Some(parent) = entry.target.parent() {
                    if &parent != folder {
                        gateway
                            .mkdir(&parent)
                            .await
                            .with_context(|| format!("Failed to create directory {}", parent))?;
                    }
                }

                let content = objects
                    .get(key)
                    .await
                    .with_context(|| format!("Missing content for {}", entry.relative))?;
                upload_bytes(gateway, profile, &entry.target, content).await?;
                uploaded += 1;
            }
        }
    }

    Ok(uploaded)
}

/// Lists every file below `root`, depth first
///
/// Links and special entries are skipped. Each directory listing counts
/// against `max_calls`; running out of budget is an error rather than a
/// silently partial result.
pub async fn walk_files(
    gateway: &dyn Gateway,
    root: &RemotePath,
    max_calls: usize,
) -> Result<Vec<RemoteFile>> {
    let mut files = Vec::new();
    let mut pending = vec![root.clone()];
    let mut calls = 0;

    while let Some(dir) = pending.pop() {
        if calls == max_calls {
            bail!(
                "Listing {} needs more than {} directory listings",
                root,
                max_calls
            );
        }
        calls += 1;

        let entries = gateway
            .list_dir(&dir)
            .await
            .with_context(|| format!("Failed to list {}", dir))?;

        // Reverse so the stack pops entries in listing order
        for entry in entries.into_iter().rev() {
            let path = dir.child(&entry.name);
            match entry.kind {
                EntryKind::Directory => pending.push(path),
                EntryKind::File => {
                    let relative = path.relative_to(root).unwrap_or_else(|| entry.name.clone());
                    files.push(RemoteFile {
                        path,
                        relative,
                        size: entry.size,
                    });
                }
                EntryKind::Other => debug!("Skipping non-regular entry {}", path),
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Downloads the files below `folder` that match the download globs
///
/// # Returns
/// Relative POSIX path → object-store key of every retrieved file
pub async fn retrieve_matching(
    gateway: &dyn Gateway,
    objects: &dyn ObjectStore,
    profile: &Profile,
    folder: &RemotePath,
    matcher: &DownloadMatcher,
    max_calls: usize,
) -> Result<BTreeMap<String, String>> {
    let mut retrieved = BTreeMap::new();

    for file in walk_files(gateway, folder, max_calls).await? {
        if !matcher.is_match(&file.relative) {
            continue;
        }

        let mode = profile.transfer_mode(file.size);
        let content = gateway
            .download(&file.path, mode)
            .await
            .with_context(|| format!("Failed to download {}", file.path))?;
        let key = objects.add_bytes(content).await?;

        debug!("Retrieved {} as {}", file.relative, key);
        retrieved.insert(file.relative, key);
    }

    Ok(retrieved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::object_store::InMemoryObjectStore;
    use calcflow_core::domain::{Credentials, TransferMode};
    use calcflow_core::ids::ProfileId;
    use calcflow_core::manifest::DownloadGlobs;
    use calcflow_core::path::FsConvention;

    fn profile(convention: FsConvention, work_dir: &str) -> Profile {
        Profile {
            id: ProfileId(1),
            label: "p".to_string(),
            gateway_url: "https://gw".to_string(),
            credentials: Credentials::new("c", "s", "t"),
            machine_name: "m".to_string(),
            work_dir: work_dir.to_string(),
            fs_convention: convention,
            small_file_size_bytes: 4,
        }
    }

    #[tokio::test]
    async fn test_stage_manifest_modes_and_dirs() {
        let gateway = MemoryGateway::new();
        let objects = InMemoryObjectStore::new();
        let small = objects.add_bytes(b"abc".to_vec()).await.unwrap();
        let large = objects.add_bytes(b"abcdefgh".to_vec()).await.unwrap();

        let profile = profile(FsConvention::Posix, "/w");
        let folder = RemotePath::parse(FsConvention::Posix, "/w/run");
        gateway.mkdir(&folder).await.unwrap();

        let manifest = UploadManifest::new()
            .with_dir("empty/nested")
            .with_file("small.txt", small)
            .with_file("data/large.bin", large);

        let uploaded = stage_manifest(&gateway, &objects, &profile, &folder, &manifest)
            .await
            .unwrap();
        assert_eq!(uploaded, 2);
        assert!(gateway.is_dir("/w/run/empty/nested").await);
        assert_eq!(gateway.file("/w/run/small.txt").await, Some(b"abc".to_vec()));

        let transfers = gateway.transfers().await;
        let mode_of = |path: &str| transfers.iter().find(|t| t.path == path).map(|t| t.mode);
        assert_eq!(mode_of("/w/run/small.txt"), Some(TransferMode::Direct));
        assert_eq!(mode_of("/w/run/data/large.bin"), Some(TransferMode::Staged));
    }

    #[tokio::test]
    async fn test_stage_manifest_missing_object() {
        let gateway = MemoryGateway::new();
        let objects = InMemoryObjectStore::new();
        let folder = RemotePath::parse(FsConvention::Posix, "/w/run");
        gateway.mkdir(&folder).await.unwrap();

        let manifest = UploadManifest::new().with_file("a.txt", "0".repeat(64));
        let err = stage_manifest(
            &gateway,
            &objects,
            &profile(FsConvention::Posix, "/w"),
            &folder,
            &manifest,
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Missing content for a.txt"));
    }

    #[tokio::test]
    async fn test_walk_and_retrieve_windows() {
        let gateway = MemoryGateway::new();
        let objects = InMemoryObjectStore::new();
        let profile = profile(FsConvention::Windows, "C:\\w");
        let folder = RemotePath::parse(FsConvention::Windows, "C:\\w\\run");
        gateway.mkdir(&folder.join("out")).await.unwrap();
        for (name, content) in [("job.out", "1"), ("out\\a.csv", "22"), ("out\\b.log", "333")] {
            gateway
                .upload(&folder.join(name), content.as_bytes().to_vec(), TransferMode::Direct)
                .await
                .unwrap();
        }

        let files = walk_files(&gateway, &folder, 10).await.unwrap();
        let relative: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relative, vec!["job.out", "out/a.csv", "out/b.log"]);

        let matcher = DownloadGlobs::new(["*.out", "out/*.csv"]).matcher().unwrap();
        let retrieved = retrieve_matching(&gateway, &objects, &profile, &folder, &matcher, 10)
            .await
            .unwrap();
        assert_eq!(retrieved.len(), 2);
        assert_eq!(objects.get(&retrieved["out/a.csv"]).await.unwrap(), b"22");
        assert!(!retrieved.contains_key("out/b.log"));
    }

    #[tokio::test]
    async fn test_walk_respects_call_budget() {
        let gateway = MemoryGateway::new();
        let folder = RemotePath::parse(FsConvention::Posix, "/w/run");
        gateway.mkdir(&folder.join("a/b/c")).await.unwrap();

        assert!(walk_files(&gateway, &folder, 4).await.is_ok());
        let err = walk_files(&gateway, &folder, 2).await.unwrap_err();
        assert!(err.to_string().contains("more than 2"));
    }
}
