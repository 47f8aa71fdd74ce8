#![forbid(unsafe_code)]

//! Durable storage for uploaded media (video files and thumbnails).
//!
//! Handlers only see the [`AssetStore`] trait: hand over a local file, get back
//! a reference string that is stored on the entity. [`LocalAssetStore`] keeps
//! content-addressed copies under a directory and serves them at
//! `{public_url}/assets/{name}`.

use std::{
    fs::File,
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;

pub const ASSET_ROUTE_PREFIX: &str = "/assets";

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Copies the file at `local_path` into durable storage and returns the
    /// reference clients use to fetch it.
    async fn upload(&self, local_path: &Path) -> Result<String>;

    /// Directory backing `/assets/*` when this store serves files itself.
    fn local_root(&self) -> Option<&Path> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating asset directory {}", root.display()))?;
        Ok(Self {
            root,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn reference_for(&self, name: &str) -> String {
        format!("{}{ASSET_ROUTE_PREFIX}/{name}", self.public_url)
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(&self, local_path: &Path) -> Result<String> {
        let source = local_path.to_path_buf();
        let root = self.root.clone();
        let name = tokio::task::spawn_blocking(move || store_content_addressed(&source, &root))
            .await
            .context("asset upload task panicked")??;
        tracing::debug!(asset = %name, "stored asset");
        Ok(self.reference_for(&name))
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// Hashes the source, then copies it to `{root}/{hash}.{ext}` via a temporary
/// file so readers never observe a partial asset. Identical uploads share one
/// file.
fn store_content_addressed(source: &Path, root: &Path) -> Result<String> {
    let mut file =
        File::open(source).with_context(|| format!("opening upload {}", source.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("reading upload"),
        };
        hasher.update(&buffer[..read]);
    }

    let hash = hasher.finalize().to_hex();
    let name = match sanitized_extension(source) {
        Some(ext) => format!("{hash}.{ext}"),
        None => hash.to_string(),
    };
    let target = root.join(&name);
    if target.exists() {
        return Ok(name);
    }

    // Each writer stages its own copy; the first to publish wins.
    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(root)
        .with_context(|| format!("staging asset in {}", root.display()))?;
    let mut source_file =
        File::open(source).with_context(|| format!("reopening upload {}", source.display()))?;
    io::copy(&mut source_file, staged.as_file_mut())
        .with_context(|| format!("copying upload into {}", root.display()))?;
    staged
        .as_file()
        .sync_all()
        .context("flushing staged asset")?;

    match staged.persist_noclobber(&target) {
        Ok(_) => Ok(name),
        Err(_) if target.exists() => Ok(name),
        Err(err) => Err(err.error)
            .with_context(|| format!("publishing asset {}", target.display())),
    }
}

fn sanitized_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

/// Maps a requested asset name to a path under `root`, refusing anything but a
/// single plain file name.
pub fn resolve_asset_path(root: &Path, name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    let mut components = candidate.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.starts_with('.') => Some(root.join(candidate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upload_copies_file_and_returns_reference() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalAssetStore::new(dir.path().join("assets"), "http://cdn.test/")?;
        let source = dir.path().join("clip.MP4");
        std::fs::write(&source, b"fake video bytes")?;

        let reference = store.upload(&source).await?;
        let expected_hash = blake3::hash(b"fake video bytes").to_hex();
        assert_eq!(
            reference,
            format!("http://cdn.test/assets/{expected_hash}.mp4")
        );

        let stored = dir.path().join("assets").join(format!("{expected_hash}.mp4"));
        assert_eq!(std::fs::read(stored)?, b"fake video bytes");
        Ok(())
    }

    #[tokio::test]
    async fn identical_uploads_share_a_reference() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalAssetStore::new(dir.path().join("assets"), "http://cdn.test")?;
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        std::fs::write(&first, b"same")?;
        std::fs::write(&second, b"same")?;

        assert_eq!(store.upload(&first).await?, store.upload(&second).await?);
        let entries = std::fs::read_dir(dir.path().join("assets"))?.count();
        assert_eq!(entries, 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_uploads_all_succeed() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(LocalAssetStore::new(
            dir.path().join("assets"),
            "http://cdn.test",
        )?);
        let payload: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

        let mut handles = Vec::new();
        for index in 0..6 {
            let source = dir.path().join(format!("upload-{index}.mp4"));
            std::fs::write(&source, &payload)?;
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.upload(&source).await }));
        }

        let mut references = Vec::new();
        for handle in handles {
            references.push(handle.await??);
        }
        references.dedup();
        assert_eq!(references.len(), 1);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("assets"))?
            .collect::<io::Result<_>>()?;
        assert_eq!(entries.len(), 1, "staging files must not be left behind");
        assert_eq!(std::fs::read(entries[0].path())?, payload);
        Ok(())
    }

    #[tokio::test]
    async fn upload_of_missing_file_fails() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalAssetStore::new(dir.path().join("assets"), "http://cdn.test")?;
        assert!(store.upload(&dir.path().join("ghost.mp4")).await.is_err());
        Ok(())
    }

    #[test]
    fn odd_extensions_are_dropped() {
        assert_eq!(sanitized_extension(Path::new("a.JPG")).as_deref(), Some("jpg"));
        assert_eq!(sanitized_extension(Path::new("a")), None);
        assert_eq!(sanitized_extension(Path::new("a.we!rd")), None);
        assert_eq!(sanitized_extension(Path::new("a.averyverylongext")), None);
    }

    #[test]
    fn asset_names_cannot_escape_root() {
        let root = Path::new("/srv/assets");
        assert_eq!(
            resolve_asset_path(root, "abc.mp4"),
            Some(PathBuf::from("/srv/assets/abc.mp4"))
        );
        assert_eq!(resolve_asset_path(root, "../secret"), None);
        assert_eq!(resolve_asset_path(root, "nested/file"), None);
        assert_eq!(resolve_asset_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_asset_path(root, ".abc.mp4.tmp"), None);
        assert_eq!(resolve_asset_path(root, ""), None);
    }
}
