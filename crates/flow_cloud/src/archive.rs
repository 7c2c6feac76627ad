//! Source packaging: directory tree → gzip-compressed tar.
//!
//! The archive is the build context for both the managed build service and
//! the local Docker daemon, so paths inside it are relative to the packaged
//! directory.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::task::spawn_blocking;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CloudError, CloudResult};

/// Content type used when uploading an archive.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// A packaged source tree held in memory.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    bytes: Vec<u8>,
    file_count: usize,
}

impl BuildArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of regular files in the archive.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Package a directory into a tar.gz artifact.
pub async fn package_directory(src: &Path) -> CloudResult<BuildArtifact> {
    let src = src.to_owned();
    spawn_blocking(move || package_directory_sync(&src))
        .await
        .map_err(|e| CloudError::Archive(format!("packaging task failed: {}", e)))?
}

/// Extract an artifact produced by [`package_directory`] into `dest`.
pub async fn unpack_archive(bytes: &[u8], dest: &Path) -> CloudResult<()> {
    let bytes = bytes.to_vec();
    let dest = dest.to_owned();
    spawn_blocking(move || unpack_archive_sync(&bytes, &dest))
        .await
        .map_err(|e| CloudError::Archive(format!("unpack task failed: {}", e)))?
}

fn package_directory_sync(src: &Path) -> CloudResult<BuildArtifact> {
    if !src.is_dir() {
        return Err(CloudError::Archive(format!(
            "source directory not found: {}",
            src.display()
        )));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut file_count = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| CloudError::Archive(e.to_string()))?;
        let path = entry.path();
        if path == src {
            continue;
        }

        let relative = relative_path(src, path)?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(&relative, path)?;
        } else if file_type.is_file() || file_type.is_symlink() {
            builder.append_path_with_name(path, &relative)?;
            if file_type.is_file() {
                file_count += 1;
            }
        }
    }

    let encoder = builder.into_inner()?;
    let bytes = encoder.finish()?;

    debug!(
        source = %src.display(),
        files = file_count,
        compressed_size = bytes.len(),
        "packaged source archive"
    );

    Ok(BuildArtifact { bytes, file_count })
}

fn unpack_archive_sync(bytes: &[u8], dest: &Path) -> CloudResult<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    archive.set_preserve_permissions(true);
    archive.unpack(dest)?;
    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> CloudResult<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|e| CloudError::Archive(e.to_string()))
}
