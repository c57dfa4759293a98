//! # Native Snapshotter
//!
//! Materialises image layers as plain directories under the state root:
//!
//! ```text
//! <root>/snapshots/native/
//! ├── sha256-abcd.../       committed, read-only view of an image
//! └── .tmp-<uuid>/          in-progress unpack, renamed on success
//! ```
//!
//! A committed snapshot is keyed by the image's manifest digest and never
//! modified afterwards. Containers get a writable copy via
//! [`Snapshotter::prepare`].
//!
//! ## Layer Application
//!
//! Layers are applied bottom-to-top with OCI whiteout semantics:
//!
//! - `.wh.<name>` deletes `<name>` from lower layers
//! - `.wh..wh..opq` empties its directory of lower-layer content
//!
//! ## Security Model
//!
//! - Entry paths with `..`, a root, or a prefix component are rejected
//! - Each layer blob is bounded by `MAX_LAYER_SIZE`
//! - Total extracted size is bounded by `MAX_ROOTFS_SIZE`
//! - Extraction happens in a temp directory that is removed on failure, so
//!   a half-applied image is never committed

use crate::client::{ImageHandle, LayerInfo};
use crate::constants::{DEFAULT_SNAPSHOTTER, MAX_LAYER_SIZE, MAX_ROOTFS_SIZE, SNAPSHOTS_DIR};
use crate::error::{RuntimeError, RuntimeResult};
use crate::storage::BlobStore;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Copy-based snapshotter rooted in the state directory.
#[derive(Debug, Clone)]
pub struct Snapshotter {
    name: String,
    base_dir: PathBuf,
}

impl Snapshotter {
    /// Opens a snapshotter by name. Only `native` is available.
    pub fn open(root: &Path, name: &str) -> RuntimeResult<Self> {
        if name != DEFAULT_SNAPSHOTTER {
            return Err(RuntimeError::UnsupportedSnapshotter(name.to_string()));
        }

        let base_dir = root.join(SNAPSHOTS_DIR).join(name);
        fs::create_dir_all(&base_dir).map_err(|e| RuntimeError::StorageInitFailed {
            path: base_dir.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            base_dir,
        })
    }

    /// Snapshotter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of the committed snapshot for an image digest.
    pub fn committed_path(&self, image_digest: &str) -> PathBuf {
        let safe_digest = image_digest.replace([':', '/'], "-");
        self.base_dir.join(safe_digest)
    }

    /// Returns true if the image is already unpacked.
    pub fn is_committed(&self, image_digest: &str) -> bool {
        self.committed_path(image_digest).is_dir()
    }

    /// Unpacks an image's layers into a committed snapshot.
    ///
    /// Idempotent: an existing snapshot for the same digest is reused.
    pub fn unpack(&self, image: &ImageHandle, storage: &BlobStore) -> RuntimeResult<PathBuf> {
        let target = self.committed_path(&image.digest);
        if target.is_dir() {
            debug!("Snapshot for {} already committed", image.digest);
            return Ok(target);
        }

        let staging = self
            .base_dir
            .join(format!(".tmp-{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&staging)?;

        let result = apply_layers(&image.layers, &staging, storage).and_then(|size| {
            match fs::rename(&staging, &target) {
                Ok(()) => Ok(size),
                // Lost a race with another unpack of the same image.
                Err(_) if target.is_dir() => {
                    let _ = fs::remove_dir_all(&staging);
                    Ok(size)
                }
                Err(e) => Err(RuntimeError::UnpackFailed {
                    reference: image.reference.clone(),
                    snapshotter: self.name.clone(),
                    reason: format!("failed to commit snapshot: {}", e),
                }),
            }
        });

        match result {
            Ok(size) => {
                info!(
                    "Unpacked {} ({} layers, {} bytes) into {}",
                    image.reference,
                    image.layers.len(),
                    size,
                    self.name
                );
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }

    /// Prepares a writable copy of a committed snapshot at `dest`.
    pub fn prepare(&self, image_digest: &str, dest: &Path) -> RuntimeResult<()> {
        let source = self.committed_path(image_digest);
        if !source.is_dir() {
            return Err(RuntimeError::BlobNotFound {
                digest: image_digest.to_string(),
            });
        }
        copy_tree(&source, dest)?;
        Ok(())
    }
}

/// Applies layers bottom-to-top into `rootfs`, returning the bytes written.
pub fn apply_layers(
    layers: &[LayerInfo],
    rootfs: &Path,
    storage: &BlobStore,
) -> RuntimeResult<u64> {
    let mut total_size = 0u64;

    for layer in layers {
        debug!("Extracting layer: {}", layer.digest);

        let blob = storage.open_blob(&layer.digest)?;
        let blob_size = blob.metadata()?.len();
        if blob_size > MAX_LAYER_SIZE as u64 {
            return Err(RuntimeError::ImageTooLarge {
                size: blob_size,
                limit: MAX_LAYER_SIZE as u64,
            });
        }

        let mut reader = BufReader::new(blob);
        let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        let stream: Box<dyn Read> = if compressed {
            Box::new(GzDecoder::new(reader))
        } else {
            Box::new(reader)
        };

        apply_layer(&layer.digest, stream, rootfs, &mut total_size)?;
    }

    Ok(total_size)
}

fn apply_layer(
    digest: &str,
    stream: impl Read,
    rootfs: &Path,
    total_size: &mut u64,
) -> RuntimeResult<()> {
    let failed = |e: std::io::Error| RuntimeError::LayerExtractionFailed {
        digest: digest.to_string(),
        reason: e.to_string(),
    };

    let root = rootfs.canonicalize().map_err(failed)?;
    let mut archive = Archive::new(stream);
    archive.set_preserve_permissions(true);
    archive.set_unpack_xattrs(false);

    // Opaque whiteouts only hide lower layers, not this layer's own entries.
    let mut written: HashSet<PathBuf> = HashSet::new();

    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let path = entry.path().map_err(failed)?.into_owned();
        check_entry_path(&path)?;

        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let parent = path.parent().unwrap_or(Path::new(""));

        if filename == OPAQUE_WHITEOUT {
            if let Some(dir) = resolve_parent(&root, parent)? {
                clear_directory(&dir, parent, &written)?;
            }
            continue;
        }
        if let Some(target) = filename.strip_prefix(WHITEOUT_PREFIX) {
            if matches!(target, "" | "." | "..") {
                return Err(RuntimeError::PathTraversal {
                    path: path.to_string_lossy().into_owned(),
                });
            }
            if let Some(dir) = resolve_parent(&root, parent)? {
                remove_path(&dir.join(target))?;
            }
            continue;
        }

        *total_size += entry.size();
        if *total_size > MAX_ROOTFS_SIZE {
            return Err(RuntimeError::ImageTooLarge {
                size: *total_size,
                limit: MAX_ROOTFS_SIZE,
            });
        }

        // A lower layer's directory may be replaced by a file or vice versa.
        if !filename.is_empty()
            && let Some(dir) = resolve_parent(&root, parent)?
        {
            let dest = dir.join(filename);
            if let Ok(meta) = fs::symlink_metadata(&dest)
                && (meta.is_dir() != entry.header().entry_type().is_dir())
            {
                remove_path(&dest)?;
            }
        }

        entry.unpack_in(rootfs).map_err(failed)?;
        written.insert(normalize(&path));
    }

    Ok(())
}

/// Rejects archive entries that would land outside the rootfs.
fn check_entry_path(path: &Path) -> RuntimeResult<()> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(RuntimeError::PathTraversal {
            path: path.to_string_lossy().into_owned(),
        });
    }
    Ok(())
}

/// Resolves an entry's parent directory for deletion.
///
/// Returns `None` if it does not exist. Symlinks planted by lower layers are
/// followed, so the resolved directory must still be inside `root`
/// (canonical).
fn resolve_parent(root: &Path, parent: &Path) -> RuntimeResult<Option<PathBuf>> {
    let dir = match root.join(parent).canonicalize() {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !dir.starts_with(root) {
        return Err(RuntimeError::PathTraversal {
            path: parent.to_string_lossy().into_owned(),
        });
    }
    Ok(Some(dir))
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn clear_directory(dir: &Path, relative: &Path, keep: &HashSet<PathBuf>) -> RuntimeResult<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    let relative = normalize(relative);
    for entry in entries {
        let entry = entry?;
        if keep.contains(&relative.join(entry.file_name())) {
            continue;
        }
        remove_path(&entry.path())?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> RuntimeResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(_) => {}
    }
    Ok(())
}

/// Recursively copies a directory, recreating symlinks rather than
/// following them.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    fs::set_permissions(dst, fs::metadata(src)?.permissions())?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to)?;
        }
        // Device nodes and fifos are skipped; the runtime provides /dev.
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
