//! # OCI Registry Image Fetching
//!
//! Resolves an image reference to a platform manifest and downloads its
//! config and layer blobs into the content store.
//!
//! ## Security Model
//!
//! - References are validated against `MAX_IMAGE_REF_LEN` and a character
//!   allowlist before parsing
//! - Layer count is bounded by `MAX_LAYERS`, layer size by `MAX_LAYER_SIZE`,
//!   config size by `MAX_CONFIG_SIZE`
//! - Every blob is digest-verified by [`BlobStore::put_blob`] before storage
//!
//! ## Manifest Resolution
//!
//! For multi-platform images (Image Index) the manifest matching the host
//! OS and architecture is pulled. If none matches, the error lists the
//! available platforms.
//!
//! ## Deduplication
//!
//! Blobs already present in the content store are not downloaded again.
//!
//! ## Pluggable Transport
//!
//! The local runtime fetches through the [`ImageFetcher`] trait.
//! [`RegistryFetcher`] speaks the OCI distribution protocol; tests and
//! air-gapped setups substitute their own.
//!
//! [`BlobStore::put_blob`]: crate::storage::BlobStore::put_blob

use crate::client::{ImageConfig, ImageHandle, LayerInfo};
use crate::constants::{MAX_CONFIG_SIZE, MAX_LAYER_SIZE, MAX_LAYERS, validate_image_ref};
use crate::error::{RuntimeError, RuntimeResult};
use crate::platform::{Arch, Os, Platform};
use crate::storage::BlobStore;
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use serde::Deserialize;
use tracing::{debug, info};

/// Fetches image content into a content store.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Resolves `reference` and stores its config and layers in `storage`.
    async fn fetch(&self, reference: &str, storage: &BlobStore) -> RuntimeResult<ImageHandle>;
}

/// Fetches images from OCI distribution registries.
///
/// | Method | Constructor |
/// |--------|-------------|
/// | Anonymous | [`RegistryFetcher::new`] |
/// | Basic auth | [`RegistryFetcher::with_auth`] |
pub struct RegistryFetcher {
    client: Client,
    auth: RegistryAuth,
    platform: Platform,
}

impl RegistryFetcher {
    /// Creates a fetcher with anonymous auth for the host platform.
    pub fn new() -> Self {
        Self {
            client: Client::new(ClientConfig {
                protocol: ClientProtocol::Https,
                ..Default::default()
            }),
            auth: RegistryAuth::Anonymous,
            platform: Platform::detect(),
        }
    }

    /// Creates a fetcher with basic auth.
    pub fn with_auth(username: &str, password: &str) -> Self {
        Self {
            auth: RegistryAuth::Basic(username.to_string(), password.to_string()),
            ..Self::new()
        }
    }

    /// Resolves manifests for a specific platform instead of the host's.
    pub fn for_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    async fn pull_blob(
        &self,
        reference: &Reference,
        blob: &LayerInfo,
        storage: &BlobStore,
    ) -> RuntimeResult<()> {
        if storage.has_blob(&blob.digest) {
            debug!("Blob {} already cached", blob.digest);
            return Ok(());
        }

        debug!("Pulling blob: {} ({} bytes)", blob.digest, blob.size);

        let descriptor = OciDescriptor {
            digest: blob.digest.clone(),
            size: blob.size as i64,
            media_type: blob.media_type.clone(),
            urls: None,
            annotations: None,
        };

        let mut data = Vec::new();
        self.client
            .pull_blob(reference, &descriptor, &mut data)
            .await
            .map_err(|e| RuntimeError::ImagePullFailed {
                reference: reference.to_string(),
                reason: format!("failed to pull blob {}: {}", blob.digest, e),
            })?;

        storage.put_blob(&blob.digest, &data)
    }
}

impl Default for RegistryFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for RegistryFetcher {
    async fn fetch(&self, image_ref: &str, storage: &BlobStore) -> RuntimeResult<ImageHandle> {
        validate_image_ref(image_ref).map_err(|reason| RuntimeError::InvalidImageReference {
            reference: image_ref.to_string(),
            reason,
        })?;

        let reference: Reference =
            image_ref
                .parse()
                .map_err(|e| RuntimeError::InvalidImageReference {
                    reference: image_ref.to_string(),
                    reason: format!("{}", e),
                })?;

        info!(
            "Pulling image {} for platform {}",
            image_ref,
            self.platform.oci_platform()
        );

        let (manifest, digest) = self
            .client
            .pull_manifest(&reference, &self.auth)
            .await
            .map_err(|e| RuntimeError::ImagePullFailed {
                reference: image_ref.to_string(),
                reason: e.to_string(),
            })?;

        let resolved = resolve_manifest(
            &self.client,
            &reference,
            &self.auth,
            manifest,
            &self.platform,
        )
        .await?;

        if resolved.layers.len() > MAX_LAYERS {
            return Err(RuntimeError::ImagePullFailed {
                reference: image_ref.to_string(),
                reason: format!("too many layers: {} > {}", resolved.layers.len(), MAX_LAYERS),
            });
        }
        if resolved.config.size > MAX_CONFIG_SIZE as u64 {
            return Err(RuntimeError::ImageTooLarge {
                size: resolved.config.size,
                limit: MAX_CONFIG_SIZE as u64,
            });
        }
        if let Some(layer) = resolved
            .layers
            .iter()
            .find(|l| l.size > MAX_LAYER_SIZE as u64)
        {
            return Err(RuntimeError::ImageTooLarge {
                size: layer.size,
                limit: MAX_LAYER_SIZE as u64,
            });
        }

        self.pull_blob(&reference, &resolved.config, storage).await?;
        let config = parse_image_config(&storage.get_blob(&resolved.config.digest)?)?;

        for layer in &resolved.layers {
            self.pull_blob(&reference, layer, storage).await?;
        }

        info!(
            "Pulled {} ({} layers, {})",
            image_ref,
            resolved.layers.len(),
            digest
        );

        let mut handle = ImageHandle::new(image_ref, digest);
        handle.platform = resolved.platform;
        handle.layers = resolved.layers;
        handle.config_digest = resolved.config.digest;
        handle.config = config;
        Ok(handle)
    }
}

/// A platform manifest reduced to what unpacking needs.
struct ResolvedManifest {
    layers: Vec<LayerInfo>,
    config: LayerInfo,
    platform: String,
}

fn descriptor_info(descriptor: OciDescriptor) -> LayerInfo {
    LayerInfo {
        digest: descriptor.digest,
        size: descriptor.size.max(0) as u64,
        media_type: descriptor.media_type,
    }
}

/// Resolves a manifest (handling multi-arch index).
async fn resolve_manifest(
    client: &Client,
    reference: &Reference,
    auth: &RegistryAuth,
    manifest: OciManifest,
    platform: &Platform,
) -> RuntimeResult<ResolvedManifest> {
    match manifest {
        OciManifest::Image(img) => Ok(ResolvedManifest {
            layers: img.layers.into_iter().map(descriptor_info).collect(),
            config: descriptor_info(img.config),
            platform: platform.oci_platform(),
        }),

        OciManifest::ImageIndex(index) => {
            // Containers are Linux; a macOS host still wants the linux image.
            let target_os = match platform.os {
                Os::Linux | Os::Darwin | Os::Unknown => Os::Linux.oci_name(),
                Os::Windows => Os::Windows.oci_name(),
            };
            let target_arch = match platform.arch {
                Arch::Unknown => Arch::Amd64.oci_name(),
                arch => arch.oci_name(),
            };

            let matching = index.manifests.iter().find(|m| {
                m.platform
                    .as_ref()
                    .is_some_and(|p| p.os == target_os && p.architecture == target_arch)
            });

            let manifest_desc = matching.ok_or_else(|| {
                let available: Vec<String> = index
                    .manifests
                    .iter()
                    .filter_map(|m| m.platform.as_ref())
                    .map(|p| format!("{}/{}", p.os, p.architecture))
                    .collect();

                RuntimeError::ImagePullFailed {
                    reference: reference.to_string(),
                    reason: format!(
                        "no manifest for {}/{}. Available: {}",
                        target_os,
                        target_arch,
                        available.join(", ")
                    ),
                }
            })?;

            let platform_ref: Reference = format!(
                "{}/{}@{}",
                reference.registry(),
                reference.repository(),
                manifest_desc.digest
            )
            .parse()
            .map_err(|e| RuntimeError::ImagePullFailed {
                reference: reference.to_string(),
                reason: format!("failed to build digest reference: {}", e),
            })?;

            let (platform_manifest, _) =
                client
                    .pull_manifest(&platform_ref, auth)
                    .await
                    .map_err(|e| RuntimeError::ImagePullFailed {
                        reference: reference.to_string(),
                        reason: format!("failed to pull platform manifest: {}", e),
                    })?;

            match platform_manifest {
                OciManifest::Image(img) => Ok(ResolvedManifest {
                    layers: img.layers.into_iter().map(descriptor_info).collect(),
                    config: descriptor_info(img.config),
                    platform: format!("{}/{}", target_os, target_arch),
                }),
                _ => Err(RuntimeError::ImagePullFailed {
                    reference: reference.to_string(),
                    reason: "nested image index not supported".to_string(),
                }),
            }
        }
    }
}

#[derive(Deserialize)]
struct RawImageConfig {
    #[serde(default)]
    config: Option<RawProcessConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProcessConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    entrypoint: Option<Vec<String>>,
    #[serde(default)]
    cmd: Option<Vec<String>>,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

/// Parses the process defaults out of an OCI image config blob.
pub fn parse_image_config(data: &[u8]) -> RuntimeResult<ImageConfig> {
    let raw: RawImageConfig = serde_json::from_slice(data)
        .map_err(|e| RuntimeError::Serialization(format!("invalid image config: {}", e)))?;

    Ok(match raw.config {
        Some(process) => ImageConfig {
            env: process.env.unwrap_or_default(),
            entrypoint: process.entrypoint.unwrap_or_default(),
            cmd: process.cmd.unwrap_or_default(),
            working_dir: process.working_dir.filter(|d| !d.is_empty()),
            user: process.user.filter(|u| !u.is_empty()),
        },
        None => ImageConfig::default(),
    })
}
