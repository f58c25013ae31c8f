//! The configured centre logo and its revision tag.
//!
//! The revision is part of every render-cache key, so any change to the
//! logo (new path, or the same file with a new modification time) moves all
//! lookups onto fresh keys.

use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::UNIX_EPOCH,
};
use tokio::sync::RwLock;

/// Revision used when no logo is configured or it cannot be read.
pub const NO_WATERMARK: &str = "nologo";

/// Snapshot handed to the render path.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub revision: String,
    pub logo: Option<Arc<RgbaImage>>,
}

impl Watermark {
    pub fn none() -> Self {
        Self {
            revision: NO_WATERMARK.to_owned(),
            logo: None,
        }
    }
}

#[derive(Debug)]
struct Loaded {
    modified_ms: i64,
    watermark: Watermark,
}

#[derive(Debug, Default)]
struct Slot {
    path: Option<PathBuf>,
    loaded: Option<Loaded>,
}

#[derive(Debug, Default)]
pub struct WatermarkRegistry {
    slot: RwLock<Slot>,
}

/// `first 16 hex chars of SHA-256("{path}|{mtime_ms}")`.
pub fn revision_for(path: &Path, modified_ms: i64) -> String {
    let digest = Sha256::digest(format!("{}|{}", path.display(), modified_ms).as_bytes());
    let mut revision = hex::encode(digest);
    revision.truncate(16);
    revision
}

async fn modified_ms(path: &Path) -> std::io::Result<i64> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default())
}

async fn load(path: &Path, modified_ms: i64) -> Watermark {
    let revision = revision_for(path, modified_ms);
    let logo = match tokio::fs::read(path).await {
        Ok(bytes) => match image::load_from_memory(&bytes) {
            Ok(img) => Some(Arc::new(img.into_rgba8())),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Watermark could not be decoded; rendering without it");
                None
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Watermark could not be read; rendering without it");
            None
        }
    };
    tracing::info!(path = %path.display(), %revision, "Watermark loaded");
    Watermark { revision, logo }
}

impl WatermarkRegistry {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            slot: RwLock::new(Slot { path, loaded: None }),
        }
    }

    /// Point the registry at a different logo (or none).
    pub async fn configure(&self, path: Option<PathBuf>) {
        let mut slot = self.slot.write().await;
        slot.path = path;
        slot.loaded = None;
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.slot.read().await.path.clone()
    }

    /// Current watermark, reloading it when the file's mtime moved.
    ///
    /// The flag is `true` when the revision differs from the one previously
    /// served, so the caller can purge renders made with the old logo.
    pub async fn current(&self) -> (Watermark, bool) {
        let path = {
            let slot = self.slot.read().await;
            match &slot.path {
                Some(path) => path.clone(),
                None => return (Watermark::none(), false),
            }
        };

        let modified = match modified_ms(&path).await {
            Ok(ms) => ms,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Watermark file unavailable");
                let mut slot = self.slot.write().await;
                let changed = slot.loaded.take().is_some();
                return (Watermark::none(), changed);
            }
        };

        {
            let slot = self.slot.read().await;
            if let Some(loaded) = &slot.loaded {
                if loaded.modified_ms == modified && slot.path.as_ref() == Some(&path) {
                    return (loaded.watermark.clone(), false);
                }
            }
        }

        let watermark = load(&path, modified).await;
        let mut slot = self.slot.write().await;
        if slot.path.as_ref() != Some(&path) {
            // reconfigured while loading; the next call picks up the new path
            return (watermark, false);
        }
        let changed = slot
            .loaded
            .as_ref()
            .map(|l| l.watermark.revision != watermark.revision)
            .unwrap_or(true);
        slot.loaded = Some(Loaded {
            modified_ms: modified,
            watermark: watermark.clone(),
        });
        (watermark, changed)
    }
}
