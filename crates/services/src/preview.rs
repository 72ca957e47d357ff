//! Image previews for staged attachments.
//!
//! A decoded preview is a `data:` URL held by exactly one [`PreviewHandle`].
//! Handles are registered with a [`PreviewRegistry`], which keeps the books on
//! what is still alive. Releasing a handle consumes it, and a handle that is
//! dropped without an explicit release is released by its destructor, so a
//! preview can be neither leaked nor released twice.

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use shared::files::FileBlob;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    #[error("{0} is not an image")]
    NotAnImage(String),

    #[error("Failed to read image: {0}")]
    Decode(String),

    #[error("Failed to encode preview: {0}")]
    Encode(String),

    #[error("Preview worker failed: {0}")]
    Join(String),
}

/// Turns an image blob into a self-contained displayable string.
#[async_trait]
pub trait PreviewDecoder: Send + Sync {
    async fn decode(&self, blob: &FileBlob) -> Result<String, PreviewError>;
}

/// Decodes with the `image` crate, scales down to `max_dimension` and
/// re-encodes as a PNG data URL.
#[derive(Debug, Clone)]
pub struct ImagePreviewDecoder {
    max_dimension: u32,
}

impl ImagePreviewDecoder {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl Default for ImagePreviewDecoder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl PreviewDecoder for ImagePreviewDecoder {
    async fn decode(&self, blob: &FileBlob) -> Result<String, PreviewError> {
        if !blob.is_image() {
            return Err(PreviewError::NotAnImage(blob.name.clone()));
        }
        let bytes = blob.bytes.clone();
        let max = self.max_dimension;
        tokio::task::spawn_blocking(move || render_data_url(&bytes, max))
            .await
            .map_err(|e| PreviewError::Join(e.to_string()))?
    }
}

fn render_data_url(bytes: &[u8], max_dimension: u32) -> Result<String, PreviewError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| PreviewError::Decode(e.to_string()))?;
    let image = if image.width() > max_dimension || image.height() > max_dimension {
        image.thumbnail(max_dimension, max_dimension)
    } else {
        image
    };

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PreviewError::Encode(e.to_string()))?;

    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&png)
    ))
}

/// Raw RGBA pixels of a preview, ready to upload as a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Inverse of [`ImagePreviewDecoder`]: turn a base64 image `data:` URL back into pixels.
pub fn decode_preview_url(url: &str) -> Result<PreviewPixels, PreviewError> {
    let encoded = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .ok_or_else(|| PreviewError::Decode("not a base64 data URL".into()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PreviewError::Decode(e.to_string()))?;
    let rgba = image::load_from_memory(&bytes)
        .map_err(|e| PreviewError::Decode(e.to_string()))?
        .to_rgba8();

    Ok(PreviewPixels {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    /// Handles registered and not yet released
    pub live: usize,
    /// Size of the live preview strings
    pub live_bytes: usize,
    pub created: u64,
    pub released: u64,
    /// Release calls for ids that were not live; always 0 unless something is broken
    pub invalid_releases: u64,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    live: HashMap<u64, usize>,
    created: u64,
    released: u64,
    invalid_releases: u64,
}

#[derive(Default)]
pub struct PreviewRegistry {
    state: Mutex<RegistryState>,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take ownership of a decoded preview.
    pub fn register(self: &Arc<Self>, url: String) -> PreviewHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, url.len());
        state.created += 1;
        PreviewHandle {
            id,
            url,
            registry: Arc::clone(self),
        }
    }

    pub fn stats(&self) -> PreviewStats {
        let state = self.state.lock();
        PreviewStats {
            live: state.live.len(),
            live_bytes: state.live.values().sum(),
            created: state.created,
            released: state.released,
            invalid_releases: state.invalid_releases,
        }
    }

    fn release(&self, id: u64) {
        let mut state = self.state.lock();
        if state.live.remove(&id).is_some() {
            state.released += 1;
        } else {
            state.invalid_releases += 1;
            tracing::warn!(preview_id = id, "release of a preview that is not live");
        }
    }
}

/// Sole owner of one preview string.
pub struct PreviewHandle {
    id: u64,
    url: String,
    registry: Arc<PreviewRegistry>,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Free the preview now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("len", &self.url.len())
            .finish()
    }
}
