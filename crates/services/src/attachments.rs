//! Files staged for the next outgoing message.
//!
//! The manager owns every staged [`UploadedFile`] and every preview attached to
//! one. Previews are released before their entry leaves the staged set, on
//! removal, on bulk clearing, and when the staged files are taken for sending.

use crate::preview::{PreviewDecoder, PreviewError, PreviewHandle, PreviewRegistry};
use futures::future::join_all;
use shared::files::{format_file_size, validate_file_size, validate_file_type, FileBlob};
use shared::ids::{IdGenerator, UuidIds};
use shared::settings::ChatSettings;
use std::sync::Arc;

/// A staged attachment.
#[derive(Debug)]
pub struct UploadedFile {
    pub id: String,
    pub file: FileBlob,
    preview: Option<PreviewHandle>,
}

impl UploadedFile {
    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(|p| p.url())
    }

    /// Registry id of the current preview; changes when the preview is replaced.
    pub fn preview_id(&self) -> Option<u64> {
        self.preview.as_ref().map(|p| p.id())
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    fn release_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            preview.release();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentOptions {
    pub max_files: Option<usize>,
    pub max_file_size_mb: Option<u64>,
    /// MIME types or extensions; empty accepts everything
    pub allowed_types: Vec<String>,
}

impl AttachmentOptions {
    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self {
            max_files: settings.max_files,
            max_file_size_mb: settings.max_file_size_mb,
            allowed_types: settings.allowed_types.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("Maximum {max} files allowed ({attempted} requested)")]
    TooManyFiles { max: usize, attempted: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {reason}")]
pub struct FileValidationError {
    pub name: String,
    pub reason: String,
}

/// An image file whose preview still has to be decoded.
#[derive(Debug, Clone)]
pub struct PendingPreview {
    pub file_id: String,
    pub blob: FileBlob,
}

#[derive(Debug, Default)]
pub struct StagedBatch {
    pub added: Vec<String>,
    pub rejected: Vec<FileValidationError>,
    pub pending: Vec<PendingPreview>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: Vec<String>,
    pub rejected: Vec<FileValidationError>,
}

type UploadObserver = Box<dyn FnMut(&[UploadedFile]) + Send>;
type RemoveObserver = Box<dyn FnMut(&str) + Send>;

pub struct AttachmentManager {
    files: Vec<UploadedFile>,
    options: AttachmentOptions,
    ids: Arc<dyn IdGenerator>,
    registry: Arc<PreviewRegistry>,
    on_upload: Option<UploadObserver>,
    on_remove: Option<RemoveObserver>,
}

impl AttachmentManager {
    pub fn new(options: AttachmentOptions) -> Self {
        Self {
            files: Vec::new(),
            options,
            ids: Arc::new(UuidIds),
            registry: PreviewRegistry::new(),
            on_upload: None,
            on_remove: None,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_registry(mut self, registry: Arc<PreviewRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Called with the full staged set after every admitted batch.
    pub fn on_upload(mut self, observer: impl FnMut(&[UploadedFile]) + Send + 'static) -> Self {
        self.on_upload = Some(Box::new(observer));
        self
    }

    /// Called with the id of every file removed individually or by [`remove_all`](Self::remove_all).
    pub fn on_remove(mut self, observer: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_remove = Some(Box::new(observer));
        self
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn get(&self, id: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<PreviewRegistry> {
        &self.registry
    }

    /// Stage a batch and decode previews for its images.
    ///
    /// The batch is visible (and `on_upload` fires) before any preview is
    /// ready; previews are attached as their decodes finish. A failed decode
    /// leaves the file staged without a preview.
    pub async fn add(
        &mut self,
        files: Vec<FileBlob>,
        decoder: &dyn PreviewDecoder,
    ) -> Result<AddOutcome, AttachmentError> {
        let batch = self.stage(files)?;

        let decoded = join_all(batch.pending.iter().map(|pending| async move {
            (pending.file_id.as_str(), decoder.decode(&pending.blob).await)
        }))
        .await;
        for (file_id, result) in decoded {
            self.attach_preview(file_id, result);
        }

        Ok(AddOutcome {
            added: batch.added,
            rejected: batch.rejected,
        })
    }

    /// Stage a batch without decoding anything.
    ///
    /// Files failing the size or type policy are skipped and reported. If the
    /// remaining files would exceed `max_files`, nothing is staged.
    pub fn stage(&mut self, files: Vec<FileBlob>) -> Result<StagedBatch, AttachmentError> {
        let mut accepted = Vec::with_capacity(files.len());
        let mut rejected = Vec::new();
        for file in files {
            match self.validate(&file) {
                Ok(()) => accepted.push(file),
                Err(e) => {
                    tracing::warn!(file = %e.name, reason = %e.reason, "attachment rejected");
                    rejected.push(e);
                }
            }
        }

        if let Some(max) = self.options.max_files {
            let attempted = self.files.len() + accepted.len();
            if attempted > max {
                tracing::warn!(max, attempted, "Maximum {} files allowed", max);
                return Err(AttachmentError::TooManyFiles { max, attempted });
            }
        }

        let mut batch = StagedBatch {
            rejected,
            ..Default::default()
        };
        for file in accepted {
            let id = self.ids.next_id();
            if file.is_image() {
                batch.pending.push(PendingPreview {
                    file_id: id.clone(),
                    blob: file.clone(),
                });
            }
            batch.added.push(id.clone());
            self.files.push(UploadedFile {
                id,
                file,
                preview: None,
            });
        }

        if !batch.added.is_empty() {
            tracing::debug!(added = batch.added.len(), staged = self.files.len(), "attachments staged");
            if let Some(observer) = self.on_upload.as_mut() {
                observer(&self.files);
            }
        }
        Ok(batch)
    }

    /// Hand a finished decode to the file it belongs to.
    ///
    /// Returns whether a preview was attached. A preview for a file that has
    /// already left the staged set is released immediately.
    pub fn attach_preview(&mut self, file_id: &str, result: Result<String, PreviewError>) -> bool {
        let url = match result {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(file_id, "Failed to create image preview: {}", e);
                return false;
            }
        };

        let handle = self.registry.register(url);
        match self.files.iter_mut().find(|f| f.id == file_id) {
            Some(entry) => {
                entry.release_preview();
                entry.preview = Some(handle);
                true
            }
            None => {
                tracing::debug!(file_id, "preview arrived after its file was removed");
                handle.release();
                false
            }
        }
    }

    /// Remove one file. No-op when `id` is not staged.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.files.iter().position(|f| f.id == id) else {
            return false;
        };

        self.files[pos].release_preview();
        self.files.remove(pos);
        if let Some(observer) = self.on_remove.as_mut() {
            observer(id);
        }
        true
    }

    /// Drop every staged file without notifying `on_remove`.
    pub fn clear(&mut self) {
        for file in &mut self.files {
            file.release_preview();
        }
        self.files.clear();
    }

    /// Drop every staged file, notifying `on_remove` once per file.
    pub fn remove_all(&mut self) {
        for file in &mut self.files {
            file.release_preview();
        }
        for file in std::mem::take(&mut self.files) {
            if let Some(observer) = self.on_remove.as_mut() {
                observer(&file.id);
            }
        }
    }

    /// The staged blobs for an outgoing message; the staged set is cleared.
    pub fn take_files(&mut self) -> Vec<FileBlob> {
        let blobs = self.files.iter().map(|f| f.file.clone()).collect();
        self.clear();
        blobs
    }

    fn validate(&self, file: &FileBlob) -> Result<(), FileValidationError> {
        if let Some(max_mb) = self.options.max_file_size_mb {
            if !validate_file_size(file, max_mb) {
                return Err(FileValidationError {
                    name: file.name.clone(),
                    reason: format!(
                        "{} exceeds the {} MB limit",
                        format_file_size(file.size(), 2),
                        max_mb
                    ),
                });
            }
        }
        if !self.options.allowed_types.is_empty()
            && !validate_file_type(file, &self.options.allowed_types)
        {
            return Err(FileValidationError {
                name: file.name.clone(),
                reason: format!("type {} is not allowed", file.media_type),
            });
        }
        Ok(())
    }
}
