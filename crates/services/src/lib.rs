//! Attachment staging and conversation state for the chat widget.

pub mod attachments;
pub mod conversation;
pub mod preview;
pub mod storage;

pub use attachments::{AttachmentError, AttachmentManager, AttachmentOptions, UploadedFile};
pub use conversation::{ConversationStore, OutgoingMessage, ReasoningState, SendError};
pub use preview::{
    decode_preview_url, ImagePreviewDecoder, PreviewDecoder, PreviewError, PreviewPixels,
    PreviewRegistry,
};
pub use storage::{ChatStorage, PersistedChat, StorageError};
