//! Widgets for the chat window.

pub mod attachment_chips;
pub mod composer;
pub mod drag_drop;
pub mod message_list;

pub use composer::ComposerAction;
pub use drag_drop::DragDropHandler;
