//! Drag and drop handler for attaching files.
//!
//! Uses egui's dropped_files functionality to handle file drops.

use egui::{Context, DroppedFile, Id, Rect, Vec2};
use shared::files::{media_type_for_path, FileBlob};
use std::path::{Path, PathBuf};

/// Files dropped onto the window since the last take.
#[derive(Debug, Default)]
pub struct DroppedFiles {
    /// Native drops, read from disk by the caller
    pub paths: Vec<PathBuf>,
    /// Drops that arrived with their bytes and no path
    pub blobs: Vec<FileBlob>,
}

impl DroppedFiles {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.blobs.is_empty()
    }
}

/// Handler for drag and drop file operations.
pub struct DragDropHandler {
    dropped: DroppedFiles,
    /// Whether files are currently being dragged over
    hovering: bool,
    id: Id,
}

impl DragDropHandler {
    pub fn new(id: impl std::hash::Hash) -> Self {
        Self {
            dropped: DroppedFiles::default(),
            hovering: false,
            id: Id::new(id),
        }
    }

    /// Capture hover state and dropped files. Call once per frame.
    pub fn update(&mut self, ctx: &Context) {
        ctx.input(|i| {
            self.hovering = !i.raw.hovered_files.is_empty();
            for file in &i.raw.dropped_files {
                self.push(file);
            }
        });
    }

    fn push(&mut self, file: &DroppedFile) {
        if let Some(path) = &file.path {
            self.dropped.paths.push(path.clone());
        } else if let Some(bytes) = &file.bytes {
            self.dropped.blobs.push(blob_from_dropped(&file.name, bytes));
        } else {
            tracing::debug!(name = %file.name, "dropped file has neither path nor bytes");
        }
    }

    pub fn take_dropped(&mut self) -> DroppedFiles {
        std::mem::take(&mut self.dropped)
    }

    pub fn has_dropped_files(&self) -> bool {
        !self.dropped.is_empty()
    }

    pub fn is_hovering(&self) -> bool {
        self.hovering
    }

    /// Show an overlay while files are dragged over the window.
    pub fn show_drag_overlay(&self, ctx: &Context) {
        if !self.hovering {
            return;
        }

        egui::Area::new(self.id.with("overlay"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                let screen_rect = ctx.screen_rect();
                ui.painter().rect_filled(
                    screen_rect,
                    0.0,
                    egui::Color32::from_black_alpha(100),
                );

                let indicator_rect =
                    Rect::from_center_size(screen_rect.center(), Vec2::new(300.0, 150.0));
                ui.painter().rect(
                    indicator_rect,
                    8.0,
                    ui.visuals().extreme_bg_color,
                    egui::Stroke::new(3.0, ui.visuals().selection.bg_fill),
                );
                ui.painter().text(
                    indicator_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "📥 Drop files to attach",
                    egui::FontId::proportional(18.0),
                    ui.visuals().strong_text_color(),
                );
            });
    }
}

fn blob_from_dropped(name: &str, bytes: &[u8]) -> FileBlob {
    FileBlob::new(name, media_type_for_path(Path::new(name)), bytes.to_vec())
}
