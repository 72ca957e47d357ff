//! Chips for the files staged in the composer.

use egui::{Context, TextureHandle, Ui};
use services::{decode_preview_url, UploadedFile};
use shared::files::{format_file_size, truncate_file_name, FileKind};
use std::collections::HashMap;

const CHIP_NAME_LEN: usize = 20;
const THUMBNAIL_SIZE: f32 = 32.0;

/// Chip text: shortened name and size.
pub fn chip_label(file: &UploadedFile) -> String {
    format!(
        "{}  {}",
        truncate_file_name(&file.file.name, CHIP_NAME_LEN),
        format_file_size(file.file.size(), 1),
    )
}

/// GPU textures for staged previews, keyed by file id.
///
/// An entry lives only as long as its file is staged with the same preview.
/// A preview that fails to decode is remembered as `None` so it is not retried
/// every frame.
#[derive(Default)]
pub struct PreviewTextures {
    textures: HashMap<String, (u64, Option<TextureHandle>)>,
}

impl PreviewTextures {
    /// Drop textures whose file left the staged set or whose preview changed.
    pub fn retain_staged(&mut self, files: &[UploadedFile]) {
        self.textures.retain(|id, (preview_id, _)| {
            files
                .iter()
                .any(|f| &f.id == id && f.preview_id() == Some(*preview_id))
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn texture(&mut self, ctx: &Context, file: &UploadedFile) -> Option<TextureHandle> {
        let preview_id = file.preview_id()?;
        if let Some((cached_id, texture)) = self.textures.get(&file.id) {
            if *cached_id == preview_id {
                return texture.clone();
            }
        }

        let texture = file.preview_url().and_then(|url| match decode_preview_url(url) {
            Ok(pixels) => {
                let size = [pixels.width as usize, pixels.height as usize];
                let image = egui::ColorImage::from_rgba_unmultiplied(size, &pixels.rgba);
                Some(ctx.load_texture(
                    format!("preview-{}", file.id),
                    image,
                    egui::TextureOptions::LINEAR,
                ))
            }
            Err(e) => {
                tracing::warn!(file_id = %file.id, "cannot show preview: {}", e);
                None
            }
        });
        self.textures
            .insert(file.id.clone(), (preview_id, texture.clone()));
        texture
    }
}

/// Draw one chip per file: the preview thumbnail when there is one, the type
/// icon otherwise. Returns the id whose remove button was clicked.
pub fn show(
    ui: &mut Ui,
    files: &[UploadedFile],
    textures: &mut PreviewTextures,
    enabled: bool,
) -> Option<String> {
    let mut removed = None;

    egui::ScrollArea::horizontal()
        .id_source("attachment_chips")
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                for file in files {
                    let thumbnail = textures.texture(ui.ctx(), file);
                    egui::Frame::none()
                        .fill(ui.visuals().faint_bg_color)
                        .rounding(6.0)
                        .inner_margin(egui::Margin::symmetric(6.0, 3.0))
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                match &thumbnail {
                                    Some(texture) => {
                                        ui.add(
                                            egui::Image::new(texture)
                                                .max_size(egui::vec2(THUMBNAIL_SIZE, THUMBNAIL_SIZE))
                                                .rounding(4.0),
                                        );
                                    }
                                    None => {
                                        ui.label(FileKind::from_name(&file.file.name).icon());
                                    }
                                }
                                ui.label(chip_label(file)).on_hover_text(file.file.name.as_str());
                                let remove = ui.add_enabled(enabled, egui::Button::new("✕").small());
                                if remove.on_hover_text("Remove").clicked() {
                                    removed = Some(file.id.clone());
                                }
                            });
                        });
                }
            });
        });

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::{AttachmentManager, AttachmentOptions};
    use shared::files::FileBlob;

    // 1x1 PNG
    const DOT_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    #[test]
    fn test_chip_label() {
        let mut manager = AttachmentManager::new(AttachmentOptions::default());
        manager
            .stage(vec![FileBlob::new(
                "quarterly-report-final.pdf",
                "application/pdf",
                vec![0u8; 1536],
            )])
            .unwrap();

        assert_eq!(chip_label(&manager.files()[0]), "quarterly-repo...pdf  1.5 KB");
    }

    #[test]
    fn test_textures_follow_staged_previews() {
        let ctx = Context::default();
        let mut manager = AttachmentManager::new(AttachmentOptions::default());
        let batch = manager
            .stage(vec![
                FileBlob::new("dot.png", "image/png", vec![0u8; 8]),
                FileBlob::new("notes.txt", "text/plain", b"hi".to_vec()),
            ])
            .unwrap();
        let image_id = batch.pending[0].file_id.clone();
        assert!(manager.attach_preview(&image_id, Ok(DOT_URL.to_string())));

        let mut textures = PreviewTextures::default();
        let thumbnail = textures.texture(&ctx, &manager.files()[0]).unwrap();
        assert_eq!(thumbnail.size(), [1, 1]);
        assert!(textures.texture(&ctx, &manager.files()[1]).is_none());
        assert_eq!(textures.len(), 1);

        textures.retain_staged(manager.files());
        assert_eq!(textures.len(), 1);

        manager.remove(&image_id);
        textures.retain_staged(manager.files());
        assert_eq!(textures.len(), 0);
    }

    #[test]
    fn test_undecodable_preview_falls_back_to_icon() {
        let ctx = Context::default();
        let mut manager = AttachmentManager::new(AttachmentOptions::default());
        let batch = manager
            .stage(vec![FileBlob::new("dot.png", "image/png", vec![0u8; 8])])
            .unwrap();
        manager.attach_preview(&batch.pending[0].file_id, Ok("data:image/png;base64,AAAA".into()));

        let mut textures = PreviewTextures::default();
        assert!(textures.texture(&ctx, &manager.files()[0]).is_none());
        assert!(textures.texture(&ctx, &manager.files()[0]).is_none());
        assert_eq!(textures.len(), 1);
    }
}
