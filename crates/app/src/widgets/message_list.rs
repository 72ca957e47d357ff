//! Conversation history: one bubble per message, newest at the bottom.

use crate::utils::relative_time;
use egui::{Align, Color32, Layout, RichText, Ui};
use shared::chat_api::{ChatMessage, Role};
use std::time::{Duration, Instant};

const COPIED_FOR: Duration = Duration::from_secs(2);

/// Which message was copied last, for the short "Copied" confirmation.
#[derive(Default)]
pub struct MessageListState {
    copied: Option<(String, Instant)>,
}

impl MessageListState {
    pub fn mark_copied(&mut self, message_id: &str, at: Instant) {
        self.copied = Some((message_id.to_string(), at));
    }

    pub fn is_copied(&self, message_id: &str, now: Instant) -> bool {
        matches!(&self.copied, Some((id, at)) if id == message_id && now.duration_since(*at) < COPIED_FOR)
    }
}

fn copy_to_clipboard(ctx: &egui::Context, text: &str) {
    let copied = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text));
    if let Err(e) = copied {
        tracing::debug!("system clipboard unavailable, using egui's: {}", e);
        ctx.copy_text(text.to_string());
    }
}

pub fn show(ui: &mut Ui, messages: &[ChatMessage], state: &mut MessageListState) {
    let now = chrono::Utc::now();
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for message in messages {
                bubble(ui, message, &relative_time(message.timestamp, now), state);
                ui.add_space(6.0);
            }
        });
}

fn bubble(ui: &mut Ui, message: &ChatMessage, when: &str, state: &mut MessageListState) {
    let (layout, fill, text_color) = match message.role {
        Role::User => (
            Layout::right_to_left(Align::TOP),
            ui.visuals().selection.bg_fill,
            Color32::WHITE,
        ),
        Role::Assistant => (
            Layout::left_to_right(Align::TOP),
            ui.visuals().faint_bg_color,
            ui.visuals().text_color(),
        ),
    };
    let max_width = ui.available_width() * 0.75;

    ui.with_layout(layout, |ui| {
        ui.set_max_width(ui.available_width());
        egui::Frame::none()
            .fill(fill)
            .rounding(8.0)
            .inner_margin(egui::Margin::same(8.0))
            .show(ui, |ui| {
                ui.set_max_width(max_width);
                ui.vertical(|ui| {
                    ui.add(egui::Label::new(RichText::new(&message.content).color(text_color)).wrap(true));
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(when).small().color(text_color.gamma_multiply(0.7)));
                        if message.role == Role::Assistant {
                            copy_button(ui, message, state);
                        }
                    });
                });
            });
    });
}

fn copy_button(ui: &mut Ui, message: &ChatMessage, state: &mut MessageListState) {
    let now = Instant::now();
    if state.is_copied(&message.id, now) {
        ui.label(RichText::new("✔ Copied").small());
        ui.ctx().request_repaint_after(COPIED_FOR);
        return;
    }
    if ui
        .small_button("📋 Copy")
        .on_hover_text("Copy message")
        .clicked()
    {
        copy_to_clipboard(ui.ctx(), &message.content);
        state.mark_copied(&message.id, now);
    }
}
