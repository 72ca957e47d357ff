use eframe::egui;
use providers::HttpChatClient;
use services::{
    AttachmentManager, AttachmentOptions, ChatStorage, ConversationStore, ImagePreviewDecoder,
};
use shared::settings::ChatSettings;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod controller;
mod utils;
mod widgets;

use controller::ChatController;
use widgets::attachment_chips::PreviewTextures;
use widgets::message_list::MessageListState;
use widgets::{attachment_chips, composer, message_list, ComposerAction, DragDropHandler};

const NOTICE_TTL: Duration = Duration::from_secs(6);

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = utils::load_settings_or_default();
    tracing::info!(api = %settings.api_base_url, "starting chat widget");

    let controller = build_controller(&settings)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 720.0])
            .with_min_inner_size([360.0, 480.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "Chat Widget",
        options,
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            Box::new(ChatApp::new(
                controller.with_waker(move || ctx.request_repaint()),
            ))
        }),
    )
    .map_err(|e| anyhow::anyhow!("UI failed: {}", e))
}

fn build_controller(settings: &ChatSettings) -> anyhow::Result<ChatController> {
    let store = match ChatStorage::default_location() {
        Ok(storage) => {
            tracing::info!(path = %storage.path().display(), "chat history location");
            ConversationStore::open(storage, settings.user_id.clone())
        }
        Err(e) => {
            tracing::warn!("{}; history will not be kept", e);
            ConversationStore::new(settings.user_id.clone())
        }
    };

    let attachments = AttachmentManager::new(AttachmentOptions::from_settings(settings))
        .on_upload(|files| tracing::info!(count = files.len(), "files attached"))
        .on_remove(|id| tracing::debug!(file_id = id, "attachment removed"));

    ChatController::new(
        store,
        attachments,
        Arc::new(HttpChatClient::from_settings(settings)),
        Arc::new(ImagePreviewDecoder::new(settings.preview_max_dimension)),
        settings.request_timeout(),
    )
}

struct ChatApp {
    controller: ChatController,
    drag_drop: DragDropHandler,
    previews: PreviewTextures,
    history: MessageListState,
    confirm_clear: bool,
    notices: Vec<(String, Instant)>,
}

impl ChatApp {
    fn new(controller: ChatController) -> Self {
        Self {
            controller,
            drag_drop: DragDropHandler::new("chat_drop"),
            previews: PreviewTextures::default(),
            history: MessageListState::default(),
            confirm_clear: false,
            notices: Vec::new(),
        }
    }

    fn pick_files(&mut self) {
        if let Some(paths) = rfd::FileDialog::new()
            .set_title("Attach files")
            .pick_files()
        {
            self.controller.attach_paths(paths);
        }
    }

    fn handle(&mut self, action: ComposerAction) {
        match action {
            ComposerAction::Send => {
                if let Err(e) = self.controller.send() {
                    tracing::debug!("send ignored: {}", e);
                }
            }
            ComposerAction::Attach => self.pick_files(),
            ComposerAction::Stop => self.controller.stop_reasoning(),
        }
    }

    fn header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("💬 Chat");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let has_messages = !self.controller.store().messages().is_empty();
                    if ui
                        .add_enabled(has_messages, egui::Button::new("🗑 Clear chat"))
                        .clicked()
                    {
                        self.confirm_clear = true;
                    }
                });
            });
        });
    }

    fn composer(&mut self, ctx: &egui::Context) {
        let reasoning = self.controller.is_reasoning();
        let mut draft = self.controller.store().draft_text().to_string();
        let mut actions = Vec::new();
        let mut removed = None;
        self.previews
            .retain_staged(self.controller.attachments().files());

        egui::TopBottomPanel::bottom("composer").show(ctx, |ui| {
            ui.add_space(4.0);
            for (notice, _) in &self.notices {
                ui.colored_label(ui.visuals().warn_fg_color, notice.as_str());
            }
            if reasoning {
                actions.extend(composer::reasoning_banner(ui));
            }
            let files = self.controller.attachments().files();
            if !files.is_empty() {
                removed = attachment_chips::show(ui, files, &mut self.previews, !reasoning);
            }
            actions.extend(composer::input_row(ui, &mut draft, reasoning));
            ui.add_space(4.0);
        });

        if draft != self.controller.store().draft_text() {
            self.controller.set_draft_text(draft);
        }
        if let Some(id) = removed {
            self.controller.remove_attachment(&id);
        }
        for action in actions {
            self.handle(action);
        }
    }

    fn confirm_clear_dialog(&mut self, ctx: &egui::Context) {
        if !self.confirm_clear {
            return;
        }
        egui::Window::new("Clear chat")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Delete the whole conversation and start a new session?");
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Clear").clicked() {
                        self.controller.clear_chat();
                        self.confirm_clear = false;
                    }
                    if ui.button("Cancel").clicked() {
                        self.confirm_clear = false;
                    }
                });
            });
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.poll();

        self.drag_drop.update(ctx);
        if self.drag_drop.has_dropped_files() {
            let dropped = self.drag_drop.take_dropped();
            self.controller.attach_paths(dropped.paths);
            if !dropped.blobs.is_empty() {
                self.controller.attach(dropped.blobs);
            }
        }

        let now = Instant::now();
        self.notices
            .extend(self.controller.take_notices().into_iter().map(|n| (n, now)));
        self.notices.retain(|(_, at)| now.duration_since(*at) < NOTICE_TTL);

        self.header(ctx);
        self.composer(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            let messages = self.controller.store().messages();
            if messages.is_empty() {
                ui.centered_and_justified(|ui| {
                    ui.label("Ask a question, or attach files to ask about them.");
                });
            } else {
                message_list::show(ui, messages, &mut self.history);
            }
        });

        self.confirm_clear_dialog(ctx);
        self.drag_drop.show_drag_overlay(ctx);

        if self.controller.is_reasoning() || !self.notices.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }
}
