//! Draft line, attach and send buttons, and the reasoning banner.

use egui::{Key, RichText, Ui};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerAction {
    Send,
    Attach,
    Stop,
}

pub fn can_send(draft: &str, reasoning: bool) -> bool {
    !reasoning && !draft.trim().is_empty()
}

/// Banner shown while an answer is pending.
pub fn reasoning_banner(ui: &mut Ui) -> Option<ComposerAction> {
    let mut action = None;
    ui.horizontal(|ui| {
        ui.spinner();
        ui.label(RichText::new("Reasoning...").italics());
        if ui.button("⏹ Stop").clicked() {
            action = Some(ComposerAction::Stop);
        }
    });
    action
}

pub fn input_row(ui: &mut Ui, draft: &mut String, reasoning: bool) -> Option<ComposerAction> {
    let mut action = None;

    ui.horizontal(|ui| {
        if ui
            .add_enabled(!reasoning, egui::Button::new("📎"))
            .on_hover_text("Attach files")
            .clicked()
        {
            action = Some(ComposerAction::Attach);
        }

        let send_width = 70.0;
        let response = ui.add(
            egui::TextEdit::singleline(draft)
                .hint_text("Ask a question about your documents...")
                .desired_width(ui.available_width() - send_width)
                .interactive(!reasoning),
        );

        let enter = response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
        let clicked = ui
            .add_enabled(can_send(draft, reasoning), egui::Button::new("⬆ Send"))
            .clicked();

        if (enter || clicked) && can_send(draft, reasoning) {
            action = Some(ComposerAction::Send);
            response.request_focus();
        }
    });

    action
}
