use crate::domain::command::DriveCommand;
use crate::domain::controls::{ControlButton, ControlPad};
use crate::domain::models::{ConnectionStatus, MessageSeverity};
use crate::presentation::app::HubRemoteApp;
use crate::presentation::components::Components;
use crate::presentation::theme::Palette;
use eframe::egui;

const BUTTON_SIZE: egui::Vec2 = egui::vec2(150.0, 56.0);

pub fn render(app: &mut HubRemoteApp, ui: &mut egui::Ui) {
    Components::heading(ui, "LEGO Hub Remote");
    ui.add_space(20.0);

    ui_connection_panel(app, ui);
    ui.add_space(15.0);

    ui_control_panel(app, ui);
    ui.add_space(15.0);

    ui_console_panel(app, ui);
}

fn ui_connection_panel(app: &mut HubRemoteApp, ui: &mut egui::Ui) {
    Components::card(ui, "Connection", |ui| {
        let (status_text, bg_color, text_color) = match app.connection_status {
            ConnectionStatus::Connected => (
                "CONNECTED",
                egui::Color32::from_rgb(0, 200, 0),
                egui::Color32::BLACK,
            ),
            ConnectionStatus::Connecting => (
                "CONNECTING...",
                egui::Color32::from_rgb(255, 200, 0),
                egui::Color32::BLACK,
            ),
            ConnectionStatus::Disconnected => (
                "DISCONNECTED",
                egui::Color32::from_gray(100),
                egui::Color32::WHITE,
            ),
            ConnectionStatus::Error => (
                "ERROR",
                egui::Color32::from_rgb(255, 50, 50),
                egui::Color32::WHITE,
            ),
        };

        Components::status_banner(ui, status_text, bg_color, text_color);

        if let Some(info) = &app.hub_info {
            ui.label(format!("Hub: {}", info.name));
        }

        ui.add_space(6.0);

        ui.horizontal(|ui| {
            let busy = app.connection_status == ConnectionStatus::Connecting;

            if ui
                .add_enabled(!busy, egui::Button::new("SCAN & CONNECT"))
                .clicked()
            {
                app.open_device_picker();
            }

            if ui
                .add_enabled(app.is_connected(), egui::Button::new("DISCONNECT"))
                .clicked()
            {
                app.disconnect();
            }

            if busy {
                ui.spinner();
            }
        });

        if !app.is_connected() && app.connection_status != ConnectionStatus::Connecting {
            if let Some(hub) = app.last_connected_hub() {
                ui.horizontal(|ui| {
                    ui.label(format!("Last hub: {}", hub.name));
                    if ui.button("Reconnect").clicked() {
                        app.connect_to(hub);
                    }
                });
            }
        }
    });
}

fn ui_control_panel(app: &mut HubRemoteApp, ui: &mut egui::Ui) {
    let palette = Palette::new(app.is_dark_mode);
    let connected = app.is_connected();

    Components::card(ui, "Drive", |ui| {
        egui::Grid::new("drive_grid")
            .spacing([10.0, 10.0])
            .show(ui, |ui| {
                momentary(app, ui, ControlButton::Turbo, &palette, connected);
                momentary(app, ui, ControlButton::Forward, &palette, connected);
                ui.label("");
                ui.end_row();

                momentary(app, ui, ControlButton::SteerLeft, &palette, connected);
                let center = Components::control_button(
                    ui,
                    ControlButton::Center.label(),
                    button_fill(&app.control_pad, ControlButton::Center, &palette, connected),
                    BUTTON_SIZE,
                    connected,
                );
                if center.clicked() {
                    app.dispatch(vec![DriveCommand::Center]);
                }
                momentary(app, ui, ControlButton::SteerRight, &palette, connected);
                ui.end_row();

                ui.label("");
                momentary(app, ui, ControlButton::Backward, &palette, connected);
                ui.label("");
                ui.end_row();
            });

        ui.add_space(6.0);
        ui.label(
            egui::RichText::new(
                "Keys: ↑ forward · ↓ reverse · ← → steer · Enter turbo · Space brake",
            )
            .italics()
            .color(palette.muted),
        );
    });
}

/// Button that drives while the pointer is held down on it
fn momentary(
    app: &mut HubRemoteApp,
    ui: &mut egui::Ui,
    button: ControlButton,
    palette: &Palette,
    connected: bool,
) {
    let fill = button_fill(&app.control_pad, button, palette, connected);
    let response = Components::control_button(ui, button.label(), fill, BUTTON_SIZE, connected);
    let held = connected && response.is_pointer_button_down_on();
    let commands = app.control_pad.pointer(button, held);
    app.dispatch(commands);
}

/// Held buttons, by key or pointer, are drawn in their active color
fn button_fill(
    pad: &ControlPad,
    button: ControlButton,
    palette: &Palette,
    connected: bool,
) -> egui::Color32 {
    let active = connected && pad.is_active(button);
    match (button, active) {
        (ControlButton::Turbo, false) => palette.turbo,
        (ControlButton::Turbo, true) => palette.turbo_active,
        (_, false) => palette.button,
        (_, true) => palette.button_active,
    }
}

fn ui_console_panel(app: &mut HubRemoteApp, ui: &mut egui::Ui) {
    let palette = Palette::new(app.is_dark_mode);

    Components::card(ui, "Console", |ui| {
        egui::ScrollArea::vertical()
            .max_height(180.0)
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for (line, severity) in app.console.rendered() {
                    let color = match severity {
                        MessageSeverity::Info => palette.fg,
                        MessageSeverity::Success => palette.success,
                        MessageSeverity::Warning => palette.warning,
                        MessageSeverity::Error => palette.error,
                    };
                    ui.label(egui::RichText::new(line).monospace().color(color));
                }
            });

        ui.horizontal(|ui| {
            if ui.button("Clear").clicked() {
                app.console.clear();
            }
            ui.label(
                egui::RichText::new(format!("{} lines", app.console.len()))
                    .size(12.0)
                    .color(palette.muted),
            );
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::controls::ControlKey;

    #[test]
    fn test_brake_key_lights_center() {
        let palette = Palette::new(true);
        let mut pad = ControlPad::new();
        assert_eq!(
            button_fill(&pad, ControlButton::Center, &palette, true),
            palette.button
        );

        pad.key_down(ControlKey::Brake);
        assert_eq!(
            button_fill(&pad, ControlButton::Center, &palette, true),
            palette.button_active
        );
        // Not highlighted while disconnected
        assert_eq!(
            button_fill(&pad, ControlButton::Center, &palette, false),
            palette.button
        );
    }

    #[test]
    fn test_turbo_uses_its_own_colors() {
        let palette = Palette::new(false);
        let mut pad = ControlPad::new();
        assert_eq!(
            button_fill(&pad, ControlButton::Turbo, &palette, true),
            palette.turbo
        );
        pad.key_down(ControlKey::Turbo);
        assert_eq!(
            button_fill(&pad, ControlButton::Turbo, &palette, true),
            palette.turbo_active
        );
    }
}
