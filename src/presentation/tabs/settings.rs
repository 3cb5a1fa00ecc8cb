use crate::domain::models::{MessageSeverity, StatusMessage};
use crate::presentation::app::HubRemoteApp;
use crate::presentation::components::Components;
use eframe::egui;

pub fn render(app: &mut HubRemoteApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Settings");
    ui.add_space(20.0);

    let mut save_result = None;

    if let Ok(mut settings) = app.settings.lock() {
        let settings_mut = settings.get_mut();

        Components::card(ui, "Scanning", |ui| {
            ui.horizontal(|ui| {
                ui.label("Scan Duration (s):");
                ui.add(egui::Slider::new(&mut settings_mut.scan_timeout_secs, 1..=30));
            });
            ui.checkbox(
                &mut settings_mut.pybricks_only,
                "Only list hubs advertising the Pybricks service",
            );
            ui.checkbox(
                &mut settings_mut.show_unnamed_devices,
                "Show devices without a name",
            );
        });

        ui.add_space(10.0);

        Components::card(ui, "Hub Program", |ui| {
            ui.label(
                egui::RichText::new(
                    "Leave empty to run the bundled gateway program.",
                )
                .italics()
                .size(12.0),
            );

            let mut path = settings_mut.program_path.clone().unwrap_or_default();
            ui.horizontal(|ui| {
                ui.label("Compiled Program:");
                if ui.text_edit_singleline(&mut path).changed() {
                    settings_mut.program_path = program_path_setting(path);
                }
            });

            ui.horizontal(|ui| {
                ui.label("Start Timeout (ms):");
                ui.add(
                    egui::Slider::new(&mut settings_mut.program_start_timeout_ms, 500..=20000)
                        .step_by(500.0),
                );
            });
        });

        ui.add_space(10.0);

        Components::card(ui, "Connection", |ui| {
            ui.checkbox(
                &mut settings_mut.auto_reconnect,
                "Reconnect automatically when the link drops",
            );

            if let Some(name) = settings_mut.last_connected_hub.as_ref().map(|h| h.name.clone()) {
                ui.horizontal(|ui| {
                    ui.label(format!("Last hub: {}", name));
                    if ui.button("Forget").clicked() {
                        settings_mut.last_connected_hub = None;
                    }
                });
            }

            ui.horizontal(|ui| {
                ui.label("Console Lines:");
                ui.add(egui::Slider::new(&mut settings_mut.console_capacity, 50..=5000));
            });
        });

        ui.add_space(10.0);

        Components::card(ui, "Logging", |ui| {
            ui.horizontal(|ui| {
                ui.label("Verbosity Level:");
                egui::ComboBox::from_id_salt("log_level")
                    .selected_text(&settings_mut.log_settings.level)
                    .show_ui(ui, |ui| {
                        for level in &["trace", "debug", "info", "warn", "error"] {
                            ui.selectable_value(
                                &mut settings_mut.log_settings.level,
                                level.to_string(),
                                *level,
                            );
                        }
                    });
            });

            ui.checkbox(
                &mut settings_mut.log_settings.console_logging_enabled,
                "Console Logs",
            );
            ui.checkbox(
                &mut settings_mut.log_settings.file_logging_enabled,
                "File Logs",
            );

            if settings_mut.log_settings.file_logging_enabled {
                ui.indent("file_logs", |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Log Directory:");
                        ui.text_edit_singleline(&mut settings_mut.log_settings.log_dir);
                    });
                    ui.horizontal(|ui| {
                        ui.label("Rotation:");
                        egui::ComboBox::from_id_salt("log_rot")
                            .selected_text(&settings_mut.log_settings.rotation)
                            .show_ui(ui, |ui| {
                                for rot in &["daily", "hourly", "minutely", "never"] {
                                    ui.selectable_value(
                                        &mut settings_mut.log_settings.rotation,
                                        rot.to_string(),
                                        *rot,
                                    );
                                }
                            });
                    });
                });
            }
            ui.label(
                egui::RichText::new("Restart required for log and console changes.")
                    .italics()
                    .size(12.0),
            );
        });

        ui.add_space(10.0);

        if ui.button("Save Settings").clicked() {
            save_result = Some(settings.save());
        }
    }

    match save_result {
        Some(Ok(())) => app.console.push(StatusMessage::new(
            "Settings saved.",
            MessageSeverity::Success,
        )),
        Some(Err(e)) => app.console.push(StatusMessage::new(
            format!("Could not save settings: {:#}", e),
            MessageSeverity::Error,
        )),
        None => {}
    }
}

/// Keep the text as typed; it is trimmed when the program is loaded
fn program_path_setting(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
