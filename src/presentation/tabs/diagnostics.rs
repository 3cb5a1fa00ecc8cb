use crate::domain::gateway;
use crate::domain::models::{ConnectionStatus, HubStatus, MessageSeverity, StatusMessage};
use crate::presentation::app::HubRemoteApp;
use crate::presentation::components::Components;
use crate::presentation::theme::Palette;
use eframe::egui;
use std::path::PathBuf;

pub fn render(app: &mut HubRemoteApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Diagnostics");
    ui.add_space(20.0);

    let palette = Palette::new(app.is_dark_mode);

    Components::card(ui, "Bluetooth Engine Status", |ui| {
        ui.horizontal(|ui| {
            ui.label("State:");
            let (text, color) = match app.connection_status {
                ConnectionStatus::Connected => ("CONNECTED", palette.success),
                ConnectionStatus::Disconnected => ("IDLE", palette.muted),
                ConnectionStatus::Connecting => ("CONNECTING", palette.warning),
                ConnectionStatus::Error => ("ERROR", palette.error),
            };
            ui.label(egui::RichText::new(text).color(color).strong());
        });
        ui.label(format!(
            "Scanner: {}",
            if app.is_scanning { "running" } else { "idle" }
        ));
        ui.label(format!("Devices seen: {}", app.scanned_devices.len()));
    });

    ui.add_space(10.0);

    if let Some(info) = &app.hub_info {
        Components::card(ui, "Hub", |ui| {
            egui::Grid::new("hub_info_grid")
                .spacing([20.0, 5.0])
                .show(ui, |ui| {
                    ui.label("Name:");
                    ui.label(&info.name);
                    ui.end_row();
                    ui.label("Firmware:");
                    ui.label(info.firmware_revision.as_deref().unwrap_or("unknown"));
                    ui.end_row();
                    ui.label("Protocol:");
                    ui.label(info.protocol_revision.as_deref().unwrap_or("unknown"));
                    ui.end_row();
                    ui.label("Max write:");
                    ui.label(format!("{} bytes", info.max_write_size));
                    ui.end_row();
                    ui.label("Max program:");
                    ui.label(
                        info.max_program_size
                            .map(|size| format!("{} bytes", size))
                            .unwrap_or_else(|| "unknown".to_string()),
                    );
                    ui.end_row();
                });
        });

        ui.add_space(10.0);
    }

    Components::card(ui, "Status Flags", |ui| {
        ui.label(
            egui::RichText::new(format!("Raw: {:#06x}", app.hub_status.0))
                .monospace()
                .color(palette.muted),
        );
        egui::Grid::new("status_flags")
            .spacing([20.0, 5.0])
            .show(ui, |ui| {
                for (flag, name) in HubStatus::NAMES {
                    let set = app.hub_status.contains(flag);
                    ui.label(name);
                    ui.label(
                        egui::RichText::new(if set { "●" } else { "○" })
                            .color(if set { palette.success } else { palette.muted }),
                    );
                    ui.end_row();
                }
            });
    });

    ui.add_space(10.0);

    let mut export_result = None;
    Components::card(ui, "Gateway Program", |ui| {
        ui.label(
            egui::RichText::new(
                "The hub runs a small program that turns received letters into motor moves. \
                 Export it and load it with Pybricks Code.",
            )
            .size(12.0),
        );
        ui.horizontal(|ui| {
            ui.label("Export To:");
            ui.text_edit_singleline(&mut app.export_path);
        });
        if ui.button("Export Gateway Program").clicked() {
            export_result = Some(gateway::export_to(&PathBuf::from(app.export_path.trim())));
        }
        ui.collapsing("Source", |ui| {
            egui::ScrollArea::vertical()
                .max_height(240.0)
                .show(ui, |ui| {
                    ui.label(egui::RichText::new(gateway::GATEWAY_PROGRAM).monospace());
                });
        });
    });

    match export_result {
        Some(Ok(path)) => app.console.push(StatusMessage::new(
            format!("Gateway program written to {}", path.display()),
            MessageSeverity::Success,
        )),
        Some(Err(e)) => app.console.push(StatusMessage::new(
            format!("Export failed: {:#}", e),
            MessageSeverity::Error,
        )),
        None => {}
    }
}
