//! Modal list of hubs found by the scanner

use crate::domain::models::KnownHub;
use crate::presentation::app::HubRemoteApp;
use crate::presentation::theme::Palette;
use eframe::egui;

pub fn show(app: &mut HubRemoteApp, ctx: &egui::Context) {
    if !app.show_device_picker {
        return;
    }

    let palette = Palette::new(app.is_dark_mode);
    let mut open = true;
    let mut selected = None;

    egui::Window::new("Select Hub")
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .default_width(320.0)
        .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                if app.is_scanning {
                    ui.spinner();
                    ui.label("Scanning BLE devices...");
                } else if app.scanned_devices.is_empty() {
                    ui.label("No hubs found.");
                } else {
                    ui.label("Select your device:");
                }
            });

            ui.separator();

            egui::ScrollArea::vertical()
                .id_salt("scan_results")
                .max_height(260.0)
                .show(ui, |ui| {
                    for device in &app.scanned_devices {
                        let response = ui.add_sized(
                            [ui.available_width(), 44.0],
                            egui::Button::new(device.label()),
                        );
                        if response.clicked() {
                            selected = Some(KnownHub::from(device));
                        }

                        let mut details = Vec::new();
                        if let Some(rssi) = device.rssi {
                            details.push(format!("{} dBm", rssi));
                        }
                        if device.is_pybricks {
                            details.push("Pybricks".to_string());
                        }
                        if !details.is_empty() {
                            ui.label(
                                egui::RichText::new(details.join(" · "))
                                    .size(11.0)
                                    .color(palette.muted),
                            );
                        }
                    }
                });

            ui.separator();

            ui.horizontal(|ui| {
                if app.is_scanning {
                    if ui.button("Stop").clicked() {
                        app.stop_scan();
                    }
                } else if ui.button("Scan again").clicked() {
                    app.start_scan();
                }
            });
        });

    if let Some(hub) = selected {
        app.stop_scan();
        app.show_device_picker = false;
        app.connect_to(hub);
    } else if !open {
        app.stop_scan();
        app.show_device_picker = false;
    }
}
