mod domain;
mod infrastructure;
mod presentation;

use eframe::egui;

fn main() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 860.0])
            .with_min_inner_size([560.0, 600.0])
            .with_title("LEGO Hub Remote"),
        ..Default::default()
    };

    eframe::run_native(
        "LEGO Hub Remote",
        options,
        Box::new(|cc| Ok(Box::new(presentation::app::HubRemoteApp::new(cc)))),
    )
}
