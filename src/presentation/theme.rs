use eframe::egui;

/// Colors shared by the views
pub struct Palette {
    pub bg: egui::Color32,
    pub card: egui::Color32,
    pub fg: egui::Color32,
    pub stroke: egui::Color32,
    pub button: egui::Color32,
    pub button_active: egui::Color32,
    pub turbo: egui::Color32,
    pub turbo_active: egui::Color32,
    pub success: egui::Color32,
    pub warning: egui::Color32,
    pub error: egui::Color32,
    pub muted: egui::Color32,
}

impl Palette {
    pub fn new(is_dark: bool) -> Self {
        let shared = Self {
            bg: egui::Color32::from_rgb(242, 242, 242),
            card: egui::Color32::WHITE,
            fg: egui::Color32::from_gray(20),
            stroke: egui::Color32::from_gray(190),
            button: egui::Color32::from_rgb(0x1F, 0x6A, 0xA5),
            button_active: egui::Color32::from_rgb(0x14, 0x48, 0x70),
            turbo: egui::Color32::from_rgb(0xD3, 0x2F, 0x2F),
            turbo_active: egui::Color32::from_rgb(0x8E, 0x00, 0x00),
            success: egui::Color32::from_rgb(0, 150, 60),
            warning: egui::Color32::from_rgb(230, 140, 0),
            error: egui::Color32::from_rgb(220, 40, 40),
            muted: egui::Color32::from_gray(110),
        };

        if is_dark {
            Self {
                bg: egui::Color32::from_rgb(26, 26, 26),
                card: egui::Color32::from_rgb(38, 38, 38),
                fg: egui::Color32::from_gray(230),
                stroke: egui::Color32::from_gray(70),
                success: egui::Color32::from_rgb(60, 200, 90),
                warning: egui::Color32::from_rgb(255, 170, 0),
                error: egui::Color32::from_rgb(255, 80, 80),
                muted: egui::Color32::from_gray(150),
                ..shared
            }
        } else {
            shared
        }
    }
}

pub fn configure_style(ctx: &egui::Context, is_dark: bool) {
    let palette = Palette::new(is_dark);
    let mut style = (*ctx.style()).clone();
    style.visuals = if is_dark {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    };

    style
        .text_styles
        .iter_mut()
        .for_each(|(text_style, font_id)| {
            font_id.size = match text_style {
                egui::TextStyle::Heading => 24.0,
                egui::TextStyle::Body => 14.0,
                egui::TextStyle::Button => 14.0,
                egui::TextStyle::Monospace => 13.0,
                _ => font_id.size,
            };
        });

    style.spacing.item_spacing = egui::vec2(10.0, 10.0);
    style.spacing.button_padding = egui::vec2(14.0, 8.0);

    let rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.noninteractive.rounding = rounding;
    style.visuals.widgets.noninteractive.bg_fill = palette.card;
    style.visuals.widgets.noninteractive.bg_stroke = egui::Stroke::new(1.0, palette.stroke);
    style.visuals.widgets.inactive.rounding = rounding;
    style.visuals.widgets.hovered.rounding = rounding;
    style.visuals.widgets.active.rounding = rounding;

    style.visuals.window_rounding = egui::Rounding::same(8.0);
    style.visuals.window_fill = palette.card;
    style.visuals.panel_fill = palette.bg;
    style.visuals.selection.bg_fill = palette.button;

    ctx.set_style(style);
}
