use crate::domain::command::DriveCommand;
use crate::domain::console::ConsoleLog;
use crate::domain::controls::{ControlKey, ControlPad};
use crate::domain::gateway;
use crate::domain::models::{
    AppEvent, BluetoothCommand, ConnectionStatus, HubInfo, HubStatus, KnownHub, MessageSeverity,
    ScannedDevice, StatusMessage, Tab,
};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth;
use eframe::egui;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

pub struct HubRemoteApp {
    // Services
    pub(crate) settings: Arc<Mutex<SettingsService>>,

    // Bluetooth
    pub(crate) bluetooth_tx: mpsc::UnboundedSender<BluetoothCommand>,
    pub(crate) event_rx: mpsc::UnboundedReceiver<AppEvent>,

    // State
    pub(crate) connection_status: ConnectionStatus,
    pub(crate) console: ConsoleLog,
    pub(crate) control_pad: ControlPad,
    pub(crate) hub_info: Option<HubInfo>,
    pub(crate) hub_status: HubStatus,

    // UI State
    pub(crate) selected_tab: Tab,
    pub(crate) show_device_picker: bool,
    pub(crate) export_path: String,

    // Scanning
    pub(crate) is_scanning: bool,
    pub(crate) scanned_devices: Vec<ScannedDevice>,

    // Reconnection
    pub(crate) pending_hub: Option<KnownHub>,
    pub(crate) user_disconnected: bool,
    pub(crate) reconnect_timer: Option<Instant>,

    // UI Options
    pub(crate) is_dark_mode: bool,

    // Logging guard
    pub(crate) _logging_guard: Option<crate::infrastructure::logging::LoggingGuard>,
}

impl HubRemoteApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let settings_service = SettingsService::new().unwrap_or_else(|e| {
            eprintln!("Settings directory unavailable ({}), using local file", e);
            SettingsService::with_path(PathBuf::from("settings.json"))
        });

        let logging_guard =
            crate::infrastructure::logging::init_logger(&settings_service.get().log_settings)
                .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
                .ok();

        info!("Starting LEGO Hub Remote");
        info!("Settings file: {}", settings_service.path().display());

        let is_dark_mode = settings_service.get().dark_mode;
        let console_capacity = settings_service.get().console_capacity;
        crate::presentation::theme::configure_style(&cc.egui_ctx, is_dark_mode);

        let settings = Arc::new(Mutex::new(settings_service));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let bluetooth_tx = bluetooth::spawn_worker(event_tx, settings.clone());

        let mut console = ConsoleLog::new(console_capacity);
        console.info("Ready. Press SCAN & CONNECT to find your hub.");

        Self {
            settings,
            bluetooth_tx,
            event_rx,
            connection_status: ConnectionStatus::Disconnected,
            console,
            control_pad: ControlPad::new(),
            hub_info: None,
            hub_status: HubStatus::default(),
            selected_tab: Tab::Drive,
            show_device_picker: false,
            export_path: gateway::default_export_path().display().to_string(),
            is_scanning: false,
            scanned_devices: Vec::new(),
            pending_hub: None,
            user_disconnected: false,
            reconnect_timer: None,
            is_dark_mode,
            _logging_guard: logging_guard,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    fn send_bluetooth(&self, command: BluetoothCommand) {
        if self.bluetooth_tx.send(command).is_err() {
            warn!("Bluetooth worker is not running");
        }
    }

    /// Forward drive commands to the hub; dropped while not connected
    pub(crate) fn dispatch(&mut self, commands: Vec<DriveCommand>) {
        if !self.is_connected() {
            return;
        }
        for command in commands {
            self.send_bluetooth(BluetoothCommand::Send(command));
        }
    }

    pub(crate) fn open_device_picker(&mut self) {
        self.show_device_picker = true;
        self.start_scan();
    }

    pub(crate) fn start_scan(&mut self) {
        self.is_scanning = true;
        self.scanned_devices.clear();
        self.send_bluetooth(BluetoothCommand::StartScan);
    }

    pub(crate) fn stop_scan(&mut self) {
        if self.is_scanning {
            self.send_bluetooth(BluetoothCommand::StopScan);
        }
    }

    pub(crate) fn connect_to(&mut self, hub: KnownHub) {
        self.console.info(format!("Selected device: {}", hub.name));
        self.connection_status = ConnectionStatus::Connecting;
        self.user_disconnected = false;
        self.reconnect_timer = None;
        self.send_bluetooth(BluetoothCommand::Connect(hub.id.clone()));
        self.pending_hub = Some(hub);
    }

    pub(crate) fn disconnect(&mut self) {
        self.user_disconnected = true;
        self.reconnect_timer = None;
        // The hub stops every motor when its program exits
        let _ = self.control_pad.release_all();
        self.send_bluetooth(BluetoothCommand::Disconnect);
    }

    pub(crate) fn last_connected_hub(&self) -> Option<KnownHub> {
        self.settings
            .lock()
            .ok()
            .and_then(|s| s.get().last_connected_hub.clone())
    }

    fn auto_reconnect_enabled(&self) -> bool {
        self.settings
            .lock()
            .map(|s| s.get().auto_reconnect)
            .unwrap_or(false)
    }

    fn process_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::ConnectionStatus(status) => self.on_connection_status(status),
                AppEvent::LogMessage(msg) => {
                    // Stop auto-reconnecting after errors so the user can react
                    if msg.severity == MessageSeverity::Error {
                        self.reconnect_timer = None;
                    }
                    self.console.push(msg);
                }
                AppEvent::DeviceFound(device) => {
                    if let Some(existing) =
                        self.scanned_devices.iter_mut().find(|d| d.id == device.id)
                    {
                        *existing = device;
                    } else {
                        self.scanned_devices.push(device);
                    }
                }
                AppEvent::ScanFinished => self.is_scanning = false,
                AppEvent::HubInfo(info) => self.hub_info = Some(info),
                AppEvent::HubStatus(status) => {
                    if status.battery_low() && !self.hub_status.battery_low() {
                        self.console.push(StatusMessage::new(
                            "Hub battery is low.",
                            MessageSeverity::Warning,
                        ));
                    }
                    self.hub_status = status;
                }
                AppEvent::HubOutput(line) => self.console.info(format!("Hub: {}", line)),
            }
        }
    }

    fn on_connection_status(&mut self, status: ConnectionStatus) {
        let previous = self.connection_status;
        self.connection_status = status;

        match status {
            ConnectionStatus::Connected => {
                self.reconnect_timer = None;
                if let Some(hub) = self.pending_hub.clone() {
                    if let Ok(mut settings) = self.settings.lock() {
                        if let Err(e) = settings.set_last_connected_hub(hub) {
                            warn!("Could not save last hub: {}", e);
                        }
                    }
                }
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                let _ = self.control_pad.release_all();
                self.hub_status = HubStatus::default();

                let lost = previous == ConnectionStatus::Connected && !self.user_disconnected;
                if lost && self.auto_reconnect_enabled() && self.pending_hub.is_some() {
                    self.reconnect_timer = Some(Instant::now() + RECONNECT_DELAY);
                    self.console.push(StatusMessage::new(
                        "Disconnected. Reconnecting in 2s...",
                        MessageSeverity::Warning,
                    ));
                }
            }
            ConnectionStatus::Connecting => {}
        }
    }

    fn check_reconnect(&mut self, ctx: &egui::Context) {
        let Some(time) = self.reconnect_timer else {
            return;
        };

        if Instant::now() >= time {
            self.reconnect_timer = None;
            if let Some(hub) = self.pending_hub.clone() {
                self.connect_to(hub);
            }
        } else {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        let commands = keyboard_commands(ctx, &mut self.control_pad);
        self.dispatch(commands);
    }
}

/// Translate this frame's arrow/Enter/Space key events into drive commands
///
/// Control keys are removed from the input queue so that widgets do not also
/// react to them. While a widget has keyboard focus, presses are left to the
/// widget but releases still reach the pad, so a held throttle always stops.
fn keyboard_commands(ctx: &egui::Context, pad: &mut ControlPad) -> Vec<DriveCommand> {
    let widget_focused = ctx.wants_keyboard_input();

    let (window_focused, key_events) = ctx.input_mut(|i| {
        let mut keys = Vec::new();
        i.events.retain(|event| {
            let egui::Event::Key {
                key,
                pressed,
                repeat,
                ..
            } = event
            else {
                return true;
            };
            let Some(control) = control_key(*key) else {
                return true;
            };

            if !*repeat && !(widget_focused && *pressed) {
                keys.push((control, *pressed));
            }
            widget_focused
        });
        (i.focused, keys)
    });

    if !window_focused {
        return pad.release_all();
    }

    key_events
        .into_iter()
        .flat_map(|(key, pressed)| {
            if pressed {
                pad.key_down(key)
            } else {
                pad.key_up(key)
            }
        })
        .collect()
}

fn control_key(key: egui::Key) -> Option<ControlKey> {
    match key {
        egui::Key::ArrowUp => Some(ControlKey::Up),
        egui::Key::ArrowDown => Some(ControlKey::Down),
        egui::Key::ArrowLeft => Some(ControlKey::Left),
        egui::Key::ArrowRight => Some(ControlKey::Right),
        egui::Key::Enter => Some(ControlKey::Turbo),
        egui::Key::Space => Some(ControlKey::Brake),
        _ => None,
    }
}

impl eframe::App for HubRemoteApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_reconnect(ctx);
        self.process_events();
        self.handle_keyboard(ctx);

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.selectable_value(&mut self.selected_tab, Tab::Drive, "Drive");
                ui.selectable_value(&mut self.selected_tab, Tab::Settings, "Settings");
                ui.selectable_value(&mut self.selected_tab, Tab::Diagnostics, "Diagnostics");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let switch_icon = if self.is_dark_mode {
                        "☀ Light"
                    } else {
                        "🌙 Dark"
                    };
                    if ui.button(switch_icon).clicked() {
                        self.is_dark_mode = !self.is_dark_mode;
                        crate::presentation::theme::configure_style(ctx, self.is_dark_mode);
                        if let Ok(mut settings) = self.settings.lock() {
                            settings.get_mut().dark_mode = self.is_dark_mode;
                            let _ = settings.save();
                        }
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.set_max_width(640.0);
                    ui.add_space(10.0);

                    use crate::presentation::tabs;
                    match self.selected_tab {
                        Tab::Drive => tabs::drive::render(self, ui),
                        Tab::Settings => tabs::settings::render(self, ui),
                        Tab::Diagnostics => tabs::diagnostics::render(self, ui),
                    }

                    ui.add_space(20.0);
                });
            });
        });

        crate::presentation::device_picker::show(self, ctx);

        // Worker events arrive without input, so keep polling
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::controls::ControlButton;

    fn key(key: egui::Key, pressed: bool) -> egui::Event {
        egui::Event::Key {
            key,
            physical_key: None,
            pressed,
            repeat: false,
            modifiers: egui::Modifiers::NONE,
        }
    }

    /// Run one frame and collect the drive commands it produced
    fn frame(
        ctx: &egui::Context,
        pad: &mut ControlPad,
        events: Vec<egui::Event>,
        window_focused: bool,
        widget_focused: bool,
    ) -> Vec<DriveCommand> {
        let input = egui::RawInput {
            events,
            focused: window_focused,
            ..Default::default()
        };
        let mut commands = Vec::new();
        let _ = ctx.run(input, |ctx| {
            if widget_focused {
                ctx.memory_mut(|m| m.request_focus(egui::Id::new("focused_widget")));
            }
            commands = keyboard_commands(ctx, pad);
        });
        commands
    }

    #[test]
    fn test_keys_drive_and_stop() {
        let ctx = egui::Context::default();
        let mut pad = ControlPad::new();

        let sent = frame(&ctx, &mut pad, vec![key(egui::Key::ArrowUp, true)], true, false);
        assert_eq!(sent, vec![DriveCommand::Forward]);

        let sent = frame(&ctx, &mut pad, vec![key(egui::Key::ArrowUp, false)], true, false);
        assert_eq!(sent, vec![DriveCommand::Stop]);
    }

    #[test]
    fn test_release_reaches_pad_while_widget_has_focus() {
        let ctx = egui::Context::default();
        let mut pad = ControlPad::new();

        let sent = frame(&ctx, &mut pad, vec![key(egui::Key::ArrowUp, true)], true, false);
        assert_eq!(sent, vec![DriveCommand::Forward]);

        // Tab moved keyboard focus onto a widget before the key was released
        let sent = frame(&ctx, &mut pad, vec![key(egui::Key::ArrowUp, false)], true, true);
        assert_eq!(sent, vec![DriveCommand::Stop]);
        assert!(!pad.is_active(ControlButton::Forward));
    }

    #[test]
    fn test_presses_ignored_while_widget_has_focus() {
        let ctx = egui::Context::default();
        let mut pad = ControlPad::new();

        let sent = frame(&ctx, &mut pad, vec![key(egui::Key::ArrowUp, true)], true, true);
        assert!(sent.is_empty());
        assert!(!pad.is_active(ControlButton::Forward));
    }

    #[test]
    fn test_window_focus_loss_stops_motors() {
        let ctx = egui::Context::default();
        let mut pad = ControlPad::new();

        frame(&ctx, &mut pad, vec![key(egui::Key::Enter, true)], true, false);
        let sent = frame(&ctx, &mut pad, Vec::new(), false, false);
        assert_eq!(sent, vec![DriveCommand::Stop]);
    }

    #[test]
    fn test_auto_repeat_is_ignored() {
        let ctx = egui::Context::default();
        let mut pad = ControlPad::new();

        frame(&ctx, &mut pad, vec![key(egui::Key::ArrowLeft, true)], true, false);
        let repeat = egui::Event::Key {
            key: egui::Key::ArrowLeft,
            physical_key: None,
            pressed: true,
            repeat: true,
            modifiers: egui::Modifiers::NONE,
        };
        assert!(frame(&ctx, &mut pad, vec![repeat], true, false).is_empty());
    }

    #[test]
    fn test_control_key_mapping() {
        assert_eq!(control_key(egui::Key::ArrowUp), Some(ControlKey::Up));
        assert_eq!(control_key(egui::Key::Enter), Some(ControlKey::Turbo));
        assert_eq!(control_key(egui::Key::Space), Some(ControlKey::Brake));
        assert_eq!(control_key(egui::Key::A), None);
    }
}
