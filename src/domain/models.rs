use crate::domain::command::DriveCommand;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(ConnectionStatus),
    LogMessage(StatusMessage),
    DeviceFound(ScannedDevice),
    ScanFinished,
    HubInfo(HubInfo),
    HubStatus(HubStatus),
    HubOutput(String),
}

/// Requests sent from the GUI to the Bluetooth worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothCommand {
    StartScan,
    StopScan,
    /// Connect to the peripheral with this platform id
    Connect(String),
    Disconnect,
    Send(DriveCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub id: String,
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertises the Pybricks service
    pub is_pybricks: bool,
}

impl ScannedDevice {
    pub fn label(&self) -> String {
        format!("{}\n[{}]", self.name, self.address)
    }
}

/// A hub remembered between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHub {
    pub id: String,
    pub name: String,
}

impl From<&ScannedDevice> for KnownHub {
    fn from(device: &ScannedDevice) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
        }
    }
}

/// Information read from the hub during the connection handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubInfo {
    pub name: String,
    pub firmware_revision: Option<String>,
    pub protocol_revision: Option<String>,
    pub max_write_size: usize,
    pub max_program_size: Option<u32>,
}

/// Pybricks status report flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStatus(pub u32);

impl HubStatus {
    pub const BATTERY_LOW_VOLTAGE_WARNING: u32 = 1 << 0;
    pub const BATTERY_LOW_VOLTAGE_SHUTDOWN: u32 = 1 << 1;
    pub const BATTERY_HIGH_CURRENT: u32 = 1 << 2;
    pub const BLE_ADVERTISING: u32 = 1 << 3;
    pub const BLE_LOW_SIGNAL: u32 = 1 << 4;
    pub const POWER_BUTTON_PRESSED: u32 = 1 << 5;
    pub const USER_PROGRAM_RUNNING: u32 = 1 << 6;
    pub const SHUTDOWN: u32 = 1 << 7;
    pub const SHUTDOWN_REQUESTED: u32 = 1 << 8;

    /// Flag names in bit order, used by the diagnostics view
    pub const NAMES: [(u32, &'static str); 9] = [
        (Self::BATTERY_LOW_VOLTAGE_WARNING, "Battery low (warning)"),
        (Self::BATTERY_LOW_VOLTAGE_SHUTDOWN, "Battery low (shutdown)"),
        (Self::BATTERY_HIGH_CURRENT, "Battery high current"),
        (Self::BLE_ADVERTISING, "BLE advertising"),
        (Self::BLE_LOW_SIGNAL, "BLE low signal"),
        (Self::POWER_BUTTON_PRESSED, "Power button pressed"),
        (Self::USER_PROGRAM_RUNNING, "User program running"),
        (Self::SHUTDOWN, "Shutdown"),
        (Self::SHUTDOWN_REQUESTED, "Shutdown requested"),
    ];

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn program_running(&self) -> bool {
        self.contains(Self::USER_PROGRAM_RUNNING)
    }

    pub fn battery_low(&self) -> bool {
        self.contains(Self::BATTERY_LOW_VOLTAGE_WARNING)
            || self.contains(Self::BATTERY_LOW_VOLTAGE_SHUTDOWN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Drive,
    Settings,
    Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let status = HubStatus(0b0100_0001);
        assert!(status.program_running());
        assert!(status.battery_low());
        assert!(!status.contains(HubStatus::SHUTDOWN));
        assert!(!HubStatus::default().program_running());
    }

    #[test]
    fn test_device_label() {
        let device = ScannedDevice {
            id: "hci0/dev_90_84_2B_00_00_01".to_string(),
            name: "Pybricks Hub".to_string(),
            address: "90:84:2B:00:00:01".to_string(),
            rssi: Some(-60),
            is_pybricks: true,
        };
        assert_eq!(device.label(), "Pybricks Hub\n[90:84:2B:00:00:01]");
        assert_eq!(KnownHub::from(&device).name, "Pybricks Hub");
    }
}
