//! BLE Scanner Module
//!
//! Handles Bluetooth LE device discovery for Pybricks hubs.

use crate::domain::models::{AppEvent, MessageSeverity, ScannedDevice, StatusMessage};
use crate::infrastructure::bluetooth::protocol::PYBRICKS_SERVICE_UUID;
use btleplug::api::{Central, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// How often the adapter's peripheral list is polled during a scan
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub timeout: Duration,
    /// Include devices that advertise no name
    pub show_unnamed: bool,
    /// Only report devices advertising the Pybricks service
    pub pybricks_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(4),
            show_unnamed: false,
            pybricks_only: false,
        }
    }
}

/// Advertisement fields relevant for listing a device
#[derive(Debug, Clone, Default)]
pub struct Advertisement<'a> {
    pub local_name: Option<&'a str>,
    pub address: String,
    pub rssi: Option<i16>,
    pub services: &'a [Uuid],
}

/// Decide whether and how a discovered device is listed
pub fn to_scanned_device(
    id: String,
    adv: &Advertisement<'_>,
    options: &ScanOptions,
) -> Option<ScannedDevice> {
    let is_pybricks = adv.services.contains(&PYBRICKS_SERVICE_UUID);
    if options.pybricks_only && !is_pybricks {
        return None;
    }

    let name = match adv.local_name.map(str::trim) {
        Some(name) if !name.is_empty() && name != "Unknown" => name.to_string(),
        _ if options.show_unnamed => "Unknown".to_string(),
        _ => return None,
    };

    // Some platforms hide the MAC address; fall back to the platform id
    let address = if adv.address.is_empty() || adv.address == "00:00:00:00:00:00" {
        id.clone()
    } else {
        adv.address.clone()
    };

    Some(ScannedDevice {
        id,
        name,
        address,
        rssi: adv.rssi,
        is_pybricks,
    })
}

/// BLE Scanner for discovering hubs
pub struct BleScanner {
    task: Option<JoinHandle<()>>,
    adapter: Option<Adapter>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl BleScanner {
    /// Create a new scanner
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            task: None,
            adapter: None,
            event_sender,
        }
    }

    /// Start a timed scan in the background
    ///
    /// Devices are reported with `AppEvent::DeviceFound` as they appear and
    /// `AppEvent::ScanFinished` is sent when the scan ends.
    pub async fn start(&mut self, adapter: &Adapter, options: ScanOptions) {
        // Stop any existing scan
        self.stop().await;

        info!(
            "Starting BLE scan for {:?} (pybricks only: {})",
            options.timeout, options.pybricks_only
        );
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            "Scanning BLE devices...",
            MessageSeverity::Info,
        )));

        let sender = self.event_sender.clone();
        let scan_adapter = adapter.clone();
        self.task = Some(tokio::spawn(async move {
            match scan(&scan_adapter, &options, &sender).await {
                Ok(count) => info!("Scan finished, {} device(s) listed", count),
                Err(e) => {
                    error!("Scan failed: {}", e);
                    let _ = sender.send(AppEvent::LogMessage(StatusMessage::new(
                        format!("Scan failed: {}", e),
                        MessageSeverity::Error,
                    )));
                }
            }
            if let Err(e) = scan_adapter.stop_scan().await {
                debug!("stop_scan failed: {}", e);
            }
            let _ = sender.send(AppEvent::ScanFinished);
        }));
        self.adapter = Some(adapter.clone());
    }

    /// Stop scanning
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            if task.is_finished() {
                return;
            }
            info!("Stopping BLE scan...");
            task.abort();
            if let Some(adapter) = &self.adapter {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("stop_scan failed: {}", e);
                }
            }
            let _ = self.event_sender.send(AppEvent::ScanFinished);
        }
    }
}

async fn scan(
    adapter: &Adapter,
    options: &ScanOptions,
    sender: &mpsc::UnboundedSender<AppEvent>,
) -> Result<usize, btleplug::Error> {
    let filter = if options.pybricks_only {
        ScanFilter {
            services: vec![PYBRICKS_SERVICE_UUID],
        }
    } else {
        ScanFilter::default()
    };
    adapter.start_scan(filter).await?;

    let deadline = tokio::time::Instant::now() + options.timeout;
    let mut reported = HashSet::new();

    loop {
        for peripheral in adapter.peripherals().await? {
            let Some(props) = peripheral.properties().await? else {
                continue;
            };
            let id = peripheral.id().to_string();
            if reported.contains(&id) {
                continue;
            }

            let adv = Advertisement {
                local_name: props.local_name.as_deref(),
                address: props.address.to_string(),
                rssi: props.rssi,
                services: &props.services,
            };
            if let Some(device) = to_scanned_device(id.clone(), &adv, options) {
                debug!("Found {} [{}]", device.name, device.address);
                reported.insert(id);
                let _ = sender.send(AppEvent::DeviceFound(device));
            }
        }

        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Ok(reported.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv<'a>(name: Option<&'a str>, services: &'a [Uuid]) -> Advertisement<'a> {
        Advertisement {
            local_name: name,
            address: "90:84:2B:11:22:33".to_string(),
            rssi: Some(-55),
            services,
        }
    }

    #[test]
    fn test_named_device_is_listed() {
        let device = to_scanned_device(
            "dev1".to_string(),
            &adv(Some("Pybricks Hub"), &[PYBRICKS_SERVICE_UUID]),
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(device.name, "Pybricks Hub");
        assert_eq!(device.address, "90:84:2B:11:22:33");
        assert!(device.is_pybricks);
    }

    #[test]
    fn test_unnamed_devices_hidden_by_default() {
        let options = ScanOptions::default();
        assert!(to_scanned_device("a".into(), &adv(None, &[]), &options).is_none());
        assert!(to_scanned_device("b".into(), &adv(Some("Unknown"), &[]), &options).is_none());
        assert!(to_scanned_device("c".into(), &adv(Some("  "), &[]), &options).is_none());

        let options = ScanOptions {
            show_unnamed: true,
            ..ScanOptions::default()
        };
        let device = to_scanned_device("a".into(), &adv(None, &[]), &options).unwrap();
        assert_eq!(device.name, "Unknown");
    }

    #[test]
    fn test_pybricks_only_filter() {
        let options = ScanOptions {
            pybricks_only: true,
            ..ScanOptions::default()
        };
        assert!(to_scanned_device("a".into(), &adv(Some("Headphones"), &[]), &options).is_none());
        assert!(to_scanned_device(
            "b".into(),
            &adv(Some("Truck"), &[PYBRICKS_SERVICE_UUID]),
            &options
        )
        .is_some());
    }

    #[test]
    fn test_hidden_address_uses_platform_id() {
        let mut advertisement = adv(Some("Truck"), &[]);
        advertisement.address = "00:00:00:00:00:00".to_string();
        let device = to_scanned_device(
            "4A1E8C3B-0000-1111".to_string(),
            &advertisement,
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(device.address, "4A1E8C3B-0000-1111");
    }
}
