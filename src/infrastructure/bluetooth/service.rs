//! Bluetooth Service Module
//!
//! Main service that coordinates scanning, connection, and command
//! delivery for a Pybricks hub. Runs on its own thread with a tokio runtime
//! and talks to the GUI through channels.

use crate::domain::command::DriveCommand;
use crate::domain::models::{
    AppEvent, BluetoothCommand, ConnectionStatus, MessageSeverity, StatusMessage,
};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::{
    connection::{BleConnection, ConnectedHub, ConnectionConfig, LinkEvent, ProgramSource},
    scanner::{BleScanner, ScanOptions},
};
use anyhow::{anyhow, Result};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to look for a hub that is not in the adapter's cache
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn the Bluetooth worker thread and return its command channel
pub fn spawn_worker(
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: Arc<Mutex<SettingsService>>,
) -> mpsc::UnboundedSender<BluetoothCommand> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime for Bluetooth: {}", e);
                let _ = event_sender.send(AppEvent::LogMessage(StatusMessage::new(
                    format!("Bluetooth unavailable: {}", e),
                    MessageSeverity::Error,
                )));
                return;
            }
        };

        rt.block_on(BluetoothService::new(event_sender, settings).run(command_rx));
    });

    command_tx
}

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService {
    adapter: Option<Adapter>,
    adapter_events: Option<JoinHandle<()>>,
    scanner: BleScanner,
    hub: Option<ConnectedHub>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    settings: Arc<Mutex<SettingsService>>,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    pub fn new(
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: Arc<Mutex<SettingsService>>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Self {
            adapter: None,
            adapter_events: None,
            scanner: BleScanner::new(event_sender.clone()),
            hub: None,
            event_sender,
            link_tx,
            link_rx: Some(link_rx),
            settings,
        }
    }

    /// Process GUI commands and link events until the GUI goes away
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<BluetoothCommand>) {
        let Some(mut link_events) = self.link_rx.take() else {
            return;
        };

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = link_events.recv() => self.handle_link_event(event).await,
            }
        }

        info!("Bluetooth worker shutting down");
        self.scanner.stop().await;
        self.disconnect().await;
        if let Some(task) = self.adapter_events.take() {
            task.abort();
        }
    }

    async fn handle_command(&mut self, command: BluetoothCommand) {
        debug!("Bluetooth command: {:?}", command);
        match command {
            BluetoothCommand::StartScan => self.start_scan().await,
            BluetoothCommand::StopScan => self.scanner.stop().await,
            BluetoothCommand::Connect(id) => {
                if let Err(e) = self.connect(&id).await {
                    self.connect_failed(&e);
                }
            }
            BluetoothCommand::Disconnect => self.disconnect().await,
            BluetoothCommand::Send(command) => self.send(command).await,
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        let current = self.hub.as_ref().map(|hub| hub.id.clone());

        match event {
            LinkEvent::Disconnected(id) if current.as_ref() == Some(&id) => {
                warn!("Connection to hub {} lost", id);
                if let Some(hub) = self.hub.take() {
                    hub.abandon();
                }
                self.send_log("Connection to hub lost.", MessageSeverity::Warning);
                self.finish_disconnect();
            }
            LinkEvent::ProgramStopped(id) if current.as_ref() == Some(&id) => {
                warn!("Gateway program on {} stopped", id);
                self.send_log("Hub program stopped.", MessageSeverity::Warning);
                self.disconnect().await;
            }
            other => debug!("Ignoring stale link event {:?}", other),
        }
    }

    /// Get the first Bluetooth adapter, initializing it on first use
    async fn adapter(&mut self) -> Result<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;
        info!(
            "Using Bluetooth adapter: {}",
            adapter.adapter_info().await.unwrap_or_default()
        );

        // Forward disconnects so lost hubs are noticed
        let mut events = adapter.events().await?;
        let link_tx = self.link_tx.clone();
        self.adapter_events = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    let _ = link_tx.send(LinkEvent::Disconnected(id.to_string()));
                }
            }
        }));

        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    async fn start_scan(&mut self) {
        let options = match self.settings.lock() {
            Ok(settings) => {
                let s = settings.get();
                ScanOptions {
                    timeout: Duration::from_secs(s.scan_timeout_secs.max(1)),
                    show_unnamed: s.show_unnamed_devices,
                    pybricks_only: s.pybricks_only,
                }
            }
            Err(_) => ScanOptions::default(),
        };

        match self.adapter().await {
            Ok(adapter) => self.scanner.start(&adapter, options).await,
            Err(e) => {
                error!("Failed to start scan: {:#}", e);
                self.send_log(format!("Bluetooth unavailable: {:#}", e), MessageSeverity::Error);
                let _ = self.event_sender.send(AppEvent::ScanFinished);
            }
        }
    }

    /// Read connection settings, loading the program file if one is set
    async fn connection_config(&self) -> Result<ConnectionConfig> {
        let (program_path, start_timeout_ms) = {
            let settings = self
                .settings
                .lock()
                .map_err(|_| anyhow!("Lock error"))?;
            let s = settings.get();
            (s.program_path.clone(), s.program_start_timeout_ms)
        };

        let program = match program_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| anyhow!("could not read program {}: {}", path, e))?;
                info!("Loaded {} byte program from {}", bytes.len(), path);
                ProgramSource::Compiled(bytes)
            }
            None => ProgramSource::Bundled,
        };

        Ok(ConnectionConfig {
            program,
            start_timeout: Duration::from_millis(start_timeout_ms),
            ..ConnectionConfig::default()
        })
    }

    /// Connect to a hub by platform peripheral id
    async fn connect(&mut self, id: &str) -> Result<()> {
        if self.hub.is_some() {
            self.disconnect().await;
        }
        self.scanner.stop().await;
        self.send_status(ConnectionStatus::Connecting);

        let config = self.connection_config().await?;
        let adapter = self.adapter().await?;
        let peripheral = find_peripheral(&adapter, id, LOOKUP_TIMEOUT).await?;
        let name = peripheral
            .properties()
            .await?
            .and_then(|p| p.local_name)
            .unwrap_or_else(|| "hub".to_string());

        let connection = BleConnection::new(self.event_sender.clone(), self.link_tx.clone(), config);
        let hub = connection.connect(peripheral, &name).await?;

        let _ = self.event_sender.send(AppEvent::HubInfo(hub.info.clone()));
        let _ = self.event_sender.send(AppEvent::HubStatus(hub.session.status()));
        self.hub = Some(hub);

        self.send_log("Connection established!", MessageSeverity::Success);
        self.send_status(ConnectionStatus::Connected);
        Ok(())
    }

    fn connect_failed(&self, e: &anyhow::Error) {
        error!("Connection failed: {:#}", e);
        self.send_log(format!("Connection failed: {:#}", e), MessageSeverity::Error);
        self.finish_disconnect_with(ConnectionStatus::Error);
    }

    async fn send(&mut self, command: DriveCommand) {
        let Some(hub) = &self.hub else {
            debug!("Dropping {:?}: not connected", command);
            return;
        };

        let result = hub.session.send(command).await;
        match result {
            Ok(()) => {
                debug!("Sent {:?}", command);
                self.send_log(format!("Action: {}", command.description()), MessageSeverity::Info);
            }
            Err(e) if e.is_disconnect() => {
                warn!("Send failed, hub gone: {}", e);
                if let Some(hub) = self.hub.take() {
                    hub.abandon();
                }
                self.send_log("Connection to hub lost.", MessageSeverity::Warning);
                self.finish_disconnect();
            }
            Err(e) => {
                error!("Send error: {}", e);
                self.send_log(format!("Send error: {}", e), MessageSeverity::Error);
            }
        }
    }

    /// Disconnect from the current hub
    pub async fn disconnect(&mut self) {
        let Some(hub) = self.hub.take() else {
            return;
        };

        self.send_log(DriveCommand::Exit.description(), MessageSeverity::Info);
        hub.close().await;
        self.finish_disconnect();
    }

    fn finish_disconnect(&self) {
        self.finish_disconnect_with(ConnectionStatus::Disconnected);
    }

    fn finish_disconnect_with(&self, status: ConnectionStatus) {
        self.send_log("System disconnected.", MessageSeverity::Info);
        self.send_status(status);
    }

    fn send_status(&self, status: ConnectionStatus) {
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(status));
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

/// Find a peripheral by id, scanning briefly if the adapter has not seen it
async fn find_peripheral(adapter: &Adapter, id: &str, timeout: Duration) -> Result<Peripheral> {
    if let Some(peripheral) = lookup(adapter, id).await? {
        return Ok(peripheral);
    }

    info!("Hub {} not cached, scanning for it", id);
    adapter.start_scan(ScanFilter::default()).await?;
    let start = std::time::Instant::now();
    let mut found = None;
    while start.elapsed() < timeout {
        if let Some(peripheral) = lookup(adapter, id).await? {
            found = Some(peripheral);
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    if let Err(e) = adapter.stop_scan().await {
        debug!("stop_scan failed: {}", e);
    }

    found.ok_or_else(|| anyhow!("hub not found, scan again and make sure it is powered on"))
}

async fn lookup(adapter: &Adapter, id: &str) -> Result<Option<Peripheral>> {
    Ok(adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|p| p.id().to_string() == id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (BluetoothService, mpsc::UnboundedReceiver<AppEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let path = std::env::temp_dir().join(format!(
            "lego_hub_remote_service_{}.json",
            std::process::id()
        ));
        let settings = Arc::new(Mutex::new(SettingsService::with_path(path)));
        (BluetoothService::new(event_tx, settings), event_rx)
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[test]
    fn test_failed_connection_ends_disconnected() {
        let (service, mut events) = service();

        service.connect_failed(&anyhow!("hub not found"));

        let events = drain(&mut events);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            AppEvent::LogMessage(msg)
                if msg.message == "Connection failed: hub not found"
                    && msg.severity == MessageSeverity::Error
        ));
        assert!(matches!(
            &events[1],
            AppEvent::LogMessage(msg) if msg.message == "System disconnected."
        ));
        assert!(matches!(
            events[2],
            AppEvent::ConnectionStatus(ConnectionStatus::Error)
        ));
    }

    #[tokio::test]
    async fn test_send_without_hub_is_dropped() {
        let (mut service, mut events) = service();

        service.send(DriveCommand::Forward).await;

        assert!(drain(&mut events).is_empty());
    }
}
