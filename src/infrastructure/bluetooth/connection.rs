//! BLE Connection Module
//!
//! Handles the connection handshake with a Pybricks hub: GATT discovery,
//! capability and device information reads, notification handling, and
//! getting the gateway program running.

use crate::domain::gateway;
use crate::domain::models::{AppEvent, HubInfo, HubStatus, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::error::HubError;
use crate::infrastructure::bluetooth::protocol::{
    self, HubCapabilities, HubEvent, LineBuffer, COMMAND_EVENT_UUID, FIRMWARE_REVISION_UUID,
    HUB_CAPABILITIES_UUID, SOFTWARE_REVISION_UUID,
};
use crate::infrastructure::bluetooth::session::{HubLink, HubSession};
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// How long the gateway gets to exit after being asked to
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for the first status report after subscribing
const FIRST_STATUS_TIMEOUT: Duration = Duration::from_millis(1000);

/// Link-level events reported back to the Bluetooth service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The peripheral with this id dropped its connection
    Disconnected(String),
    /// The gateway program on this hub stopped on its own
    ProgramStopped(String),
}

/// Where the gateway program comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProgramSource {
    /// Paste the bundled gateway source into the hub's REPL
    #[default]
    Bundled,
    /// Upload a compiled program blob
    Compiled(Vec<u8>),
}

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub program: ProgramSource,
    /// Time allowed for the gateway to report that it is running
    pub start_timeout: Duration,
    /// Time allowed for a previously running program to stop
    pub stop_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            program: ProgramSource::Bundled,
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Writes command packets to the Pybricks command/event characteristic
pub struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl HubLink for BleLink {
    async fn write(&self, packet: &[u8]) -> Result<(), HubError> {
        self.peripheral
            .write(&self.characteristic, packet, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}

/// A hub with the gateway program running
pub struct ConnectedHub {
    pub id: String,
    pub name: String,
    pub info: HubInfo,
    pub session: HubSession<BleLink>,
    peripheral: Peripheral,
    notifications: JoinHandle<()>,
    /// Report the program stopping; cleared during an intentional shutdown
    watch_program: Arc<AtomicBool>,
}

impl ConnectedHub {
    /// Stop the gateway program and drop the BLE connection
    pub async fn close(mut self) {
        self.watch_program.store(false, Ordering::SeqCst);

        if let Err(e) = self.session.shutdown(SHUTDOWN_GRACE).await {
            warn!("Could not stop hub program cleanly: {}", e);
        }

        self.notifications.abort();
        if let Err(e) = self.peripheral.disconnect().await {
            debug!("Disconnect returned error: {}", e);
        }
        info!("Closed connection to {}", self.name);
    }

    /// Release resources after the link is already gone
    pub fn abandon(self) {
        self.watch_program.store(false, Ordering::SeqCst);
        self.notifications.abort();
        info!("Dropped lost connection to {}", self.name);
    }
}

/// BLE Connection handler
pub struct BleConnection {
    event_sender: mpsc::UnboundedSender<AppEvent>,
    link_events: mpsc::UnboundedSender<LinkEvent>,
    config: ConnectionConfig,
}

impl BleConnection {
    /// Create a new connection handler
    pub fn new(
        event_sender: mpsc::UnboundedSender<AppEvent>,
        link_events: mpsc::UnboundedSender<LinkEvent>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            event_sender,
            link_events,
            config,
        }
    }

    /// Connect to a hub and start the gateway program
    ///
    /// The peripheral is disconnected again if any step fails.
    pub async fn connect(&self, peripheral: Peripheral, name: &str) -> Result<ConnectedHub, HubError> {
        info!("Connecting to hub {} ({})", name, peripheral.id());
        self.send_log(&format!("Connecting to {}...", name), MessageSeverity::Info);

        match self.handshake(&peripheral, name).await {
            Ok(hub) => Ok(hub),
            Err(e) => {
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    debug!("Cleanup disconnect failed: {}", disconnect_err);
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self, peripheral: &Peripheral, name: &str) -> Result<ConnectedHub, HubError> {
        let id = peripheral.id().to_string();

        // Step 1: Connect to BLE device
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        info!("Device connected: {}", name);

        // Step 2: Discover GATT services
        peripheral.discover_services().await?;
        let characteristics = peripheral.characteristics();
        debug!("Found {} characteristics", characteristics.len());

        // Step 3: Locate the Pybricks command/event characteristic
        let command_char = find_characteristic(&characteristics, COMMAND_EVENT_UUID)
            .ok_or(HubError::MissingCharacteristic("Pybricks command characteristic"))?;

        // Step 4: Read capabilities and device information
        let capabilities = self.read_capabilities(peripheral, &characteristics).await;
        let info = HubInfo {
            name: name.to_string(),
            firmware_revision: read_string(peripheral, &characteristics, FIRMWARE_REVISION_UUID)
                .await,
            protocol_revision: read_string(peripheral, &characteristics, SOFTWARE_REVISION_UUID)
                .await,
            max_write_size: capabilities.max_write_size,
            max_program_size: capabilities.max_program_size,
        };
        info!(
            "Hub firmware {:?}, protocol {:?}, max write {} bytes",
            info.firmware_revision, info.protocol_revision, info.max_write_size
        );

        // Step 5: Subscribe to hub events
        // REPL echo is held back until the pasted gateway announces itself
        let output_gate = OutputGate::new(
            self.pastes_gateway(&capabilities)
                .then_some(gateway::READY_MARKER),
        );
        let (status_tx, status_rx) = watch::channel(HubStatus::default());
        let watch_program = Arc::new(AtomicBool::new(false));
        let notifications = self
            .spawn_notification_handler(
                peripheral,
                id.clone(),
                status_tx,
                watch_program.clone(),
                output_gate,
            )
            .await?;
        if let Err(e) = peripheral.subscribe(&command_char).await {
            notifications.abort();
            return Err(e.into());
        }

        let link = BleLink {
            peripheral: peripheral.clone(),
            characteristic: command_char,
        };
        let mut session = HubSession::new(link, capabilities, status_rx);

        // Step 6: Get the gateway program running
        if let Err(e) = self.start_gateway(&mut session).await {
            notifications.abort();
            return Err(e);
        }
        watch_program.store(true, Ordering::SeqCst);

        Ok(ConnectedHub {
            id,
            name: name.to_string(),
            info,
            session,
            peripheral: peripheral.clone(),
            notifications,
            watch_program,
        })
    }

    fn pastes_gateway(&self, capabilities: &HubCapabilities) -> bool {
        self.config.program == ProgramSource::Bundled && capabilities.has_repl()
    }

    async fn read_capabilities(
        &self,
        peripheral: &Peripheral,
        characteristics: &BTreeSet<Characteristic>,
    ) -> HubCapabilities {
        let Some(characteristic) = find_characteristic(characteristics, HUB_CAPABILITIES_UUID)
        else {
            info!("Hub does not report capabilities, using defaults");
            return HubCapabilities::default();
        };

        match peripheral.read(&characteristic).await {
            Ok(bytes) => match HubCapabilities::parse(&bytes) {
                Ok(capabilities) => capabilities,
                Err(e) => {
                    warn!("Invalid capabilities from hub: {}", e);
                    HubCapabilities::default()
                }
            },
            Err(e) => {
                warn!("Could not read hub capabilities: {}", e);
                HubCapabilities::default()
            }
        }
    }

    async fn spawn_notification_handler(
        &self,
        peripheral: &Peripheral,
        id: String,
        status_tx: watch::Sender<HubStatus>,
        watch_program: Arc<AtomicBool>,
        mut output_gate: OutputGate,
    ) -> Result<JoinHandle<()>, HubError> {
        let mut stream = peripheral.notifications().await?;
        let events = self.event_sender.clone();
        let link_events = self.link_events.clone();

        Ok(tokio::spawn(async move {
            let mut stdout = LineBuffer::new();

            while let Some(notification) = stream.next().await {
                if notification.uuid != COMMAND_EVENT_UUID {
                    continue;
                }

                match protocol::parse_event(&notification.value) {
                    Ok(HubEvent::Status(status)) => {
                        let previous = status_tx.send_replace(status);
                        let transition = status_transition(
                            previous,
                            status,
                            watch_program.load(Ordering::SeqCst),
                        );
                        if transition.changed {
                            debug!("Hub status {:#06X} -> {:#06X}", previous.0, status.0);
                            let _ = events.send(AppEvent::HubStatus(status));
                        }
                        if transition.program_stopped {
                            let _ = link_events.send(LinkEvent::ProgramStopped(id.clone()));
                        }
                    }
                    Ok(HubEvent::Stdout(bytes)) => {
                        for line in stdout.push(&bytes) {
                            match output_gate.pass(line) {
                                Some(line) => {
                                    info!("Hub: {}", line);
                                    let _ = events.send(AppEvent::HubOutput(line));
                                }
                                None => trace!("Held back REPL output"),
                            }
                        }
                    }
                    Ok(HubEvent::AppData(data)) => {
                        trace!("Ignoring {} bytes of app data", data.len());
                    }
                    Err(e) => debug!("Ignoring notification: {}", e),
                }
            }

            if let Some(line) = stdout.flush().and_then(|line| output_gate.pass(line)) {
                let _ = events.send(AppEvent::HubOutput(line));
            }
            debug!("Notification stream for {} ended", id);
        }))
    }

    /// Stop any leftover program, then load and start the gateway
    async fn start_gateway(&self, session: &mut HubSession<BleLink>) -> Result<(), HubError> {
        if !session.wait_for_status(FIRST_STATUS_TIMEOUT).await {
            debug!("No status report yet, assuming no program is running");
        }

        if session.status().program_running() {
            info!("A program is already running on the hub, stopping it");
            self.send_log("Stopping program already running on the hub...", MessageSeverity::Info);
            session.stop_program().await?;
            session
                .wait_for_program(false, self.config.stop_timeout)
                .await?;
        }

        match &self.config.program {
            ProgramSource::Compiled(program) => {
                self.send_log("Loading gateway program...", MessageSeverity::Info);
                session.load_program(program).await?;
                session.start_program().await?;
            }
            ProgramSource::Bundled if session.capabilities().has_repl() => {
                self.send_log("Loading gateway program...", MessageSeverity::Info);
                session.start_repl().await?;
                session
                    .wait_for_program(true, self.config.start_timeout)
                    .await?;
                session.run_source(gateway::GATEWAY_PROGRAM).await?;
            }
            ProgramSource::Bundled => {
                warn!("Hub has no REPL, starting the program stored on it");
                self.send_log(
                    "Hub cannot take the bundled gateway, starting its stored program...",
                    MessageSeverity::Warning,
                );
                session.start_program().await?;
            }
        }

        session
            .wait_for_program(true, self.config.start_timeout)
            .await?;

        info!("Gateway program running");
        Ok(())
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

/// What a new status report means for the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatusTransition {
    changed: bool,
    /// The program stopped while it was expected to keep running
    program_stopped: bool,
}

fn status_transition(previous: HubStatus, current: HubStatus, watching: bool) -> StatusTransition {
    StatusTransition {
        changed: previous != current,
        program_stopped: watching && previous.program_running() && !current.program_running(),
    }
}

/// Drops hub output until an expected line appears
#[derive(Debug)]
struct OutputGate {
    waiting_for: Option<&'static str>,
}

impl OutputGate {
    fn new(waiting_for: Option<&'static str>) -> Self {
        Self { waiting_for }
    }

    fn pass(&mut self, line: String) -> Option<String> {
        match self.waiting_for {
            Some(marker) if line.trim() == marker => {
                self.waiting_for = None;
                Some(line)
            }
            Some(_) => None,
            None => Some(line),
        }
    }
}

fn find_characteristic(
    characteristics: &BTreeSet<Characteristic>,
    uuid: Uuid,
) -> Option<Characteristic> {
    characteristics.iter().find(|c| c.uuid == uuid).cloned()
}

/// Read an optional UTF-8 characteristic such as a revision string
async fn read_string(
    peripheral: &Peripheral,
    characteristics: &BTreeSet<Characteristic>,
    uuid: Uuid,
) -> Option<String> {
    let characteristic = find_characteristic(characteristics, uuid)?;
    match peripheral.read(&characteristic).await {
        Ok(bytes) => Some(
            String::from_utf8_lossy(&bytes)
                .trim_end_matches('\0')
                .to_string(),
        ),
        Err(e) => {
            debug!("Could not read {}: {}", uuid, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> HubStatus {
        HubStatus(HubStatus::USER_PROGRAM_RUNNING | HubStatus::BLE_ADVERTISING)
    }

    fn idle() -> HubStatus {
        HubStatus(HubStatus::BLE_ADVERTISING)
    }

    #[test]
    fn test_program_stop_is_reported_while_watching() {
        let transition = status_transition(running(), idle(), true);
        assert!(transition.changed);
        assert!(transition.program_stopped);
    }

    #[test]
    fn test_intentional_stop_is_not_reported() {
        let transition = status_transition(running(), idle(), false);
        assert!(transition.changed);
        assert!(!transition.program_stopped);
    }

    #[test]
    fn test_repeated_and_starting_reports() {
        assert_eq!(
            status_transition(running(), running(), true),
            StatusTransition {
                changed: false,
                program_stopped: false
            }
        );
        assert!(!status_transition(idle(), running(), true).program_stopped);
        assert!(!status_transition(idle(), idle(), true).program_stopped);
    }

    #[test]
    fn test_output_gate_holds_back_repl_echo() {
        let mut gate = OutputGate::new(Some(gateway::READY_MARKER));
        assert_eq!(gate.pass("paste mode; Ctrl-C to cancel".to_string()), None);
        assert_eq!(gate.pass("=== print('GATEWAY READY')".to_string()), None);
        assert_eq!(
            gate.pass("GATEWAY READY".to_string()),
            Some("GATEWAY READY".to_string())
        );
        assert_eq!(gate.pass("speed 900".to_string()), Some("speed 900".to_string()));
    }

    #[test]
    fn test_open_output_gate_passes_everything() {
        let mut gate = OutputGate::new(None);
        assert_eq!(gate.pass(">>> ".to_string()), Some(">>> ".to_string()));
    }

    #[test]
    fn test_bundled_program_is_default() {
        assert_eq!(ConnectionConfig::default().program, ProgramSource::Bundled);
    }
}
