//! Hub Session
//!
//! Drives the Pybricks command protocol over an abstract link so that the
//! program loading and command flow can be exercised without a radio.

use crate::domain::command::DriveCommand;
use crate::domain::models::HubStatus;
use crate::infrastructure::bluetooth::error::HubError;
use crate::infrastructure::bluetooth::protocol::{self, HubCapabilities, HubCommand};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Transport for command packets
///
/// Implemented by the BLE characteristic writer, and by a mock in tests.
pub trait HubLink {
    /// Write one packet to the command/event characteristic
    fn write(&self, packet: &[u8]) -> impl Future<Output = Result<(), HubError>> + Send;
}

pub struct HubSession<L: HubLink> {
    link: L,
    capabilities: HubCapabilities,
    status: watch::Receiver<HubStatus>,
}

impl<L: HubLink> HubSession<L> {
    pub fn new(
        link: L,
        capabilities: HubCapabilities,
        status: watch::Receiver<HubStatus>,
    ) -> Self {
        Self {
            link,
            capabilities,
            status,
        }
    }

    pub fn capabilities(&self) -> &HubCapabilities {
        &self.capabilities
    }

    /// Most recent status report
    pub fn status(&self) -> HubStatus {
        *self.status.borrow()
    }

    async fn write(&self, command: HubCommand) -> Result<(), HubError> {
        let packet = command.encode();
        trace!("TX {:02X?}", packet);
        self.link.write(&packet).await
    }

    /// Copy a compiled program into the hub's user RAM
    pub async fn load_program(&self, program: &[u8]) -> Result<(), HubError> {
        if let Some(max) = self.capabilities.max_program_size {
            if program.len() > max as usize {
                return Err(HubError::ProgramTooLarge {
                    size: program.len(),
                    max,
                });
            }
        }

        let chunks = protocol::program_chunks(program, self.capabilities.max_write_size)?;
        info!(
            "Uploading {} byte program in {} chunks",
            program.len(),
            chunks.len()
        );

        // Invalidate the stored program while RAM is being rewritten
        self.write(HubCommand::WriteUserProgramMeta { size: 0 })
            .await?;
        for chunk in chunks {
            self.write(chunk).await?;
        }
        self.write(HubCommand::WriteUserProgramMeta {
            size: program.len() as u32,
        })
        .await?;

        debug!("Program upload complete");
        Ok(())
    }

    pub async fn start_program(&self) -> Result<(), HubError> {
        self.write(HubCommand::StartUserProgram).await
    }

    pub async fn start_repl(&self) -> Result<(), HubError> {
        self.write(HubCommand::StartRepl).await
    }

    /// Paste source code into a running REPL and execute it
    pub async fn run_source(&self, source: &str) -> Result<(), HubError> {
        let chunks =
            protocol::stdin_chunks(&protocol::paste_mode(source), self.capabilities.max_write_size)?;
        info!("Pasting {} bytes of source in {} writes", source.len(), chunks.len());

        for chunk in chunks {
            self.write(chunk).await?;
        }
        Ok(())
    }

    pub async fn stop_program(&self) -> Result<(), HubError> {
        self.write(HubCommand::StopUserProgram).await
    }

    /// Send a drive command to the gateway program's stdin
    pub async fn send(&self, command: DriveCommand) -> Result<(), HubError> {
        self.write(HubCommand::WriteStdin(vec![command.as_byte()]))
            .await
    }

    /// Wait for the next status report; false if none arrived in time
    pub async fn wait_for_status(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.status.changed()).await,
            Ok(Ok(()))
        )
    }

    /// Wait until the hub reports the user program in the given state
    pub async fn wait_for_program(
        &mut self,
        running: bool,
        timeout: Duration,
    ) -> Result<(), HubError> {
        let wait = self
            .status
            .wait_for(|status| status.program_running() == running);

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(HubError::Disconnected),
            Err(_) => Err(HubError::Timeout(if running {
                "program start"
            } else {
                "program stop"
            })),
        }
    }

    /// Ask the gateway program to exit, forcing a stop if it does not
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), HubError> {
        if !self.status().program_running() {
            return Ok(());
        }

        self.send(DriveCommand::Exit).await?;
        if let Err(e) = self.wait_for_program(false, grace).await {
            warn!("Gateway did not exit on request ({}), stopping program", e);
            self.stop_program().await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockLink;
    use super::*;
    use crate::infrastructure::bluetooth::protocol::DEFAULT_MAX_WRITE_SIZE;
    use std::sync::Arc;

    fn running() -> HubStatus {
        HubStatus(HubStatus::USER_PROGRAM_RUNNING)
    }

    fn session(link: MockLink, capabilities: HubCapabilities) -> HubSession<MockLink> {
        let (_tx, rx) = watch::channel(HubStatus::default());
        HubSession::new(link, capabilities, rx)
    }

    #[tokio::test]
    async fn test_send_writes_stdin() {
        let link = MockLink::new();
        let session = session(link.clone(), HubCapabilities::default());

        session.send(DriveCommand::Forward).await.unwrap();
        session.send(DriveCommand::Stop).await.unwrap();

        assert_eq!(link.packets(), vec![vec![0x06, b'F'], vec![0x06, b'S']]);
    }

    #[tokio::test]
    async fn test_load_program_sequence() {
        let link = MockLink::new();
        let session = session(
            link.clone(),
            HubCapabilities {
                max_write_size: 9,
                feature_flags: 0,
                max_program_size: Some(100),
            },
        );

        session.load_program(&[1, 2, 3, 4, 5, 6]).await.unwrap();

        assert_eq!(
            link.packets(),
            vec![
                vec![0x03, 0, 0, 0, 0],
                vec![0x04, 0, 0, 0, 0, 1, 2, 3, 4],
                vec![0x04, 4, 0, 0, 0, 5, 6],
                vec![0x03, 6, 0, 0, 0],
            ]
        );
    }

    #[tokio::test]
    async fn test_run_source_pastes_into_repl() {
        let link = MockLink::new();
        let session = session(link.clone(), HubCapabilities::default());
        let source = "print('GATEWAY READY')\nwhile True:\n    pass\n";

        session.start_repl().await.unwrap();
        session.run_source(source).await.unwrap();

        let packets = link.packets();
        assert_eq!(packets[0], vec![0x02]);

        let mut stdin = Vec::new();
        for packet in &packets[1..] {
            assert!(packet.len() <= DEFAULT_MAX_WRITE_SIZE);
            assert_eq!(packet[0], 0x06);
            stdin.extend_from_slice(&packet[1..]);
        }
        assert_eq!(stdin.first(), Some(&0x05));
        assert_eq!(stdin.last(), Some(&0x04));
        assert_eq!(&stdin[1..stdin.len() - 1], source.as_bytes());
    }

    #[tokio::test]
    async fn test_oversized_program_is_rejected_before_writing() {
        let link = MockLink::new();
        let session = session(
            link.clone(),
            HubCapabilities {
                max_program_size: Some(4),
                ..HubCapabilities::default()
            },
        );

        let result = session.load_program(&[0; 5]).await;
        assert!(matches!(
            result,
            Err(HubError::ProgramTooLarge { size: 5, max: 4 })
        ));
        assert!(link.packets().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let link = MockLink::failing_after(2);
        let session = session(link.clone(), HubCapabilities::default());

        let result = session.load_program(&[0; 40]).await;
        assert!(matches!(result, Err(HubError::Disconnected)));
        assert_eq!(link.packets().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_program_start() {
        let (tx, rx) = watch::channel(HubStatus::default());
        let mut session = HubSession::new(MockLink::new(), HubCapabilities::default(), rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send_replace(running());
            // Keep the sender alive until the waiter has seen the update
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        session
            .wait_for_program(true, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(session.status().program_running());
    }

    #[tokio::test]
    async fn test_wait_for_program_timeout() {
        let (_tx, rx) = watch::channel(HubStatus::default());
        let mut session = HubSession::new(MockLink::new(), HubCapabilities::default(), rx);

        let result = session
            .wait_for_program(true, Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(HubError::Timeout("program start"))));
    }

    #[tokio::test]
    async fn test_wait_after_disconnect() {
        let (tx, rx) = watch::channel(HubStatus::default());
        let mut session = HubSession::new(MockLink::new(), HubCapabilities::default(), rx);
        drop(tx);

        let result = session
            .wait_for_program(true, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(HubError::Disconnected)));
    }

    #[tokio::test]
    async fn test_wait_for_status() {
        let (tx, rx) = watch::channel(HubStatus::default());
        let mut session = HubSession::new(MockLink::new(), HubCapabilities::default(), rx);

        assert!(!session.wait_for_status(Duration::from_millis(20)).await);
        tx.send_replace(running());
        assert!(session.wait_for_status(Duration::from_millis(20)).await);
        assert!(session.status().program_running());
    }

    #[tokio::test]
    async fn test_shutdown_with_cooperative_gateway() {
        let tx = Arc::new(watch::channel(running()).0);
        let rx = tx.subscribe();
        let link = MockLink::with_gateway(tx.clone());
        let mut session = HubSession::new(link.clone(), HubCapabilities::default(), rx);

        session.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(link.packets(), vec![vec![0x06, b'X']]);
    }

    #[tokio::test]
    async fn test_shutdown_forces_stop() {
        let (tx, rx) = watch::channel(running());
        let link = MockLink::new();
        let mut session = HubSession::new(link.clone(), HubCapabilities::default(), rx);

        session.shutdown(Duration::from_millis(30)).await.unwrap();

        assert_eq!(link.packets(), vec![vec![0x06, b'X'], vec![0x00]]);
        drop(tx);
    }

    #[tokio::test]
    async fn test_shutdown_without_program_is_noop() {
        let link = MockLink::new();
        let mut session = session(link.clone(), HubCapabilities::default());

        session.shutdown(Duration::from_millis(30)).await.unwrap();
        assert!(link.packets().is_empty());
    }
}
