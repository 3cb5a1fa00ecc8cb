//! Pybricks BLE Protocol
//!
//! Packet definitions for talking to a hub running Pybricks firmware.
//! Every command is written to the command/event characteristic, and the hub
//! answers with notifications on the same characteristic.

use crate::domain::models::HubStatus;
use thiserror::Error;
use uuid::Uuid;

/// Pybricks service, advertised by hubs running Pybricks firmware
pub const PYBRICKS_SERVICE_UUID: Uuid = Uuid::from_u128(0xc5f50001_8280_46da_89f4_6d8051e4aeef);

/// Command/event characteristic (write + notify)
pub const COMMAND_EVENT_UUID: Uuid = Uuid::from_u128(0xc5f50002_8280_46da_89f4_6d8051e4aeef);

/// Hub capabilities characteristic (read)
pub const HUB_CAPABILITIES_UUID: Uuid = Uuid::from_u128(0xc5f50003_8280_46da_89f4_6d8051e4aeef);

/// Standard Device Information service (0x180A)
pub const DEVICE_INFO_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);

/// Firmware Revision String (0x2A26)
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);

/// Software Revision String (0x2A28), carries the Pybricks protocol version
pub const SOFTWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x00002a28_0000_1000_8000_00805f9b34fb);

/// Write size assumed when the hub does not report its capabilities
/// (default ATT MTU of 23 minus the 3 byte header)
pub const DEFAULT_MAX_WRITE_SIZE: usize = 20;

/// Command byte + u32 offset
pub const RAM_WRITE_HEADER_LEN: usize = 5;

mod command_id {
    pub const STOP_USER_PROGRAM: u8 = 0x00;
    pub const START_USER_PROGRAM: u8 = 0x01;
    pub const LEGACY_START_REPL: u8 = 0x02;
    pub const WRITE_USER_PROGRAM_META: u8 = 0x03;
    pub const WRITE_USER_RAM: u8 = 0x04;
    pub const WRITE_STDIN: u8 = 0x06;
}

mod event_id {
    pub const STATUS_REPORT: u8 = 0x00;
    pub const WRITE_STDOUT: u8 = 0x01;
    pub const WRITE_APP_DATA: u8 = 0x02;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("unknown event type {0:#04X}")]
    UnknownEvent(u8),
    #[error("{what} too short: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("max write size {0} leaves no room for data")]
    WriteSizeTooSmall(usize),
}

/// Commands sent to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand {
    StopUserProgram,
    StartUserProgram,
    /// Start the interactive prompt (accepted by every protocol revision)
    StartRepl,
    /// Size of the program stored in user RAM; 0 invalidates it
    WriteUserProgramMeta { size: u32 },
    WriteUserRam { offset: u32, data: Vec<u8> },
    WriteStdin(Vec<u8>),
}

impl HubCommand {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::StopUserProgram => vec![command_id::STOP_USER_PROGRAM],
            Self::StartUserProgram => vec![command_id::START_USER_PROGRAM],
            Self::StartRepl => vec![command_id::LEGACY_START_REPL],
            Self::WriteUserProgramMeta { size } => {
                let mut packet = vec![command_id::WRITE_USER_PROGRAM_META];
                packet.extend_from_slice(&size.to_le_bytes());
                packet
            }
            Self::WriteUserRam { offset, data } => {
                let mut packet = Vec::with_capacity(RAM_WRITE_HEADER_LEN + data.len());
                packet.push(command_id::WRITE_USER_RAM);
                packet.extend_from_slice(&offset.to_le_bytes());
                packet.extend_from_slice(data);
                packet
            }
            Self::WriteStdin(data) => {
                let mut packet = Vec::with_capacity(1 + data.len());
                packet.push(command_id::WRITE_STDIN);
                packet.extend_from_slice(data);
                packet
            }
        }
    }
}

/// Notifications received from the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Status(HubStatus),
    Stdout(Vec<u8>),
    AppData(Vec<u8>),
}

/// Parse a notification from the command/event characteristic
///
/// # Event Layout
///
/// ```text
/// [0]     : Event type
/// Status report:  [1-4] flags (u32 little-endian), newer firmware appends
///                 the running program id and slot
/// Stdout/AppData: [1..] payload
/// ```
pub fn parse_event(bytes: &[u8]) -> Result<HubEvent, ProtocolError> {
    let (&kind, payload) = bytes.split_first().ok_or(ProtocolError::Empty)?;

    match kind {
        event_id::STATUS_REPORT => {
            if payload.len() < 4 {
                return Err(ProtocolError::Truncated {
                    what: "status report",
                    expected: 5,
                    actual: bytes.len(),
                });
            }
            let flags = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Ok(HubEvent::Status(HubStatus(flags)))
        }
        event_id::WRITE_STDOUT => Ok(HubEvent::Stdout(payload.to_vec())),
        event_id::WRITE_APP_DATA => Ok(HubEvent::AppData(payload.to_vec())),
        other => Err(ProtocolError::UnknownEvent(other)),
    }
}

/// Contents of the hub capabilities characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubCapabilities {
    pub max_write_size: usize,
    pub feature_flags: u32,
    pub max_program_size: Option<u32>,
}

impl Default for HubCapabilities {
    fn default() -> Self {
        Self {
            max_write_size: DEFAULT_MAX_WRITE_SIZE,
            feature_flags: 0,
            max_program_size: None,
        }
    }
}

impl HubCapabilities {
    pub const FLAG_HAS_REPL: u32 = 1 << 0;

    pub fn has_repl(&self) -> bool {
        self.feature_flags & Self::FLAG_HAS_REPL != 0
    }

    /// ```text
    /// [0-1]  : Max write size (u16 little-endian)
    /// [2-5]  : Feature flags (u32 little-endian)
    /// [6-9]  : Max user program size (u32 little-endian)
    /// [10]   : Number of program slots (newer firmware only)
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 10 {
            return Err(ProtocolError::Truncated {
                what: "hub capabilities",
                expected: 10,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            max_write_size: u16::from_le_bytes([bytes[0], bytes[1]]) as usize,
            feature_flags: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            max_program_size: Some(u32::from_le_bytes([
                bytes[6], bytes[7], bytes[8], bytes[9],
            ])),
        })
    }
}

/// Split a program into user RAM writes that each fit in one BLE write
pub fn program_chunks(
    program: &[u8],
    max_write_size: usize,
) -> Result<Vec<HubCommand>, ProtocolError> {
    if max_write_size <= RAM_WRITE_HEADER_LEN {
        return Err(ProtocolError::WriteSizeTooSmall(max_write_size));
    }

    let chunk_size = max_write_size - RAM_WRITE_HEADER_LEN;
    Ok(program
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| HubCommand::WriteUserRam {
            offset: (i * chunk_size) as u32,
            data: chunk.to_vec(),
        })
        .collect())
}

/// Split stdin data into writes that each fit in one BLE write
pub fn stdin_chunks(data: &[u8], max_write_size: usize) -> Result<Vec<HubCommand>, ProtocolError> {
    if max_write_size <= 1 {
        return Err(ProtocolError::WriteSizeTooSmall(max_write_size));
    }

    Ok(data
        .chunks(max_write_size - 1)
        .map(|chunk| HubCommand::WriteStdin(chunk.to_vec()))
        .collect())
}

/// Wrap source code in a REPL paste-mode block (Ctrl-E ... Ctrl-D)
pub fn paste_mode(source: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(source.len() + 2);
    data.push(0x05);
    data.extend_from_slice(source.as_bytes());
    data.push(0x04);
    data
}

/// Longest partial line kept before it is emitted anyway
const MAX_PENDING_LINE: usize = 1024;

/// Reassembles hub stdout, which arrives in arbitrary fragments, into lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                lines.push(self.take_line());
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_PENDING_LINE {
                    lines.push(self.take_line());
                }
            }
        }

        lines
    }

    /// Return whatever partial line is left
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches('\r')
            .to_string();
        self.pending.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids() {
        assert_eq!(
            PYBRICKS_SERVICE_UUID.to_string(),
            "c5f50001-8280-46da-89f4-6d8051e4aeef"
        );
        assert_eq!(
            DEVICE_INFO_SERVICE_UUID.to_string(),
            "0000180a-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(HubCommand::StopUserProgram.encode(), vec![0x00]);
        assert_eq!(HubCommand::StartUserProgram.encode(), vec![0x01]);
        assert_eq!(HubCommand::StartRepl.encode(), vec![0x02]);
        assert_eq!(
            HubCommand::WriteUserProgramMeta { size: 0x0102 }.encode(),
            vec![0x03, 0x02, 0x01, 0x00, 0x00]
        );
        assert_eq!(
            HubCommand::WriteUserRam {
                offset: 15,
                data: vec![0xAA, 0xBB]
            }
            .encode(),
            vec![0x04, 15, 0, 0, 0, 0xAA, 0xBB]
        );
        assert_eq!(HubCommand::WriteStdin(b"F".to_vec()).encode(), vec![0x06, b'F']);
    }

    #[test]
    fn test_parse_status_report() {
        let event = parse_event(&[0x00, 0x40, 0x00, 0x00, 0x00]).unwrap();
        match event {
            HubEvent::Status(status) => assert!(status.program_running()),
            other => panic!("unexpected event {:?}", other),
        }

        // Newer firmware appends program id and slot
        let event = parse_event(&[0x00, 0x08, 0x00, 0x00, 0x00, 0x80, 0x00]).unwrap();
        assert_eq!(event, HubEvent::Status(HubStatus(HubStatus::BLE_ADVERTISING)));
    }

    #[test]
    fn test_parse_invalid_events() {
        assert_eq!(parse_event(&[]), Err(ProtocolError::Empty));
        assert_eq!(parse_event(&[0x09, 0x00]), Err(ProtocolError::UnknownEvent(0x09)));
        assert!(matches!(
            parse_event(&[0x00, 0x40]),
            Err(ProtocolError::Truncated { actual: 2, .. })
        ));
    }

    #[test]
    fn test_parse_stdout() {
        assert_eq!(
            parse_event(b"\x01hello").unwrap(),
            HubEvent::Stdout(b"hello".to_vec())
        );
        assert_eq!(parse_event(&[0x02, 7]).unwrap(), HubEvent::AppData(vec![7]));
    }

    #[test]
    fn test_parse_capabilities() {
        let caps =
            HubCapabilities::parse(&[0x9E, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00])
                .unwrap();
        assert_eq!(caps.max_write_size, 158);
        assert_eq!(caps.feature_flags, 1);
        assert!(caps.has_repl());
        assert!(!HubCapabilities::default().has_repl());
        assert_eq!(caps.max_program_size, Some(65536));

        assert!(HubCapabilities::parse(&[0x14, 0x00]).is_err());
    }

    #[test]
    fn test_program_chunks_fit_write_size() {
        let program: Vec<u8> = (0..=255).collect();
        let chunks = program_chunks(&program, 20).unwrap();

        let mut rebuilt = Vec::new();
        for chunk in &chunks {
            assert!(chunk.encode().len() <= 20);
            if let HubCommand::WriteUserRam { offset, data } = chunk {
                assert_eq!(*offset as usize, rebuilt.len());
                rebuilt.extend_from_slice(data);
            }
        }
        assert_eq!(rebuilt, program);
        assert_eq!(chunks.len(), 256_usize.div_ceil(15));
    }

    #[test]
    fn test_program_chunks_rejects_tiny_writes() {
        assert_eq!(
            program_chunks(&[1, 2, 3], 5),
            Err(ProtocolError::WriteSizeTooSmall(5))
        );
        assert!(program_chunks(&[], 20).unwrap().is_empty());
    }

    #[test]
    fn test_stdin_chunks_fit_write_size() {
        let data = paste_mode("print('hi')\n");
        assert_eq!(data.first(), Some(&0x05));
        assert_eq!(data.last(), Some(&0x04));

        let chunks = stdin_chunks(&data, 6).unwrap();
        let mut rebuilt = Vec::new();
        for chunk in &chunks {
            let packet = chunk.encode();
            assert!(packet.len() <= 6);
            assert_eq!(packet[0], 0x06);
            rebuilt.extend_from_slice(&packet[1..]);
        }
        assert_eq!(rebuilt, data);
        assert_eq!(stdin_chunks(b"F", 1), Err(ProtocolError::WriteSizeTooSmall(1)));
    }

    #[test]
    fn test_line_buffer_across_packets() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"Trace").is_empty());
        assert_eq!(buffer.push(b"back\r\nErr"), vec!["Traceback".to_string()]);
        assert_eq!(buffer.push(b"or\n\n"), vec!["Error".to_string(), String::new()]);
        assert_eq!(buffer.flush(), None);
        buffer.push(b"partial");
        assert_eq!(buffer.flush(), Some("partial".to_string()));
    }

    #[test]
    fn test_line_buffer_caps_long_lines() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(&vec![b'a'; MAX_PENDING_LINE + 10]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_PENDING_LINE);
        assert_eq!(buffer.flush().map(|l| l.len()), Some(10));
    }
}
