use crate::infrastructure::bluetooth::protocol::ProtocolError;
use thiserror::Error;

/// Failures while talking to a connected hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("{0} not found on hub")]
    MissingCharacteristic(&'static str),
    #[error("program is {size} bytes but the hub accepts at most {max}")]
    ProgramTooLarge { size: usize, max: u32 },
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("hub disconnected")]
    Disconnected,
}

impl HubError {
    /// Whether the link to the hub is gone and the session should be dropped
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected => true,
            Self::Ble(btleplug::Error::NotConnected) => true,
            Self::Ble(btleplug::Error::DeviceNotFound) => true,
            Self::Ble(e) => e.to_string().to_lowercase().contains("disconnected"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_detection() {
        assert!(HubError::Disconnected.is_disconnect());
        assert!(HubError::Ble(btleplug::Error::NotConnected).is_disconnect());
        assert!(!HubError::Timeout("program start").is_disconnect());
        assert!(!HubError::ProgramTooLarge { size: 10, max: 5 }.is_disconnect());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            HubError::MissingCharacteristic("Pybricks command characteristic").to_string(),
            "Pybricks command characteristic not found on hub"
        );
        assert_eq!(
            HubError::Timeout("program start").to_string(),
            "timed out waiting for program start"
        );
    }
}
