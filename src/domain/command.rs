//! Drive Commands
//!
//! One-byte commands understood by the gateway program running on the hub.
//! Each command is written to the program's stdin.

/// A single instruction for the hub gateway program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveCommand {
    /// Run the drive motors forward
    Forward,
    /// Run the drive motors backward
    Backward,
    /// Turn the steering motor left
    SteerLeft,
    /// Turn the steering motor right
    SteerRight,
    /// Return the steering motor to center
    Center,
    /// Run the drive motors forward at maximum speed
    Turbo,
    /// Stop the drive motors
    Stop,
    /// Stop every motor and end the gateway program
    Exit,
}

impl DriveCommand {
    pub const ALL: [DriveCommand; 8] = [
        Self::Forward,
        Self::Backward,
        Self::SteerLeft,
        Self::SteerRight,
        Self::Center,
        Self::Turbo,
        Self::Stop,
        Self::Exit,
    ];

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Forward => b'F',
            Self::Backward => b'B',
            Self::SteerLeft => b'L',
            Self::SteerRight => b'R',
            Self::Center => b'C',
            Self::Turbo => b'T',
            Self::Stop => b'S',
            Self::Exit => b'X',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.as_byte() == byte)
    }

    /// Commands that drive the traction motors
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Forward | Self::Backward | Self::Turbo)
    }

    /// Text shown in the console when the command is sent
    pub fn description(&self) -> &'static str {
        match self {
            Self::Forward => "▲ Forward",
            Self::Backward => "▼ Reverse",
            Self::SteerLeft => "◀ Steer left",
            Self::SteerRight => "▶ Steer right",
            Self::Center => "● Steering centered",
            Self::Turbo => "TURBO!",
            Self::Stop => "Stopping motors",
            Self::Exit => "Disconnecting",
        }
    }
}

impl std::fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_command_bytes() {
        assert_eq!(DriveCommand::Forward.as_byte(), b'F');
        assert_eq!(DriveCommand::Turbo.as_byte(), b'T');
        assert_eq!(DriveCommand::Exit.as_byte(), b'X');
        assert_eq!(DriveCommand::from_byte(b'S'), Some(DriveCommand::Stop));
        assert_eq!(DriveCommand::from_byte(b'Q'), None);
        assert_eq!(DriveCommand::from_byte(b'f'), None);
    }

    #[test]
    fn test_bytes_are_unique() {
        let bytes: HashSet<u8> = DriveCommand::ALL.iter().map(|c| c.as_byte()).collect();
        assert_eq!(bytes.len(), DriveCommand::ALL.len());
    }

    #[test]
    fn test_throttle_commands() {
        assert!(DriveCommand::Forward.is_throttle());
        assert!(DriveCommand::Turbo.is_throttle());
        assert!(!DriveCommand::SteerLeft.is_throttle());
        assert!(!DriveCommand::Stop.is_throttle());
    }
}
