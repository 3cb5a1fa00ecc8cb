//! Control Pad
//!
//! Turns keyboard and on-screen button edges into drive commands.
//!
//! Throttle inputs (forward, backward, turbo) are momentary: the motors run
//! while the input is held and stop on release. If another throttle input is
//! still held when one is released, its command is sent again instead of a
//! stop. Steering inputs only act on press.

use crate::domain::command::DriveCommand;

/// Keyboard keys with a driving function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKey {
    Up,
    Down,
    Left,
    Right,
    /// Enter
    Turbo,
    /// Space
    Brake,
}

impl ControlKey {
    /// The on-screen button lit while this key is held
    pub fn button(&self) -> ControlButton {
        match self {
            Self::Up => ControlButton::Forward,
            Self::Down => ControlButton::Backward,
            Self::Left => ControlButton::SteerLeft,
            Self::Right => ControlButton::SteerRight,
            Self::Turbo => ControlButton::Turbo,
            Self::Brake => ControlButton::Center,
        }
    }
}

/// On-screen control buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlButton {
    Forward,
    Backward,
    SteerLeft,
    SteerRight,
    Center,
    Turbo,
}

impl ControlButton {
    pub fn command(&self) -> DriveCommand {
        match self {
            Self::Forward => DriveCommand::Forward,
            Self::Backward => DriveCommand::Backward,
            Self::SteerLeft => DriveCommand::SteerLeft,
            Self::SteerRight => DriveCommand::SteerRight,
            Self::Center => DriveCommand::Center,
            Self::Turbo => DriveCommand::Turbo,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Forward => "▲ FORWARD",
            Self::Backward => "▼ REVERSE",
            Self::SteerLeft => "◀ LEFT",
            Self::SteerRight => "RIGHT ▶",
            Self::Center => "● CENTER",
            Self::Turbo => "TURBO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Key(ControlKey),
    Pointer(ControlButton),
}

#[derive(Debug, Clone, Copy)]
struct HeldInput {
    source: Source,
    button: ControlButton,
}

#[derive(Debug, Default)]
pub struct ControlPad {
    /// Held inputs in press order
    held: Vec<HeldInput>,
}

impl ControlPad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: ControlKey) -> Vec<DriveCommand> {
        if !self.press(Source::Key(key), key.button()) {
            return Vec::new();
        }

        match key {
            ControlKey::Brake => vec![DriveCommand::Stop, DriveCommand::Center],
            _ => vec![key.button().command()],
        }
    }

    pub fn key_up(&mut self, key: ControlKey) -> Vec<DriveCommand> {
        match self.release(Source::Key(key)) {
            Some(button) => self.after_release(button),
            None => Vec::new(),
        }
    }

    /// Update the held state of an on-screen button
    pub fn pointer(&mut self, button: ControlButton, held: bool) -> Vec<DriveCommand> {
        let source = Source::Pointer(button);
        if held {
            if self.press(source, button) {
                vec![button.command()]
            } else {
                Vec::new()
            }
        } else {
            match self.release(source) {
                Some(button) => self.after_release(button),
                None => Vec::new(),
            }
        }
    }

    /// Drop every held input, stopping the motors if any throttle was held
    pub fn release_all(&mut self) -> Vec<DriveCommand> {
        let had_throttle = self.held.iter().any(|h| h.button.command().is_throttle());
        self.held.clear();
        if had_throttle {
            vec![DriveCommand::Stop]
        } else {
            Vec::new()
        }
    }

    pub fn is_active(&self, button: ControlButton) -> bool {
        self.held.iter().any(|h| h.button == button)
    }

    /// Returns false if the source was already held (auto-repeat)
    fn press(&mut self, source: Source, button: ControlButton) -> bool {
        if self.held.iter().any(|h| h.source == source) {
            return false;
        }
        self.held.push(HeldInput { source, button });
        true
    }

    fn release(&mut self, source: Source) -> Option<ControlButton> {
        let index = self.held.iter().position(|h| h.source == source)?;
        Some(self.held.remove(index).button)
    }

    fn after_release(&self, button: ControlButton) -> Vec<DriveCommand> {
        if !button.command().is_throttle() {
            return Vec::new();
        }

        match self
            .held
            .iter()
            .rev()
            .find(|h| h.button.command().is_throttle())
        {
            Some(still_held) => vec![still_held.button.command()],
            None => vec![DriveCommand::Stop],
        }
    }
}
