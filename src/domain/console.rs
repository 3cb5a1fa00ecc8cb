use crate::domain::models::{MessageSeverity, StatusMessage};
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 500;

/// Bounded history of messages shown in the console panel
#[derive(Debug)]
pub struct ConsoleLog {
    lines: VecDeque<StatusMessage>,
    capacity: usize,
}

impl ConsoleLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: StatusMessage) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(StatusMessage::new(message, MessageSeverity::Info));
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn last(&self) -> Option<&StatusMessage> {
        self.lines.back()
    }

    /// Lines as displayed, oldest first
    pub fn rendered(&self) -> impl Iterator<Item = (String, MessageSeverity)> + '_ {
        self.lines
            .iter()
            .map(|line| (format!("> {}", line.message), line.severity))
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = ConsoleLog::new(3);
        for i in 0..5 {
            log.info(format!("line {}", i));
        }
        assert_eq!(log.len(), 3);
        let lines: Vec<String> = log.rendered().map(|(text, _)| text).collect();
        assert_eq!(lines, vec!["> line 2", "> line 3", "> line 4"]);
    }

    #[test]
    fn test_severity_is_kept() {
        let mut log = ConsoleLog::default();
        log.push(StatusMessage::new("boom", MessageSeverity::Error));
        assert_eq!(log.last().map(|m| m.severity), Some(MessageSeverity::Error));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_one_line() {
        let mut log = ConsoleLog::new(0);
        log.info("a");
        log.info("b");
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().map(|m| m.message.as_str()), Some("b"));
    }
}
