use log::{error, info, warn};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A message meant for the person walking the tour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Bounded history of user-facing notifications. Every entry is also written
/// to the log at the matching level.
#[derive(Debug)]
pub struct Notifier {
    entries: VecDeque<Notification>,
    capacity: usize,
}

impl Notifier {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(NotificationLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(NotificationLevel::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(NotificationLevel::Error, message.into());
    }

    fn push(&mut self, level: NotificationLevel, message: String) {
        match level {
            NotificationLevel::Info => info!("{}", message),
            NotificationLevel::Warning => warn!("{}", message),
            NotificationLevel::Error => error!("{}", message),
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Notification { level, message });
    }

    pub fn recent(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.entries.back()
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::with_capacity(32)
    }
}
