//! # Notifications
//!
//! Every mutating command ends in exactly one [`Notification`]: a success
//! toast, or the error the operator needs to see. The shell does not care
//! how they are shown; it hands them to a [`Notifier`].
//!
//! ```text
//!   command ──► report() ──┬── Ok  ──► Notification::success("Ticket parked")
//!                          └── Err ──► Notification::error("Insufficient stock …")
//!                                           │
//!                                           ▼
//!                         LogNotifier (tracing)  │  RecordingNotifier (tests)
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    /// Short action label, e.g. "Checkout".
    pub title: String,
    pub message: String,
    /// Present for error notifications.
    pub code: Option<ErrorCode>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn build(level: NotificationLevel, title: &str, message: String, code: Option<ErrorCode>) -> Self {
        Notification {
            id: Uuid::new_v4().to_string(),
            level,
            title: title.to_string(),
            message,
            code,
            created_at: Utc::now(),
        }
    }

    pub fn success(title: &str, message: impl Into<String>) -> Self {
        Self::build(NotificationLevel::Success, title, message.into(), None)
    }

    pub fn info(title: &str, message: impl Into<String>) -> Self {
        Self::build(NotificationLevel::Info, title, message.into(), None)
    }

    /// Error notification. Recoverable errors (offline, still starting)
    /// are shown as warnings.
    pub fn error(title: &str, err: &ApiError) -> Self {
        let level = if err.is_recoverable() {
            NotificationLevel::Warning
        } else {
            NotificationLevel::Error
        };
        Self::build(level, title, err.message.clone(), Some(err.code))
    }
}

/// Sink for operator notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Used by the headless register.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(title = %n.title, "{}", n.message)
            }
            NotificationLevel::Warning => tracing::warn!(title = %n.title, "{}", n.message),
            NotificationLevel::Error => {
                tracing::error!(title = %n.title, code = ?n.code, "{}", n.message)
            }
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn all(&self) -> Vec<Notification> {
        self.seen().clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.seen().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.seen().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen().is_empty()
    }

    /// Drains what has been recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_error_is_a_warning() {
        let err = ApiError::new(ErrorCode::Offline, "remote down");
        let n = Notification::error("Sync", &err);
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.code, Some(ErrorCode::Offline));
    }

    #[test]
    fn test_recording_notifier_take_drains() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::success("Park", "Ticket parked"));
        notifier.notify(Notification::info("Sync", "Up to date"));

        assert_eq!(notifier.len(), 2);
        let taken = notifier.take();
        assert_eq!(taken[0].title, "Park");
        assert!(notifier.is_empty());
    }
}
