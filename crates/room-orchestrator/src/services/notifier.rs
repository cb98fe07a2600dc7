//! Notification fanout seam.
//!
//! Template rendering and delivery belong to the notification subsystem;
//! this core only decides *who* gets told *what*. The sender is an injected
//! dependency rather than a process-wide handle so tests can observe fanout
//! without a delivery backend.

use crate::errors::RoomError;
use uuid::Uuid;

/// Which variant of the session-started message a recipient gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeAudience {
    /// The instructor hosting the session.
    Host,
    /// A registered learner.
    Attendee,
}

/// A session-started notification addressed to one recipient.
#[derive(Debug, Clone)]
pub struct SessionStartedNotice {
    pub session_id: Uuid,
    pub session_name: String,
    pub recipient_user_id: Uuid,
    pub recipient_email: String,
    pub audience: NoticeAudience,
}

/// Trait for notification delivery (enables test doubles).
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one session-started notice.
    async fn session_started(&self, notice: &SessionStartedNotice) -> Result<(), RoomError>;
}

/// Default sender that hands notices to the logging pipeline.
///
/// The notification subsystem tails these structured events; swapping in a
/// direct queue producer only requires another `NotificationSender` impl.
pub struct TracingNotifier;

#[async_trait::async_trait]
impl NotificationSender for TracingNotifier {
    async fn session_started(&self, notice: &SessionStartedNotice) -> Result<(), RoomError> {
        tracing::info!(
            target: "room.notifications",
            session_id = %notice.session_id,
            recipient = %notice.recipient_user_id,
            audience = ?notice.audience,
            "session started notice"
        );
        Ok(())
    }
}

/// Mock notifier module for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Sender that records every notice instead of delivering it.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<SessionStartedNotice>>,
    }

    impl RecordingNotifier {
        /// Create an empty recorder.
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of notices recorded so far.
        #[allow(clippy::unwrap_used)]
        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        /// Snapshot of the recorded notices.
        #[allow(clippy::unwrap_used)]
        pub fn sent(&self) -> Vec<SessionStartedNotice> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl NotificationSender for RecordingNotifier {
        async fn session_started(&self, notice: &SessionStartedNotice) -> Result<(), RoomError> {
            #[allow(clippy::unwrap_used)]
            self.sent.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

}
