//! Core data types for Retooter

use serde::Serialize;

/// Status IDs are numeric and sort in creation order
pub type StatusId = u64;

/// A notification mentioning the configured account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub notification_id: String,
    /// `None` when the mentioning post was deleted or is unavailable
    pub status: Option<MentionedStatus>,
}

/// The post that mentioned the configured account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionedStatus {
    pub id: StatusId,
    /// Author handle as the instance reports it (`user` or `user@domain`)
    pub acct: String,
}

impl Mention {
    pub fn new(notification_id: impl Into<String>, status: Option<MentionedStatus>) -> Self {
        Self {
            notification_id: notification_id.into(),
            status,
        }
    }

    /// Shorthand for a mention with a status, used heavily in tests
    pub fn of(id: StatusId, acct: &str) -> Self {
        Self::new(
            format!("n{}", id),
            Some(MentionedStatus {
                id,
                acct: acct.to_string(),
            }),
        )
    }

    pub fn status_id(&self) -> Option<StatusId> {
        self.status.as_ref().map(|status| status.id)
    }
}

/// Newly registered application
#[derive(Debug, Clone)]
pub struct AppRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}
