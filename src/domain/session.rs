//! Session memory types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::llm::ChatRole;

/// One remembered conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl SessionMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Retention bounds for conversation sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// FIFO cap on stored messages per session.
    pub max_messages: usize,
    /// Sessions idle longer than this are evicted on the next write.
    pub ttl_seconds: u64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_messages: 24,
            ttl_seconds: 120 * 60,
        }
    }
}
