//! Bounded per-session security event log
//!
//! Events carry only identifier prefixes, never full tokens. Free-form
//! detail is kept only while the session's debug flag is on and is capped at
//! 100 characters either way.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::domain::session::Session;

/// Ring capacity per session; the oldest event is evicted first.
pub const SECURITY_LOG_CAPACITY: usize = 100;

/// Longest retained detail string, in code points.
const MAX_DETAIL_LENGTH: usize = 100;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[display("info")]
    Info,
    #[display("warning")]
    Warning,
    #[display("error")]
    Error,
}

/// Categories of recorded security events
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[display("xss_attempt")]
    XssAttempt,
    #[display("sql_injection_attempt")]
    SqlInjectionAttempt,
    #[display("rate_limit_exceeded")]
    RateLimitExceeded,
    #[display("api_timeout")]
    ApiTimeout,
    #[display("api_connection_error")]
    ApiConnectionError,
    #[display("api_http_error")]
    ApiHttpError,
    #[display("api_decode_error")]
    ApiDecodeError,
    #[display("unexpected_error")]
    UnexpectedError,
    #[display("session_expired")]
    SessionExpired,
    #[display("session_cleared")]
    SessionCleared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub severity: Severity,
    pub session_id_prefix: String,
    pub user_id_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate view of a session's security log for the host debug panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecuritySummary {
    pub total: usize,
    pub last_hour: usize,
    pub by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityLog {
    events: VecDeque<SecurityEvent>,
}

impl SecurityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        kind: EventKind,
        severity: Severity,
        session: &Session,
        detail: Option<String>,
        retain_detail: bool,
    ) {
        let detail = if retain_detail {
            detail.map(|d| d.chars().take(MAX_DETAIL_LENGTH).collect())
        } else {
            None
        };
        self.events.push_back(SecurityEvent {
            timestamp: Utc::now(),
            kind,
            severity,
            session_id_prefix: session.id_prefix(),
            user_id_prefix: session.user_id_prefix(),
            detail,
        });
        while self.events.len() > SECURITY_LOG_CAPACITY {
            self.events.pop_front();
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &SecurityEvent> {
        self.events.iter()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SecuritySummary {
        let hour_ago = now - Duration::hours(1);
        let mut by_kind = BTreeMap::new();
        let mut last_hour = 0;
        for event in &self.events {
            *by_kind.entry(event.kind.to_string()).or_insert(0) += 1;
            if event.timestamp >= hour_ago {
                last_hour += 1;
            }
        }
        SecuritySummary {
            total: self.events.len(),
            last_hour,
            by_kind,
        }
    }
}
