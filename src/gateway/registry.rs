//! Process-wide session store
//!
//! The host layer supplies an opaque browser-session key on every call; all
//! per-session state (identity, conversations, security events, the
//! in-flight flag) hangs off that key under one mutex. Sessions idle past
//! the timeout are replaced with fresh identifiers on their next
//! interaction; distinct keys never share state.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use nutype::nutype;
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::conversation::{ConversationKey, ConversationLog, Message, MessageRole};
use crate::domain::session::{ProcessSecret, Session};
use crate::security::event_log::{EventKind, SecurityLog, SecuritySummary, Severity};

/// Opaque browser-session key supplied by the host layer
#[nutype(
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef, Display)
)]
pub struct BrowserKey(String);

/// UI state that survives a session clear
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub page: Option<String>,
    pub debug: bool,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    ui: UiState,
    conversations: HashMap<ConversationKey, ConversationLog>,
    security_log: SecurityLog,
    processing: bool,
}

/// Snapshot of one session's lifecycle for the host UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id_prefix: String,
    pub age_minutes: i64,
    pub idle_minutes: i64,
    pub valid: bool,
}

pub struct SessionRegistry {
    entries: Mutex<HashMap<BrowserKey, SessionEntry>>,
    secret: ProcessSecret,
    session_timeout: Duration,
    max_conversation_messages: usize,
}

impl SessionRegistry {
    pub fn new(session_timeout: Duration, max_conversation_messages: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            secret: ProcessSecret::generate(),
            session_timeout,
            max_conversation_messages,
        }
    }

    fn fresh_entry(&self, ui: UiState) -> SessionEntry {
        SessionEntry {
            session: Session::create(&self.secret, Utc::now()),
            ui,
            conversations: HashMap::new(),
            security_log: SecurityLog::new(),
            processing: false,
        }
    }

    /// Run `f` against the entry for `key`, creating it on first contact and
    /// replacing it with fresh identifiers when it has idled out.
    fn with_entry<R>(&self, key: &BrowserKey, f: impl FnOnce(&mut SessionEntry) -> R) -> R {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| self.fresh_entry(UiState::default()));
        if entry.session.expired(self.session_timeout, Utc::now()) {
            let ui = entry.ui.clone();
            let debug = ui.debug;
            tracing::info!(session = %entry.session.id_prefix(), "session expired, reissuing");
            *entry = self.fresh_entry(ui);
            entry
                .security_log
                .record(EventKind::SessionExpired, Severity::Info, &entry.session, None, debug);
        }
        f(entry)
    }

    /// Idempotently materialise the session for `key` and mark it active.
    pub fn ensure_session(&self, key: &BrowserKey) -> Session {
        self.with_entry(key, |entry| {
            entry.session.touch(Utc::now());
            entry.session.clone()
        })
    }

    /// Replace the session with fresh identifiers, keeping only UI state.
    pub fn clear(&self, key: &BrowserKey) -> Session {
        let mut entries = self.entries.lock();
        let ui = entries
            .get(key)
            .map(|entry| entry.ui.clone())
            .unwrap_or_default();
        let debug = ui.debug;
        let mut entry = self.fresh_entry(ui);
        entry
            .security_log
            .record(EventKind::SessionCleared, Severity::Info, &entry.session, None, debug);
        let session = entry.session.clone();
        entries.insert(key.clone(), entry);
        session
    }

    pub fn append_message(
        &self,
        key: &BrowserKey,
        conversation: ConversationKey,
        role: MessageRole,
        content: String,
    ) {
        let max_messages = self.max_conversation_messages;
        self.with_entry(key, |entry| {
            entry
                .conversations
                .entry(conversation)
                .or_insert_with(|| ConversationLog::new(max_messages))
                .append(role, content);
        });
    }

    pub fn history(&self, key: &BrowserKey, conversation: ConversationKey) -> Vec<Message> {
        self.with_entry(key, |entry| {
            entry
                .conversations
                .get(&conversation)
                .map(ConversationLog::messages)
                .unwrap_or_default()
        })
    }

    pub fn record_event(
        &self,
        key: &BrowserKey,
        kind: EventKind,
        severity: Severity,
        detail: Option<String>,
    ) {
        self.with_entry(key, |entry| {
            let debug = entry.ui.debug;
            entry
                .security_log
                .record(kind, severity, &entry.session, detail, debug);
        });
    }

    pub fn security_summary(&self, key: &BrowserKey) -> SecuritySummary {
        self.with_entry(key, |entry| entry.security_log.summary(Utc::now()))
    }

    pub fn session_info(&self, key: &BrowserKey) -> SessionInfo {
        self.with_entry(key, |entry| {
            let now = Utc::now();
            SessionInfo {
                session_id_prefix: entry.session.id_prefix(),
                age_minutes: entry.session.age_minutes(now),
                idle_minutes: entry.session.idle_minutes(now),
                valid: entry.session.is_valid(&self.secret, now),
            }
        })
    }

    pub fn set_page(&self, key: &BrowserKey, page: Option<String>) {
        self.with_entry(key, |entry| entry.ui.page = page);
    }

    pub fn page(&self, key: &BrowserKey) -> Option<String> {
        self.with_entry(key, |entry| entry.ui.page.clone())
    }

    pub fn set_debug(&self, key: &BrowserKey, debug: bool) {
        self.with_entry(key, |entry| entry.ui.debug = debug);
    }

    /// Claim the per-session in-flight slot. Returns false when a turn is
    /// already running for this session.
    pub fn begin_processing(&self, key: &BrowserKey) -> bool {
        self.with_entry(key, |entry| {
            if entry.processing {
                false
            } else {
                entry.processing = true;
                true
            }
        })
    }

    pub fn end_processing(&self, key: &BrowserKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.processing = false;
        }
    }
}
