//! The per-turn pipeline
//!
//! One turn runs validate → rate limit → upstream call → extraction →
//! rendering. No error crosses this boundary upward: every failure becomes
//! a normal assistant message rendered through the prose path, and the
//! session never crashes on a recoverable error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use crate::config::Settings;
use crate::domain::conversation::{ConversationKey, Message, MessageRole};
use crate::error::{Error, Result};
use crate::gateway::registry::{BrowserKey, SessionInfo, SessionRegistry};
use crate::render::{render_reply, RenderPlan};
use crate::security::event_log::{EventKind, SecuritySummary, Severity};
use crate::security::rate_limiter::RateLimiter;
use crate::security::validator::{sanitize, validate, RejectReason};
use crate::upstream::client::{ApiKey, FlowTransport, FlowUrl, SessionContext, UpstreamClient};
use crate::upstream::extractor::extract_reply;

/// Prefix of every error rendered as an assistant message.
const ERROR_PREFIX: &str = "Sorry, I encountered an error: ";

/// Shown when a turn arrives while another is still in flight; the host UI
/// normally prevents this by disabling its input.
const BUSY_MESSAGE: &str = "A response is still being generated. Please wait for it to finish.";

pub struct ChatGateway {
    endpoints: HashMap<ConversationKey, FlowUrl>,
    registry: SessionRegistry,
    rate_limiter: RateLimiter,
    transport: Arc<dyn FlowTransport>,
}

/// Releases the per-session in-flight slot when the turn ends on any path.
struct ProcessingGuard<'a> {
    registry: &'a SessionRegistry,
    key: &'a BrowserKey,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.registry.end_processing(self.key);
    }
}

impl ChatGateway {
    /// Build a gateway over the production HTTP transport.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .api
            .auth
            .key
            .as_ref()
            .map(|k| ApiKey::try_new(k.clone()))
            .transpose()
            .map_err(|e| Error::invalid_configuration(format!("invalid api key: {e}")))?;
        let transport = Arc::new(UpstreamClient::new(&settings.api.timeouts, api_key)?);
        Self::with_transport(settings, transport)
    }

    /// Build a gateway over an explicit transport (used by tests).
    pub fn with_transport(settings: &Settings, transport: Arc<dyn FlowTransport>) -> Result<Self> {
        let endpoints = settings.validated_endpoints()?;
        Ok(Self {
            endpoints,
            registry: SessionRegistry::new(
                Duration::minutes(settings.security.session_timeout_minutes),
                settings.security.max_conversation_messages,
            ),
            rate_limiter: RateLimiter::new(
                settings.security.max_requests_per_minute,
                Duration::seconds(settings.security.rate_window_secs as i64),
            ),
            transport,
        })
    }

    /// Run one user turn and return the render plan for the reply.
    ///
    /// Safe to call concurrently from different sessions; turns within one
    /// session are serialised by the in-flight flag.
    pub async fn start_turn(
        &self,
        key: &BrowserKey,
        conversation: ConversationKey,
        prompt: &str,
    ) -> RenderPlan {
        let session = self.registry.ensure_session(key);

        if !self.registry.begin_processing(key) {
            return RenderPlan::prose(BUSY_MESSAGE);
        }
        let _guard = ProcessingGuard {
            registry: &self.registry,
            key,
        };

        tracing::info!(
            session = %session.id_prefix(),
            conversation = %conversation,
            "turn started"
        );

        if !self.rate_limiter.allow(&session.user_id) {
            let wait = self.rate_limiter.wait_seconds(&session.user_id);
            self.registry.record_event(
                key,
                EventKind::RateLimitExceeded,
                Severity::Warning,
                Some(format!("retry in {wait}s")),
            );
            return RenderPlan::prose(format!(
                "Too many requests. Please wait {wait} seconds before trying again."
            ));
        }

        if let Err(reason) = validate(prompt) {
            match reason {
                RejectReason::CodeLike => self.registry.record_event(
                    key,
                    EventKind::XssAttempt,
                    Severity::Warning,
                    Some(prompt.chars().take(100).collect()),
                ),
                RejectReason::SqlLike => self.registry.record_event(
                    key,
                    EventKind::SqlInjectionAttempt,
                    Severity::Warning,
                    Some(prompt.chars().take(100).collect()),
                ),
                _ => {}
            }
            tracing::warn!(session = %session.id_prefix(), %reason, "prompt rejected");
            return RenderPlan::prose(reason.to_string());
        }

        self.registry
            .append_message(key, conversation, MessageRole::User, prompt.to_string());

        let sanitized = sanitize(prompt);
        let ctx = SessionContext::new(&session, conversation);

        let reply = match self.endpoints.get(&conversation) {
            Some(endpoint) => match self.transport.call(endpoint, &sanitized, &ctx).await {
                Ok(envelope) => extract_reply(&envelope),
                Err(err) => {
                    tracing::error!(
                        session = %session.id_prefix(),
                        error = %err,
                        "upstream call failed"
                    );
                    self.registry.record_event(
                        key,
                        err.event_kind(),
                        Severity::Error,
                        Some(err.diagnostic_prefix()),
                    );
                    format!("{ERROR_PREFIX}{}", err.user_message())
                }
            },
            None => {
                // Unreachable once settings validate; degrade instead of panicking
                self.registry
                    .record_event(key, EventKind::UnexpectedError, Severity::Error, None);
                format!("{ERROR_PREFIX}An error occurred. Please try again later.")
            }
        };

        self.registry
            .append_message(key, conversation, MessageRole::Assistant, reply.clone());

        tracing::info!(session = %session.id_prefix(), "turn completed");
        render_reply(&reply)
    }

    /// Ordered message history for one (session, conversation) pair.
    pub fn history(&self, key: &BrowserKey, conversation: ConversationKey) -> Vec<Message> {
        self.registry.history(key, conversation)
    }

    /// Discard the session, keeping only whitelisted UI state; fresh
    /// identifiers are issued immediately.
    pub fn clear_session(&self, key: &BrowserKey) {
        self.registry.clear(key);
    }

    pub fn session_info(&self, key: &BrowserKey) -> SessionInfo {
        self.registry.session_info(key)
    }

    /// Aggregated security events for the host debug panel.
    pub fn security_summary(&self, key: &BrowserKey) -> SecuritySummary {
        self.registry.security_summary(key)
    }

    pub fn set_debug(&self, key: &BrowserKey, debug: bool) {
        self.registry.set_debug(key, debug);
    }

    pub fn set_page(&self, key: &BrowserKey, page: Option<String>) {
        self.registry.set_page(key, page);
    }
}
