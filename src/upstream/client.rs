//! HTTP client for the hosted flow endpoints
//!
//! One POST per turn. Redirects are disabled on the first attempt; a 3xx
//! answer triggers a single retry of the same POST with redirects enabled.
//! Transport failures are classified into a small taxonomy, each kind
//! mapped to a fixed user-safe sentence.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nutype::nutype;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::TimeoutSettings;
use crate::domain::conversation::ConversationKey;
use crate::domain::session::{Session, SessionId, SessionToken, UserId};
use crate::security::event_log::EventKind;
use crate::upstream::headers;

/// Longest diagnostic excerpt attached to a logged upstream failure.
const DIAGNOSTIC_PREFIX_LENGTH: usize = 50;

/// Statuses that trigger the single redirect-enabled retry.
const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Flow endpoint URL
#[nutype(
    validate(predicate = |s| s.starts_with("http://") || s.starts_with("https://")),
    derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, TryFrom, AsRef, Display)
)]
pub struct FlowUrl(String);

/// API key for upstream authentication
#[nutype(
    validate(predicate = |s: &str| !s.is_empty()),
    derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct ApiKey(String);

/// Session identifiers attached to one upstream call
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub session_token: SessionToken,
    pub user_id: UserId,
    pub conversation: ConversationKey,
}

impl SessionContext {
    pub fn new(session: &Session, conversation: ConversationKey) -> Self {
        Self {
            session_id: session.id.clone(),
            session_token: session.token.clone(),
            user_id: session.user_id.clone(),
            conversation,
        }
    }
}

/// Errors raised by an upstream call
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream request timed out: {detail}")]
    Timeout { detail: String },

    #[error("upstream transport failure: {detail}")]
    Network { detail: String },

    #[error("upstream returned HTTP {status}")]
    Http { status: u16, detail: String },

    #[error("upstream response was not valid JSON: {detail}")]
    Decode { detail: String },

    #[error("unexpected upstream failure: {detail}")]
    Unexpected { detail: String },
}

impl UpstreamError {
    /// Fixed user-safe sentence for this failure, rendered as assistant text.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "The request took too long. Please try again.",
            Self::Network { .. } => "Connection error. Please check your internet connection.",
            Self::Http { status: 401 | 403, .. } => {
                "Access denied. Please check your permissions."
            }
            Self::Http { status: 404, .. } => "The requested resource was not found.",
            Self::Http { .. } | Self::Unexpected { .. } => {
                "An error occurred. Please try again later."
            }
            Self::Decode { .. } => "Invalid response from server. Please try again.",
        }
    }

    /// Security event category for this failure.
    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::Timeout { .. } => EventKind::ApiTimeout,
            Self::Network { .. } => EventKind::ApiConnectionError,
            Self::Http { .. } => EventKind::ApiHttpError,
            Self::Decode { .. } => EventKind::ApiDecodeError,
            Self::Unexpected { .. } => EventKind::UnexpectedError,
        }
    }

    /// Truncated diagnostic suitable for the security log.
    pub fn diagnostic_prefix(&self) -> String {
        let detail = match self {
            Self::Timeout { detail }
            | Self::Network { detail }
            | Self::Http { detail, .. }
            | Self::Decode { detail }
            | Self::Unexpected { detail } => detail,
        };
        detail.chars().take(DIAGNOSTIC_PREFIX_LENGTH).collect()
    }
}

/// Transport seam for the gateway; the production implementation is
/// [`UpstreamClient`], tests substitute stubs.
#[async_trait]
pub trait FlowTransport: Send + Sync {
    async fn call(
        &self,
        endpoint: &FlowUrl,
        prompt: &str,
        ctx: &SessionContext,
    ) -> Result<Value, UpstreamError>;
}

pub struct UpstreamClient {
    direct: reqwest::Client,
    redirecting: reqwest::Client,
    api_key: Option<ApiKey>,
}

impl UpstreamClient {
    pub fn new(timeouts: &TimeoutSettings, api_key: Option<ApiKey>) -> crate::Result<Self> {
        let connect = Duration::from_secs_f64(timeouts.connect);
        let read = Duration::from_secs_f64(timeouts.read);
        let direct = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let redirecting = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            direct,
            redirecting,
            api_key,
        })
    }

    fn request(
        &self,
        client: &reqwest::Client,
        endpoint: &FlowUrl,
        body: &Value,
        ctx: &SessionContext,
        request_id: &str,
        timestamp: &str,
    ) -> reqwest::RequestBuilder {
        let mut request = client
            .post(endpoint.as_ref())
            .header(reqwest::header::CONNECTION, "keep-alive")
            .header(headers::X_SESSION_ID, ctx.session_id.to_string())
            .header(headers::X_USER_ID, ctx.user_id.to_string())
            .header(headers::X_SESSION_TOKEN, ctx.session_token.to_string())
            .header(headers::X_CLIENT_ID, ctx.session_id.to_string())
            .header(headers::X_CONVERSATION_ID, ctx.session_id.to_string())
            .header(headers::X_REQUEST_ID, request_id)
            .header(headers::X_TIMESTAMP, timestamp)
            .header(headers::X_PAGE_CONTEXT, ctx.conversation.as_str())
            .json(body);
        if let Some(key) = &self.api_key {
            let key = key.clone().into_inner();
            request = request
                .header(headers::X_API_KEY, key.clone())
                .header(
                    reqwest::header::AUTHORIZATION,
                    format!("{}{key}", headers::BEARER_PREFIX),
                );
        }
        request
    }
}

fn build_body(prompt: &str, ctx: &SessionContext, timestamp: &str) -> Value {
    json!({
        "input_value": prompt,
        "output_type": "chat",
        "input_type": "chat",
        "session_id": ctx.session_id,
        "session_token": ctx.session_token,
        "user_id": ctx.user_id,
        "client_id": ctx.session_id,
        "conversation_id": ctx.session_id,
        "session_metadata": {
            "session_id": ctx.session_id,
            "session_token": ctx.session_token,
            "user_id": ctx.user_id,
            "timestamp": timestamp,
            "conversation_key": ctx.conversation.as_str(),
        },
    })
}

fn classify(err: reqwest::Error) -> UpstreamError {
    let detail = err.to_string();
    if err.is_timeout() {
        UpstreamError::Timeout { detail }
    } else if err.is_decode() {
        UpstreamError::Decode { detail }
    } else if err.is_connect() || err.is_request() || err.is_body() || err.is_redirect() {
        UpstreamError::Network { detail }
    } else {
        UpstreamError::Unexpected { detail }
    }
}

#[async_trait]
impl FlowTransport for UpstreamClient {
    async fn call(
        &self,
        endpoint: &FlowUrl,
        prompt: &str,
        ctx: &SessionContext,
    ) -> Result<Value, UpstreamError> {
        let request_id = Uuid::now_v7().to_string();
        let timestamp = Utc::now().to_rfc3339();
        let body = build_body(prompt, ctx, &timestamp);

        tracing::debug!(
            endpoint = %endpoint,
            request_id = %request_id,
            conversation = %ctx.conversation,
            "calling flow endpoint"
        );

        let mut response = self
            .request(&self.direct, endpoint, &body, ctx, &request_id, &timestamp)
            .send()
            .await
            .map_err(classify)?;

        if REDIRECT_STATUSES.contains(&response.status().as_u16()) {
            tracing::debug!(status = %response.status(), "retrying POST with redirects enabled");
            response = self
                .request(
                    &self.redirecting,
                    endpoint,
                    &body,
                    ctx,
                    &request_id,
                    &timestamp,
                )
                .send()
                .await
                .map_err(classify)?;
        }

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                detail,
            });
        }

        response.json::<Value>().await.map_err(|err| {
            if err.is_decode() {
                UpstreamError::Decode {
                    detail: err.to_string(),
                }
            } else {
                classify(err)
            }
        })
    }
}
