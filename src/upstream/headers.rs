//! HTTP header names for the flow endpoint wire contract
//!
//! This module centralizes the header names sent with every upstream call so
//! the request builder and the tests agree on the exact spelling.

/// Session identifier header, mirrors the `session_id` body field
pub const X_SESSION_ID: &str = "x-session-id";

/// User identifier header, mirrors the `user_id` body field
pub const X_USER_ID: &str = "x-user-id";

/// Session token header, mirrors the `session_token` body field
pub const X_SESSION_TOKEN: &str = "x-session-token";

/// Client identifier header (same value as the session id)
pub const X_CLIENT_ID: &str = "x-client-id";

/// Conversation identifier header (same value as the session id)
pub const X_CONVERSATION_ID: &str = "x-conversation-id";

/// Fresh per-call request id for correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// RFC 3339 timestamp of the call
pub const X_TIMESTAMP: &str = "x-timestamp";

/// Conversation key the turn belongs to
pub const X_PAGE_CONTEXT: &str = "x-page-context";

/// API key header, sent when a key is configured
pub const X_API_KEY: &str = "x-api-key";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";
