//! Session identity and lifecycle
//!
//! A session is created on a browser's first interaction and carries three
//! identifiers: an opaque high-entropy token, a short displayable id, and a
//! stable user id used for rate limiting. Identifiers never change for the
//! life of the session; expiry or an explicit clear allocates fresh ones.

use chrono::{DateTime, Duration, Utc};
use nutype::nutype;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum believable session age; anything older fails the validity check.
const MAX_SESSION_AGE_HOURS: i64 = 24;

/// Opaque 256-bit session token, hex-encoded
#[nutype(
    sanitize(lowercase),
    validate(regex = r"^[0-9a-f]{64}$"),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef, Display)
)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self::try_new(hex::encode(bytes)).expect("32 random bytes encode to valid token hex")
    }
}

/// Short displayable session id (96 bits, hex-encoded)
#[nutype(
    sanitize(lowercase),
    validate(regex = r"^[0-9a-f]{24}$"),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef, Display)
)]
pub struct SessionId(String);

/// Stable per-session user identifier (16 hex chars)
#[nutype(
    sanitize(lowercase),
    validate(regex = r"^[0-9a-f]{16}$"),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef, Display)
)]
pub struct UserId(String);

/// Fixed per-process secret used to derive session integrity markers.
///
/// Drawn once at registry construction; markers derived from it are
/// verifiable for the process lifetime, unlike a per-call random secret.
#[derive(Clone)]
pub struct ProcessSecret([u8; 32]);

impl ProcessSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ProcessSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessSecret(..)")
    }
}

/// One browser session's identity and activity window
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: SessionToken,
    pub id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    integrity_marker: String,
}

impl Session {
    pub fn create(secret: &ProcessSecret, now: DateTime<Utc>) -> Self {
        let token = SessionToken::generate();
        let id = SessionId::try_new(token.as_ref()[..24].to_string())
            .expect("token prefix is valid id hex");
        let user_id = derive_user_id(&token, now);
        let integrity_marker = derive_marker(secret, &token, &user_id);
        Self {
            token,
            id,
            user_id,
            created_at: now,
            last_activity_at: now,
            integrity_marker,
        }
    }

    /// Record activity. `last_activity_at` is monotonically non-decreasing.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    pub fn expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > timeout
    }

    /// Validity check: a plausible age window and an intact integrity marker.
    pub fn is_valid(&self, secret: &ProcessSecret, now: DateTime<Utc>) -> bool {
        let age = now - self.created_at;
        if age < Duration::zero() || age > Duration::hours(MAX_SESSION_AGE_HOURS) {
            return false;
        }
        self.integrity_marker == derive_marker(secret, &self.token, &self.user_id)
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }

    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity_at).num_minutes()
    }

    /// First eight characters of the displayable id, for logs.
    pub fn id_prefix(&self) -> String {
        self.id.as_ref().chars().take(8).collect()
    }

    /// First eight characters of the user id, for logs.
    pub fn user_id_prefix(&self) -> String {
        self.user_id.as_ref().chars().take(8).collect()
    }
}

/// User id: 16-hex prefix of a SHA-256 over mixed entropy sources.
fn derive_user_id(token: &SessionToken, now: DateTime<Utc>) -> UserId {
    let mut hasher = Sha256::new();
    hasher.update(token.as_ref().as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or(0).to_be_bytes());
    hasher.update(Uuid::now_v7().as_bytes());
    let digest = hex::encode(hasher.finalize());
    UserId::try_new(digest[..16].to_string()).expect("digest prefix is valid user id hex")
}

fn derive_marker(secret: &ProcessSecret, token: &SessionToken, user_id: &UserId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(token.as_ref().as_bytes());
    hasher.update(user_id.as_ref().as_bytes());
    hex::encode(hasher.finalize())
}
