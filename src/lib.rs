//! Flowgate - chat gateway core for hosted conversational-AI flows
//!
//! Validates and sanitises prompts, enforces per-user rate limits, tracks
//! browser sessions, proxies each turn to a configured flow endpoint, and
//! renders the reply into prose and table segments for the host UI.

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod render;
pub mod security;
pub mod upstream;

pub use config::Settings;
pub use domain::conversation::{ConversationKey, Message, MessageRole};
pub use error::{Error, Result};
pub use gateway::{BrowserKey, ChatGateway, SessionInfo};
pub use render::{RenderPlan, Segment};
