//! Gateway orchestration: session registry and the per-turn pipeline

pub mod registry;
pub mod service;

pub use registry::{BrowserKey, SessionInfo, SessionRegistry, UiState};
pub use service::ChatGateway;
