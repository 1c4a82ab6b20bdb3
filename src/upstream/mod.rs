//! Upstream flow endpoint client and response handling

pub mod client;
pub mod extractor;
pub mod headers;

pub use client::{
    ApiKey, FlowTransport, FlowUrl, SessionContext, UpstreamClient, UpstreamError,
};
pub use extractor::extract_reply;
