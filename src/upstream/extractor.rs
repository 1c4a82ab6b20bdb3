//! Reply extraction from the variant flow response envelope
//!
//! The upstream service returns one of several nesting shapes depending on
//! the flow's output component. Rather than probing fields dynamically, the
//! envelope is decoded into an explicit schema of optional fields and
//! projected in a fixed order; anything unrecognised falls back to the
//! pretty-printed envelope.

use serde::Deserialize;
use serde_json::Value;

/// Longest raw-envelope excerpt included in a diagnostic string.
const DIAGNOSTIC_PREFIX_LENGTH: usize = 200;

#[derive(Debug, Default, Deserialize)]
struct FlowEnvelope {
    #[serde(default)]
    outputs: Vec<OuterOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct OuterOutput {
    #[serde(default)]
    outputs: Vec<InnerOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct InnerOutput {
    #[serde(default)]
    messages: Vec<FlowMessage>,
    results: Option<FlowResults>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowMessage {
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowResults {
    message: Option<ResultMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultMessage {
    text: Option<String>,
    data: Option<ResultData>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultData {
    text: Option<String>,
}

/// Project a decoded envelope to a single reply string.
///
/// Projection order: `outputs[0].outputs[0].messages[0].message`, then
/// `…results.message.text`, then `…results.message.data.text`, then the
/// pretty-printed envelope. A lookup that meets a missing key, wrong
/// variant, or empty list falls through to the next rule.
pub fn extract_reply(envelope: &Value) -> String {
    match serde_json::from_value::<FlowEnvelope>(envelope.clone()) {
        Ok(decoded) => project(&decoded).unwrap_or_else(|| fallback(envelope)),
        Err(_) => fallback(envelope),
    }
}

fn project(envelope: &FlowEnvelope) -> Option<String> {
    let inner = envelope.outputs.first()?.outputs.first()?;

    if let Some(text) = inner.messages.first().and_then(|m| m.message.clone()) {
        return Some(text);
    }

    let message = inner.results.as_ref()?.message.as_ref()?;
    if let Some(text) = message.text.clone() {
        return Some(text);
    }
    message.data.as_ref().and_then(|d| d.text.clone())
}

fn fallback(envelope: &Value) -> String {
    serde_json::to_string_pretty(envelope).unwrap_or_else(|e| {
        let raw: String = envelope
            .to_string()
            .chars()
            .take(DIAGNOSTIC_PREFIX_LENGTH)
            .collect();
        format!("Error extracting message: {e}\nRaw response: {raw}")
    })
}
