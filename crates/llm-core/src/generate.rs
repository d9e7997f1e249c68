//! Streaming prediction results.

use serde::Serialize;

/// One streamed piece of a prediction.
///
/// Intermediate pieces carry only `content`. The last one has `done`
/// set, the token counts, and `context`: the tokens to pass to the next
/// `predict` call to continue the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialResult {
    pub content: String,
    pub done: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<i32>,
}

impl PartialResult {
    /// An intermediate text piece.
    pub fn piece(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}
