use serde::Deserialize;

/// Sentinel payload that terminates a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of the model's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta { text: String },
    End,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Maps SSE payloads to [`StreamEvent`]s.
///
/// Once the `[DONE]` sentinel has been seen every further payload is ignored.
#[derive(Debug, Default)]
pub struct DeltaExtractor {
    ended: bool,
}

impl DeltaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns `None` for anything that carries no text: malformed JSON,
    /// missing fields, empty deltas. A bad frame never aborts the stream.
    pub fn extract(&mut self, payload: &str) -> Option<StreamEvent> {
        if self.ended {
            return None;
        }
        if payload == DONE_SENTINEL {
            self.ended = true;
            return Some(StreamEvent::End);
        }

        let chunk: ChunkPayload = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed stream payload");
                return None;
            }
        };

        let text = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)?;
        if text.is_empty() {
            return None;
        }
        Some(StreamEvent::Delta { text })
    }
}
