//! SSE framing and delta extraction for the model's completion stream.

pub mod delta;
pub mod frame;

pub use delta::{DeltaExtractor, StreamEvent};
pub use frame::FrameDecoder;

/// Frame decoder and delta extractor wired together for one turn.
#[derive(Debug, Default)]
pub struct StreamReader {
    frames: FrameDecoder,
    deltas: DeltaExtractor,
}

impl StreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one body chunk into stream events, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let payloads = self.frames.push(chunk);
        self.extract_all(payloads)
    }

    /// Drain the trailing line once the body is exhausted.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let payloads = self.frames.finish();
        self.extract_all(payloads)
    }

    pub fn is_ended(&self) -> bool {
        self.deltas.is_ended()
    }

    fn extract_all(&mut self, payloads: Vec<String>) -> Vec<StreamEvent> {
        payloads
            .iter()
            .filter_map(|p| self.deltas.extract(p))
            .collect()
    }
}
