/// Prefix every payload-carrying SSE line starts with.
const DATA_PREFIX: &str = "data: ";

/// Incremental SSE line decoder.
///
/// Bytes are buffered until a `\n` arrives, so a line is only ever emitted once
/// it is known to be complete. Buffering raw bytes (not `String`) means a chunk
/// boundary that splits a multi-byte UTF-8 sequence is harmless.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and collect the payloads of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(payload) = parse_line(&self.carry[start..end]) {
                payloads.push(payload);
            }
            start = end + 1;
        }
        self.carry.drain(..start);
        payloads
    }

    /// Flush whatever is left once the body has ended. The stream closing
    /// terminates the last line even without a trailing newline.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.carry);
        parse_line(&rest).into_iter().collect()
    }

    /// Bytes waiting for their line terminator.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// Turn one complete line into a payload, or drop it.
fn parse_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() || raw[0] == b':' {
        return None;
    }
    let line = String::from_utf8_lossy(raw);
    match line.strip_prefix(DATA_PREFIX) {
        Some(payload) => Some(payload.trim().to_string()),
        None => {
            tracing::trace!(line = %line, "dropping non-data SSE line");
            None
        }
    }
}
