//! Server-sent-events line decoding.
//!
//! Response bodies arrive as arbitrary byte chunks; a `data:` payload can be
//! split across chunks or several payloads can arrive in one. The buffer
//! accumulates bytes and yields only complete payload lines.

/// Accumulates SSE bytes and yields complete `data:` payloads.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns the `data:` payloads completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim().to_string();
            self.buffer.drain(..=newline);

            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim().to_string());
            }
            // Comment lines, `event:` lines, and blank separators are
            // dropped; event names are re-encoded in the JSON payloads the
            // backends send.
        }
        payloads
    }
}
