//! Incremental framing for streamed HTTP bodies.
//!
//! Chunks arrive split at arbitrary byte boundaries (HTTP/2 frames,
//! TCP segments, even inside a multi-byte character) so a frame is
//! only cut out of the buffer once its delimiter has been seen.

use anyhow::Result;

pub struct FrameBuffer {
    buf: Vec<u8>,
    delimiter: &'static [u8],
}

impl FrameBuffer {
    /// Frames separated by a blank line, as in `text/event-stream`.
    pub fn sse() -> Self {
        Self::new(b"\n\n")
    }

    /// Newline delimited frames, as in NDJSON.
    pub fn lines() -> Self {
        Self::new(b"\n")
    }

    fn new(delimiter: &'static [u8]) -> Self {
        Self {
            buf: Vec::new(),
            delimiter,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        // Normalize CRLF so servers that use `\r\n\r\n` between events
        // (Gemini does) frame the same way as everyone else
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Returns the next complete, non-empty frame if there is one.
    pub fn next_frame(&mut self) -> Result<Option<String>> {
        loop {
            let Some(end) = self
                .buf
                .windows(self.delimiter.len())
                .position(|w| w == self.delimiter)
            else {
                return Ok(None);
            };
            let frame: Vec<u8> = self.buf.drain(..end + self.delimiter.len()).collect();
            let frame = std::str::from_utf8(&frame[..end])?.trim();
            if !frame.is_empty() {
                return Ok(Some(frame.to_string()));
            }
        }
    }

    /// Drains whatever is left once the body has ended.
    pub fn finish(&mut self) -> Result<Option<String>> {
        let rest = std::mem::take(&mut self.buf);
        let rest = std::str::from_utf8(&rest)?.trim();
        if rest.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rest.to_string()))
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Parses a single server-sent event frame. Comment lines and frames
/// without a `data` field (keep-alives) yield `None`.
pub fn parse_event(frame: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data.is_empty() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}
