use super::logging::emit_sse_parse_error;
use crate::types::StreamEvent;

/// Incremental decoder for newline-delimited `event:` / `data:` records.
///
/// Bytes are buffered raw and split on `\n` before UTF-8 decoding, so a code
/// point split across chunk boundaries is reassembled. The event name set by
/// an `event:` line stays in effect for every following `data:` line until the
/// next `event:` line; blank lines do not reset it.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current_event: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk and return every record completed by it.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            start = end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Process a retained unterminated line once the transport has ended.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.process_line(&line)
    }

    pub fn current_event(&self) -> &str {
        &self.current_event
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(rest) = line.strip_prefix("event:") {
            self.current_event = rest.trim().to_string();
            return None;
        }

        let rest = line.strip_prefix("data:")?;
        let json_data = rest.trim();
        match serde_json::from_str(json_data) {
            Ok(data) => Some(StreamEvent::new(self.current_event.clone(), data)),
            Err(error) => {
                emit_sse_parse_error(Some(&self.current_event), json_data, &error);
                None
            }
        }
    }
}
