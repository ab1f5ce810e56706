//! Incremental server-sent-events decoder.
//!
//! Network chunks do not respect frame boundaries, so bytes are buffered
//! until a full line is available and fields are accumulated until the blank
//! line that terminates an event.

use bytes::BytesMut;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the frame carried no `event:` field.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

/// Stateful decoder fed with raw body chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that the stream ended without terminating.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            let rest = self.buf.split();
            let rest = String::from_utf8_lossy(&rest);
            let line = rest.trim_end_matches(['\n', '\r']).to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    /// Decode a complete body in one go.
    pub fn decode_all(body: &[u8]) -> Vec<SseEvent> {
        let mut decoder = Self::new();
        let mut events = decoder.push(body);
        events.extend(decoder.finish());
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: endpoint\nda").is_empty());
        assert!(decoder.push(b"ta: /messages?session=1").is_empty());
        let events = decoder.push(b"\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "endpoint");
        assert_eq!(events[0].data, "/messages?session=1");
    }

    #[test]
    fn test_crlf_multiline_data_and_comments() {
        let events = SseDecoder::decode_all(
            b": keep-alive\r\ndata: {\"a\":\r\ndata: 1}\r\n\r\ndata: second\r\n\r\n",
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "{\"a\":\n1}");
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn test_unterminated_trailing_event_is_flushed() {
        let events = SseDecoder::decode_all(b"id: 4\ndata: tail");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "tail");
        assert_eq!(events[0].id.as_deref(), Some("4"));
    }

    #[test]
    fn test_event_without_data_is_dropped() {
        assert!(SseDecoder::decode_all(b"event: ping\n\n").is_empty());
    }
}
