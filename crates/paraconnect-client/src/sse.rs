//! Incremental decoder for `text/event-stream` bodies.

use std::time::Duration;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reconnect delay advertised with a `retry:` field.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Feed a chunk; returns every event completed by it. Partial lines are
    /// kept until the next chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_events_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: messa").is_empty());
        let events = decoder.feed(b"ges\ndata: {}\n\nevent: ping\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "messages");
        assert_eq!(events[0].data, "{}");
        assert_eq!(events[1].event, "ping");
    }

    #[test]
    fn crlf_comments_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keepalive\r\ndata: one\r\ndata: two\r\nid: 7\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "message".into(),
                data: "one\ntwo".into(),
                id: Some("7".into()),
            }]
        );
    }

    #[test]
    fn retry_hint_is_remembered() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"retry: 1500\n\n").is_empty());
        assert_eq!(decoder.retry(), Some(Duration::from_millis(1500)));
        assert!(decoder.feed(b"retry: soon\n").is_empty());
        assert_eq!(decoder.retry(), Some(Duration::from_millis(1500)));
    }
}
