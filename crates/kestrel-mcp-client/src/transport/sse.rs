//! Incremental parser for `text/event-stream` payloads.

/// One parsed SSE event block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEventBlock {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
    /// Reconnect hint in milliseconds
    pub retry: Option<u64>,
}

impl SseEventBlock {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.event.is_none() && self.data.is_empty() && self.retry.is_none()
    }
}

/// Splits a byte stream into event blocks at blank lines.
///
/// Comment lines (leading `:`) are dropped, multi-line `data:` fields are
/// joined with `\n`, and `retry:` is parsed as integer milliseconds.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current: SseEventBlock,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEventBlock> {
        self.buffer.push_str(chunk);
        let mut completed = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.flush() {
                    completed.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "id" => self.current.id = Some(value.to_string()),
                "event" => self.current.event = Some(value.to_string()),
                "data" => self.data_lines.push(value.to_string()),
                "retry" => self.current.retry = value.parse().ok(),
                _ => {}
            }
        }

        completed
    }

    fn flush(&mut self) -> Option<SseEventBlock> {
        let mut event = std::mem::take(&mut self.current);
        event.data = std::mem::take(&mut self.data_lines).join("\n");
        (!event.is_empty()).then_some(event)
    }
}
