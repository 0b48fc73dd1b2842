// client/src/sse.rs
// Incremental text/event-stream parser

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field. `None` for unnamed frames.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    /// Unnamed frames carry nothing this client consumes.
    pub fn is_heartbeat(&self) -> bool {
        self.event.is_none()
    }
}

/// Line-buffering parser.
///
/// Network chunks do not line up with SSE lines, so bytes are held until a
/// full line is available. Lines are split on raw bytes and only complete
/// lines are decoded, which keeps multi-byte UTF-8 characters split across
/// chunks intact. Comment lines (`:keepalive`) are dropped here; frames
/// without an `event:` name are still returned and left for the caller to
/// ignore.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: Vec<u8>,
    pending: PendingFrame,
}

#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty() && self.id.is_none()
    }

    fn take(&mut self) -> SseFrame {
        let pending = std::mem::take(self);
        SseFrame {
            event: pending.event,
            data: pending.data.join("\n"),
            id: pending.id,
        }
    }
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Called once the byte stream ends. A frame missing its terminating
    /// blank line is still delivered.
    pub fn flush(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let line = String::from_utf8_lossy(&rest);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.process_line(line) {
                return Some(frame);
            }
        }
        (!self.pending.is_empty()).then(|| self.pending.take())
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            // Blank line dispatches. A lone blank line is just spacing.
            return (!self.pending.is_empty()).then(|| self.pending.take());
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            // retry: and unknown fields carry nothing for us
            _ => {}
        }
        None
    }
}
