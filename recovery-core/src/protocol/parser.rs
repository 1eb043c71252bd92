use heapless::{String, Vec};

pub const STREAM_BUFFER_LEN: usize = 64;
pub const MAX_FIELDS: usize = 8;

pub const MESSAGE_START: u8 = b'<';
pub const FIELD_SEPARATOR: char = ',';
pub const MESSAGE_END: u8 = b'>';

/// Finds `<f0,f1,...>` frames in a byte stream.
///
/// The stream buffer is bounded, once full the oldest byte is dropped. Line
/// terminators and NUL bytes are ignored. A frame is the text between the
/// first `>` and the last `<` before it, anything earlier is discarded.
#[derive(Debug, Default)]
pub struct MessageParser {
    buffer: Vec<u8, STREAM_BUFFER_LEN>,
}

impl MessageParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | 0) {
            return;
        }
        if self.buffer.is_full() {
            self.buffer.remove(0);
        }
        // cannot fail, a slot was freed above
        let _ = self.buffer.push(byte);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.push(*byte);
        }
    }

    /// Takes the next complete frame out of the buffer.
    pub fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            let end = self.buffer.iter().position(|b| *b == MESSAGE_END)?;
            let start = self.buffer[..end]
                .iter()
                .rposition(|b| *b == MESSAGE_START);
            let message = start.and_then(|start| RawMessage::new(&self.buffer[start + 1..end]));

            let remaining = self.buffer.len() - end - 1;
            self.buffer.copy_within(end + 1.., 0);
            self.buffer.truncate(remaining);

            if let Some(message) = message {
                return Some(message);
            }
            log_debug!("dropped unframed or malformed input");
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Body of one frame, without the delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    text: String<STREAM_BUFFER_LEN>,
}

impl RawMessage {
    /// None for an empty body or one that is not UTF-8.
    pub fn new(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        let text = core::str::from_utf8(body).ok()?;
        let mut owned = String::new();
        owned.push_str(text).ok()?;
        Some(Self { text: owned })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of fields, at most [`MAX_FIELDS`].
    pub fn len(&self) -> usize {
        self.text.split(FIELD_SEPARATOR).take(MAX_FIELDS).count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        if index >= MAX_FIELDS {
            return None;
        }
        self.text.split(FIELD_SEPARATOR).nth(index).map(str::trim)
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        self.field(index)?.parse().ok()
    }

    pub fn float(&self, index: usize) -> Option<f32> {
        self.field(index)?.parse().ok()
    }

    /// Leading code field.
    pub fn code(&self) -> Option<u8> {
        self.field(0)?.parse().ok()
    }

    pub fn fields(&self) -> Vec<&str, MAX_FIELDS> {
        self.text
            .split(FIELD_SEPARATOR)
            .take(MAX_FIELDS)
            .map(str::trim)
            .collect()
    }
}
