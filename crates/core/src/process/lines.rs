//! Splitting of raw tool output into lines.

/// Longest line handed out; longer runs of bytes are cut into pieces of this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental splitter that treats `\n`, `\r\n` and a bare `\r` as line ends.
///
/// Progress meters redraw with `\r`, so each redraw becomes its own line.
/// Invalid UTF-8 is replaced rather than rejected and empty lines are dropped.
/// At most [`MAX_LINE_BYTES`] are buffered between terminators.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush_into(&mut lines);
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    self.flush_into(&mut lines);
                }
            }
        }
        lines
    }

    /// Returns the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        lines.push(line);
    }
}
