/// Longest partial line kept while waiting for a terminator.
const MAX_PENDING_BYTES: usize = 4096;

/// Reassembles newline-terminated lines from arbitrary read chunks.
///
/// A single read may carry half a line or several lines at once; complete
/// lines come out in the order their bytes arrived.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, trimmed, blank lines dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                if !line.is_empty() {
                    lines.push(line);
                }
            } else if self.pending.len() < MAX_PENDING_BYTES {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Bytes received since the last terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
