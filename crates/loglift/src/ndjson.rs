//! 🎬 *[NDJSON: the format the cluster demands. The format logs whisper about at night.]*
//!
//! 📡 `NdjsonLines`: turns an arbitrary stream of byte chunks into whole log lines.
//!
//! 🧠 Knowledge graph:
//! - Chunks arrive however the reader felt like cutting them. A line may span three chunks.
//!   The tail without a newline is kept in `pending` until the next chunk, or `finish`.
//! - `\r\n` endings lose their `\r`. Blank lines are dropped. Invalid UTF-8 is replaced, not
//!   rejected; a mangled byte in one log line should not sink the file.
//! - Lines are not parsed. Whatever the producer wrote is what the cluster gets. 🦆

use tracing::warn;

/// ✂️ Incremental newline splitter.
#[derive(Debug, Default)]
pub struct NdjsonLines {
    pending: Vec<u8>,
}

impl NdjsonLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📥 Feeds a chunk, returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        for newline in memchr::memchr_iter(b'\n', chunk) {
            let segment = &chunk[start..newline];
            start = newline + 1;
            if self.pending.is_empty() {
                push_line(&mut lines, segment);
            } else {
                self.pending.extend_from_slice(segment);
                let joined = std::mem::take(&mut self.pending);
                push_line(&mut lines, &joined);
            }
        }
        self.pending.extend_from_slice(&chunk[start..]);
        lines
    }

    /// 🏁 Flushes the last line when the input didn't end with a newline.
    pub fn finish(self) -> Option<String> {
        let mut lines = Vec::with_capacity(1);
        push_line(&mut lines, &self.pending);
        lines.pop()
    }

    /// 📏 Bytes waiting for their newline.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    match std::str::from_utf8(raw) {
        Ok(line) => lines.push(line.to_string()),
        Err(_) => {
            warn!("⚠️ Log line of {} bytes is not valid UTF-8; replacing the bad bytes", raw.len());
            lines.push(String::from_utf8_lossy(raw).into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_line_spans_three_chunks() {
        let mut splitter = NdjsonLines::new();
        assert!(splitter.push(br#"{"msg":"hel"#).is_empty());
        assert!(splitter.push(b"lo wor").is_empty());
        let lines = splitter.push(b"ld\"}\n{\"msg\":\"next\"}\n");
        assert_eq!(lines, vec![r#"{"msg":"hello world"}"#, r#"{"msg":"next"}"#]);
        assert_eq!(splitter.pending_bytes(), 0);
    }

    #[test]
    fn the_one_where_crlf_and_blank_lines_are_tidied() {
        let mut splitter = NdjsonLines::new();
        let lines = splitter.push(b"{\"a\":1}\r\n\r\n   \n{\"b\":2}\n");
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn the_one_where_the_file_forgot_its_final_newline() {
        let mut splitter = NdjsonLines::new();
        assert_eq!(splitter.push(b"{\"a\":1}\n{\"b\":2}"), vec![r#"{"a":1}"#]);
        assert_eq!(splitter.finish(), Some(r#"{"b":2}"#.to_string()));

        assert_eq!(NdjsonLines::new().finish(), None);
    }

    #[test]
    fn the_one_where_bad_utf8_is_patched_not_dropped() {
        let mut splitter = NdjsonLines::new();
        let lines = splitter.push(b"{\"msg\":\"caf\xE9\"}\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains('\u{FFFD}'));
    }
}
