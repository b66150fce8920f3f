//! Incremental decoder for `text/event-stream` bodies.

use std::collections::VecDeque;

/// Buffers raw bytes and yields the `data` payload of each complete event.
///
/// Bytes may arrive split at any position, including inside a UTF-8 sequence.
/// Comment lines and fields other than `data` are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    ready: VecDeque<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(&String::from_utf8_lossy(&line));
        }
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.process_line(line.trim_end_matches('\r'));
        }
        self.dispatch();
    }

    pub fn next_event(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data.push(value.to_string());
        }
    }

    fn dispatch(&mut self) {
        if !self.data.is_empty() {
            let payload = self.data.join("\n");
            self.data.clear();
            self.ready.push_back(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut SseDecoder) -> Vec<String> {
        std::iter::from_fn(|| decoder.next_event()).collect()
    }

    #[test]
    fn test_events_split_across_pushes() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: {\"a\"");
        assert!(drain(&mut decoder).is_empty());

        decoder.push(b":1}\n");
        assert!(drain(&mut decoder).is_empty());

        decoder.push(b"\ndata: [DONE]\n\n");
        assert_eq!(drain(&mut decoder), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_crlf_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        decoder.push(b": keep-alive\r\n\r\nevent: message\r\nid: 7\r\ndata: hello\r\n\r\n");
        assert_eq!(drain(&mut decoder), vec!["hello"]);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: first\ndata:second\n\n");
        assert_eq!(drain(&mut decoder), vec!["first\nsecond"]);
    }

    #[test]
    fn test_split_utf8_sequence() {
        let text = "data: h\u{e9}llo\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        decoder.push(&text[..split]);
        decoder.push(&text[split..]);
        assert_eq!(drain(&mut decoder), vec!["h\u{e9}llo"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: tail");
        assert!(drain(&mut decoder).is_empty());

        decoder.finish();
        assert_eq!(drain(&mut decoder), vec!["tail"]);
    }
}
