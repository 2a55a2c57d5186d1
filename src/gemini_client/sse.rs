use memchr::memchr;

use crate::error::Result;

/// Incremental decoder for a `text/event-stream` body.
///
/// Bytes are fed in whatever chunks the transport delivers; complete events
/// come out as the joined payload of their `data:` lines.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = std::str::from_utf8(&line[..newline_pos])?;
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Result<Option<String>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = std::str::from_utf8(&rest)?;
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(event) = self.process_line(line) {
                return Ok(Some(event));
            }
        }
        Ok(self.data.take())
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }

        // Comment lines keep the connection alive and carry nothing.
        if line.starts_with(':') {
            return None;
        }

        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(payload);
                }
                None => self.data = Some(payload.to_string()),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").unwrap().is_empty());
        assert!(decoder.push(b":1}\r\n").unwrap().is_empty());
        let events = decoder.push(b"\r\ndata: {\"b\":2}\n\n").unwrap();
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
    }

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\ndata: two\n\n").unwrap();
        assert_eq!(events, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .push(b": keep-alive\nevent: message\nid: 7\ndata: x\n\n")
            .unwrap();
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some("tail".to_string()));
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn multibyte_text_split_mid_character() {
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(decoder.push(&bytes[split..]).unwrap(), vec!["héllo".to_string()]);
    }
}
