/// Incremental decoder that turns a raw byte stream into complete lines
///
/// Bytes are buffered until a newline is seen; everything up to and including
/// the newline is emitted as one line. The concatenation of all emitted
/// strings equals the input stream exactly.
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    /// Create a new decoder with an empty pending buffer
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Feed bytes into the decoder and return every complete line
    ///
    /// Each returned line keeps its trailing newline. Bytes after the last
    /// newline stay in the pending buffer until a later `push` completes
    /// them or `finish` flushes them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let raw = std::mem::replace(&mut self.pending, rest);
            lines.push(String::from_utf8_lossy(&raw).into_owned());
        }

        lines
    }

    /// Flush the remainder at end of stream
    ///
    /// Returns `Some` only when the stream did not end with a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            let raw = std::mem::take(&mut self.pending);
            Some(String::from_utf8_lossy(&raw).into_owned())
        }
    }

    /// Whether any bytes are waiting for a newline
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"hello\n");
        assert_eq!(lines, vec!["hello\n"]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_multiple_lines_in_one_push() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"one\ntwo\nthree\n");
        assert_eq!(lines, vec!["one\n", "two\n", "three\n"]);
    }

    #[test]
    fn test_line_split_across_pushes() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"hel").is_empty());
        assert!(decoder.push(b"lo").is_empty());
        let lines = decoder.push(b" world\n");
        assert_eq!(lines, vec!["hello world\n"]);
    }

    #[test]
    fn test_partial_line_stays_pending() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"complete\npartial");
        assert_eq!(lines, vec!["complete\n"]);
        assert!(decoder.has_pending());
    }

    #[test]
    fn test_finish_flushes_fragment() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"no newline");
        assert_eq!(decoder.finish(), Some("no newline".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_finish_empty_is_none() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"terminated\n");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_concatenation_equals_input() {
        let input = b"first\nsecond\nthird without newline";
        let mut decoder = LineDecoder::new();
        let mut output = String::new();
        for line in decoder.push(&input[..10]) {
            output.push_str(&line);
        }
        for line in decoder.push(&input[10..]) {
            output.push_str(&line);
        }
        if let Some(rest) = decoder.finish() {
            output.push_str(&rest);
        }
        assert_eq!(output.as_bytes(), &input[..]);
    }

    #[test]
    fn test_multibyte_char_split_across_pushes() {
        let input = "héllo wörld\n".as_bytes();
        let mut decoder = LineDecoder::new();
        // Split in the middle of the two-byte 'é'
        let mut lines = decoder.push(&input[..2]);
        assert!(lines.is_empty());
        lines.extend(decoder.push(&input[2..]));
        assert_eq!(lines, vec!["héllo wörld\n"]);
    }

    #[test]
    fn test_empty_line() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"\n\n");
        assert_eq!(lines, vec!["\n", "\n"]);
    }
}
