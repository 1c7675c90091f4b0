//! Incremental parser for the upstream SSE event protocol.
//!
//! The upstream service emits records of the form `event: <name>\ndata: <json>\n`,
//! delivered as transport chunks whose boundaries carry no meaning: a chunk may
//! end mid-line, mid-marker, or mid-character. [`FrameParser`] absorbs raw bytes
//! and yields complete [`EventFrame`]s, keeping anything incomplete buffered for
//! the next chunk.

const EVENT_MARKER: &str = "event: ";
const DATA_MARKER: &str = "data: ";

/// One complete `(event, data)` record extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub event: String,
    pub data: String,
}

/// Where the scan left off when input ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Looking for the next `event: ` marker and its end-of-line.
    SeekEvent,
    /// Event line consumed; looking for the paired `data: ` marker.
    SeekData,
    /// Data marker consumed; the cursor sits at the payload start,
    /// waiting for the line terminator.
    SeekTerminator,
}

/// Resumable scanner over a growing decode buffer.
///
/// Feed transport chunks with [`push_bytes`](Self::push_bytes), then drain
/// complete frames with [`next_frame`](Self::next_frame). The parser owns the
/// buffer for one upstream exchange; consumed bytes are dropped from the front
/// whenever the scan stalls.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: String,
    /// Start of unscanned content in `buf`. Always on a char boundary.
    cursor: usize,
    state: ScanState,
    /// Event name captured while in `SeekData`/`SeekTerminator`.
    pending_event: Option<String>,
    /// Trailing bytes of a split multi-byte sequence, completed by the next chunk.
    utf8_carry: Vec<u8>,
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState::SeekEvent
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw transport chunk, decoding it statefully: a multi-byte
    /// sequence split across chunk boundaries is held back and completed by
    /// the next call, never mangled into replacement characters.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        if self.utf8_carry.is_empty() {
            self.decode_append(chunk);
        } else {
            let mut bytes = std::mem::take(&mut self.utf8_carry);
            bytes.extend_from_slice(chunk);
            self.decode_append(&bytes);
        }
    }

    fn decode_append(&mut self, mut bytes: &[u8]) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.buf.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.buf
                        .push_str(&String::from_utf8_lossy(&bytes[..valid]));
                    match err.error_len() {
                        // Truly invalid sequence: replace and keep going.
                        Some(bad) => {
                            self.buf.push('\u{FFFD}');
                            bytes = &bytes[valid + bad..];
                        }
                        // Incomplete trailing sequence: carry it to the next chunk.
                        None => {
                            self.utf8_carry = bytes[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Advance the scan and return the next complete frame, or `None` if the
    /// buffered input ends mid-record. `None` compacts the buffer; the scan
    /// resumes from the same state once more bytes arrive.
    pub fn next_frame(&mut self) -> Option<EventFrame> {
        loop {
            match self.state {
                ScanState::SeekEvent => {
                    let Some(rel) = self.buf[self.cursor..].find(EVENT_MARKER) else {
                        // Nothing before a possible partial marker tail can
                        // ever match; drop it.
                        self.retain_tail(EVENT_MARKER.len() - 1);
                        self.compact();
                        return None;
                    };
                    let name_start = self.cursor + rel + EVENT_MARKER.len();
                    let Some(nl) = self.buf[name_start..].find('\n') else {
                        // Event line not fully received; resume at the marker.
                        self.cursor += rel;
                        self.compact();
                        return None;
                    };
                    let name = self.buf[name_start..name_start + nl].trim().to_string();
                    self.pending_event = Some(name);
                    self.cursor = name_start + nl + 1;
                    self.state = ScanState::SeekData;
                }
                ScanState::SeekData => {
                    let Some(rel) = self.buf[self.cursor..].find(DATA_MARKER) else {
                        self.retain_tail(DATA_MARKER.len() - 1);
                        self.compact();
                        return None;
                    };
                    self.cursor += rel + DATA_MARKER.len();
                    self.state = ScanState::SeekTerminator;
                }
                ScanState::SeekTerminator => {
                    // Cursor sits at the payload start. No terminator yet
                    // means the data line is still in flight: consume nothing.
                    let Some(nl) = self.buf[self.cursor..].find('\n') else {
                        self.compact();
                        return None;
                    };
                    let data = self.buf[self.cursor..self.cursor + nl].trim().to_string();
                    self.cursor += nl + 1;
                    self.state = ScanState::SeekEvent;
                    let event = self.pending_event.take().unwrap_or_default();
                    return Some(EventFrame { event, data });
                }
            }
        }
    }

    /// Advance the cursor so that at most `keep` bytes of unmatched input
    /// survive, enough to complete a marker split across chunks. Markers are
    /// ASCII, so backing up to a char boundary never discards a marker prefix.
    fn retain_tail(&mut self, keep: usize) {
        let mut pos = self.buf.len().saturating_sub(keep);
        while !self.buf.is_char_boundary(pos) {
            pos -= 1;
        }
        if pos > self.cursor {
            self.cursor = pos;
        }
    }

    /// Drop everything before the cursor.
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut FrameParser) -> Vec<EventFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = parser.next_frame() {
            frames.push(frame);
        }
        frames
    }

    fn parse_whole(input: &[u8]) -> Vec<EventFrame> {
        let mut parser = FrameParser::new();
        parser.push_bytes(input);
        collect(&mut parser)
    }

    #[test]
    fn test_two_frames_single_chunk() {
        let frames = parse_whole(
            b"event: message\ndata: {\"a\":1}\nevent: message\ndata: {\"b\":2}\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert_eq!(frames[1].data, "{\"b\":2}");
    }

    #[test]
    fn test_event_type_captured_and_trimmed() {
        let frames = parse_whole(b"event: error\r\ndata: {\"oops\":true}\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "error");
        assert_eq!(frames[0].data, "{\"oops\":true}");
    }

    #[test]
    fn test_incomplete_data_line_yields_nothing() {
        let mut parser = FrameParser::new();
        parser.push_bytes(b"event: message\ndata: {\"text\":\"par");
        assert_eq!(collect(&mut parser), vec![]);

        parser.push_bytes(b"tial\"}\n");
        let frames = collect(&mut parser);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"text\":\"partial\"}");
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut parser = FrameParser::new();
        parser.push_bytes(b"eve");
        assert_eq!(collect(&mut parser), vec![]);
        parser.push_bytes(b"nt: message\nda");
        assert_eq!(collect(&mut parser), vec![]);
        parser.push_bytes(b"ta: hello\n");
        let frames = collect(&mut parser);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn test_noise_between_records_is_skipped() {
        let frames = parse_whole(b"\n: comment\nevent: message\nid: 7\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let input = "event: message\ndata: {\"data\":{\"text\":\"h\u{e9}llo \u{3010}\u{5f15}\u{7528}:5-7\u{3011}\",\"type\":\"text\"}}\nevent: error\ndata: {\"data\":{}}\n"
            .as_bytes();
        let expected = parse_whole(input);
        assert_eq!(expected.len(), 2);

        // Every two-way split, including splits inside multi-byte characters.
        for split in 1..input.len() {
            let mut parser = FrameParser::new();
            parser.push_bytes(&input[..split]);
            let mut frames = collect(&mut parser);
            parser.push_bytes(&input[split..]);
            frames.extend(collect(&mut parser));
            assert_eq!(frames, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let input = "event: message\ndata: {\"text\":\"\u{4f60}\u{597d}\"}\n".as_bytes();
        let expected = parse_whole(input);

        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for byte in input {
            parser.push_bytes(std::slice::from_ref(byte));
            frames.extend(collect(&mut parser));
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let mut parser = FrameParser::new();
        parser.push_bytes(b"event: message\ndata: a\xff b\n");
        let frames = collect(&mut parser);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a\u{FFFD} b");
    }
}
