//! Byte-to-line framing for newline-delimited streams
//!
//! Bytes arrive at arbitrary boundaries, so a multi-byte character or a whole
//! record may be split across reads. The framer carries both kinds of
//! partial data forward and only emits a frame once its terminating newline
//! (or the end of the stream) has been seen.

/// Incremental UTF-8 decoder that carries an incomplete trailing sequence
/// forward to the next batch instead of re-decoding from scratch.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` and append the text to `out`.
    ///
    /// Invalid sequences become U+FFFD. A sequence that is merely incomplete
    /// at the end of the batch is held back.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + invalid;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    /// Flush any dangling partial sequence as U+FFFD.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
    }

    /// Number of bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Splits decoded text into newline-terminated frames, holding back the
/// incomplete tail.
#[derive(Debug, Default)]
pub struct LineFramer {
    decoder: Utf8Decoder,
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a byte batch and return every frame it completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let scan_from = self.buffer.len();
        self.decoder.decode_into(bytes, &mut self.buffer);

        // Only the newly decoded text can contain a new terminator
        let last_newline = match self.buffer[scan_from..].rfind('\n') {
            Some(pos) => scan_from + pos,
            None => return Vec::new(),
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete[..last_newline]
            .split('\n')
            .map(str::to_owned)
            .collect()
    }

    /// Signal end of stream and return the retained tail, if it holds
    /// anything besides whitespace.
    pub fn finish(&mut self) -> Option<String> {
        self.decoder.finish(&mut self.buffer);
        let tail = std::mem::take(&mut self.buffer);
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Text currently held back waiting for a newline
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}
