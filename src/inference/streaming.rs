//! Streaming primitives
//!
//! Items sent over the worker channel during generation, and the UTF-8
//! reassembly buffer for token byte sequences.

/// A single item in a generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    /// A piece of generated text
    Token(String),
    /// Generation finished normally
    Done,
    /// Generation failed; the stream ends here
    Error(String),
}

/// Reassembles valid UTF-8 from token byte sequences.
///
/// Tokenizers can split a multi-byte scalar across tokens, so raw token
/// bytes cannot be converted to `String` one token at a time. Bytes are
/// accumulated and the longest valid prefix is released; an incomplete
/// suffix waits for the next token, while outright-invalid bytes become
/// U+FFFD immediately so they never stall the stream.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    buf: Vec<u8>,
}

impl Utf8Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns any newly completed text.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Option<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.buf) {
                Ok(s) => {
                    out.push_str(s);
                    self.buf.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.buf[..valid]));
                    match e.error_len() {
                        // Invalid bytes outright: replace them and keep scanning
                        Some(bad) => {
                            out.push('\u{fffd}');
                            self.buf.drain(..valid + bad);
                        }
                        // Incomplete tail: hold it for the next token
                        None => {
                            self.buf.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Releases whatever is left, lossily if the tail never completed.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let out = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(out)
    }
}
