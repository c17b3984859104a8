//! Incremental UTF-8 decoding of pipe reads
//!
//! A read can end in the middle of a multi-byte sequence. The incomplete
//! tail is held back and prefixed to the next read; bytes that can never
//! form valid UTF-8 are replaced with U+FFFD.

#[derive(Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
}

impl ChunkDecoder {
    /// Decode one read, returning all text that is complete so far
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.carry.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(std::str::from_utf8(&self.carry[..valid_up_to]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid_up_to + bad);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes
                            self.carry.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Flush whatever is left once the pipe is closed
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.push(b"HTTP listening"), "HTTP listening");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_split_multibyte_sequence() {
        let bytes = "port ✓ 8080".as_bytes();
        let check = bytes.iter().position(|b| *b == 0xE2).unwrap();

        let mut decoder = ChunkDecoder::default();
        let first = decoder.push(&bytes[..check + 1]);
        let second = decoder.push(&bytes[check + 1..]);

        assert_eq!(first, "port ");
        assert_eq!(second, "✓ 8080");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.push(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_tail_flushed_lossily() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.push(b"ok \xE2\x9C"), "ok ");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
