//! Ping payload word packing (§3, §4.H).
//!
//! The first 32-bit word is the byte length of the ASCII string that
//! follows; subsequent words pack the string big-endian, 4 bytes per word,
//! with the last word zero-padded.

/// Longest string `string_to_words` accepts. `spec.md` §8 tests round-trips
/// up to this length; the length word is a `u32` so the true ceiling is far
/// higher, but `MAX_BUF_SIZE` in the original (`include/pdu.h`) anchors
/// practical frames to a few kilobytes.
pub const MAX_PING_PAYLOAD: usize = 2044;

/// Pack `s` into 32-bit words as described above.
pub fn string_to_words(s: &str) -> Vec<u32> {
    let bytes = s.as_bytes();
    let mut words = Vec::with_capacity(1 + bytes.len().div_ceil(4));
    words.push(bytes.len() as u32);

    for chunk in bytes.chunks(4) {
        let mut word_bytes = [0u8; 4];
        word_bytes[..chunk.len()].copy_from_slice(chunk);
        words.push(u32::from_be_bytes(word_bytes));
    }

    words
}

/// Inverse of [`string_to_words`]. Returns `None` if `words` is empty or the
/// declared length doesn't fit in the words that follow.
pub fn words_to_string(words: &[u32]) -> Option<String> {
    let (&len_word, rest) = words.split_first()?;
    let len = len_word as usize;
    if len > rest.len() * 4 {
        return None;
    }

    let mut bytes = Vec::with_capacity(len);
    for word in rest {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes.truncate(len);

    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_string() {
        let words = string_to_words("hello");
        assert_eq!(words, vec![5, u32::from_be_bytes(*b"hell"), u32::from_be_bytes(*b"o\0\0\0")]);
        assert_eq!(words_to_string(&words).unwrap(), "hello");
    }

    #[test]
    fn round_trips_empty_string() {
        let words = string_to_words("");
        assert_eq!(words, vec![0]);
        assert_eq!(words_to_string(&words).unwrap(), "");
    }

    #[test]
    fn round_trips_exact_word_multiple() {
        let words = string_to_words("abcd");
        assert_eq!(words.len(), 2);
        assert_eq!(words_to_string(&words).unwrap(), "abcd");
    }

    #[test]
    fn round_trips_long_strings() {
        for len in [1usize, 3, 4, 63, 1024, MAX_PING_PAYLOAD] {
            let s: String = "x".repeat(len);
            let words = string_to_words(&s);
            assert_eq!(words_to_string(&words).unwrap(), s);
        }
    }

    #[test]
    fn rejects_truncated_words() {
        assert!(words_to_string(&[100, 1, 2]).is_none());
    }

    #[test]
    fn rejects_empty_word_list() {
        assert!(words_to_string(&[]).is_none());
    }
}
