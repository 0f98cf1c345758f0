//! MIME encoding and decoding utilities.
//!
//! Supports Base64 (one-shot and streaming), Quoted-Printable, RFC 2047
//! header words and charset conversion to UTF-8.

use crate::error::Result;
use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use std::fmt::{self, Write as _};
use tracing::warn;

/// Maximum encoded line length (RFC 2045).
pub const MAX_LINE_LENGTH: usize = 76;

/// Raw bytes per RFC 2047 word, keeping each word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

/// Decoder that accepts missing padding and stray trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Decodes a body that was transferred with this encoding.
    ///
    /// Base64 decoding tolerates line breaks and a truncated final group,
    /// which is what a byte-limited partial fetch returns.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 body contains invalid characters.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64_lenient(body),
            Self::QuotedPrintable => Ok(decode_quoted_printable(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped at [`MAX_LINE_LENGTH`] columns.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let mut encoder = Base64Encoder::new();
    encoder.update(data);
    encoder.finish()
}

/// Decodes strict Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Base64 that may contain whitespace or be cut short.
///
/// # Errors
///
/// Returns an error if the input contains characters outside the alphabet.
pub fn decode_base64_lenient(data: &[u8]) -> Result<Vec<u8>> {
    let mut cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    while cleaned.last() == Some(&b'=') {
        cleaned.pop();
    }
    // A lone trailing sextet carries no complete byte.
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    LENIENT.decode(&cleaned).map_err(Into::into)
}

/// Streaming Base64 encoder.
///
/// Input arrives in arbitrary chunks. Bytes that do not fill a 3-byte
/// group are carried into the next call and the final group is padded
/// in [`finish`](Self::finish), so the output never depends on how the
/// input was split.
#[derive(Debug, Default)]
pub struct Base64Encoder {
    carry: Vec<u8>,
    output: String,
    column: usize,
}

impl Base64Encoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds another chunk of input.
    pub fn update(&mut self, chunk: &[u8]) {
        self.carry.extend_from_slice(chunk);
        let whole = self.carry.len() - self.carry.len() % 3;
        if whole == 0 {
            return;
        }
        let encoded = STANDARD.encode(&self.carry[..whole]);
        self.carry.drain(..whole);
        self.push_wrapped(&encoded);
    }

    /// Flushes the carried bytes with padding and returns the wrapped output.
    #[must_use]
    pub fn finish(mut self) -> String {
        if !self.carry.is_empty() {
            let encoded = STANDARD.encode(&self.carry);
            self.carry.clear();
            self.push_wrapped(&encoded);
        }
        self.output
    }

    fn push_wrapped(&mut self, encoded: &str) {
        for ch in encoded.chars() {
            if self.column == MAX_LINE_LENGTH {
                self.output.push_str("\r\n");
                self.column = 0;
            }
            self.output.push(ch);
            self.column += 1;
        }
    }
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input become hard CRLF breaks. Long lines get soft
/// breaks, and whitespace at the end of a line is escaped.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut lines = text.split('\n').peekable();

    while let Some(line) = lines.next() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_qp_line(line.as_bytes(), &mut result);
        if lines.peek().is_some() {
            result.push_str("\r\n");
        }
    }

    result
}

fn encode_qp_line(line: &[u8], out: &mut String) {
    let mut column = 0;

    for (i, &byte) in line.iter().enumerate() {
        let at_end = i + 1 == line.len();
        let literal = matches!(byte, b'!'..=b'<' | b'>'..=b'~')
            || (matches!(byte, b' ' | b'\t') && !at_end);
        let width = if literal { 1 } else { 3 };

        // Leave a column for the soft break marker.
        if column + width > MAX_LINE_LENGTH - 1 {
            out.push_str("=\r\n");
            column = 0;
        }

        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        column += width;
    }
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Malformed escapes are kept literally.
#[must_use]
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        match input.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => i += 3,
            Some([b'\n', _]) => i += 2,
            Some(&[hi, lo]) => {
                if let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) {
                    out.push((hi << 4) | lo);
                    i += 3;
                } else {
                    out.push(b'=');
                    i += 1;
                }
            }
            _ => {
                if input.get(i + 1) == Some(&b'\n') {
                    i += 2;
                } else {
                    out.push(b'=');
                    i += 1;
                }
            }
        }
    }

    out
}

fn hex_value(byte: u8) -> Option<u8> {
    char::from(byte)
        .to_digit(16)
        .and_then(|d| u8::try_from(d).ok())
}

/// Encodes a header value using RFC 2047 B-encoding if needed.
///
/// Printable ASCII is returned unchanged. Otherwise the value is split
/// into UTF-8 encoded words separated by single spaces.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.bytes().all(|b| (b' '..=b'~').contains(&b)) && !text.contains("=?") {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?utf-8?B?{}?=", encode_base64(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?B?{}?=", encode_base64(chunk.as_bytes())));
    }

    words.join(" ")
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between adjacent encoded words is dropped. Words that do not
/// parse are left as they are.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = parse_encoded_word(candidate) {
            if !(after_word && before.trim().is_empty()) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    out.push_str(rest);
    out
}

fn parse_encoded_word(word: &str) -> Option<(String, usize)> {
    let body = word.strip_prefix("=?")?;
    let (charset, rest) = body.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let payload = &rest[..end];

    if charset.is_empty()
        || encoding.len() != 1
        || charset.contains(char::is_whitespace)
        || payload.contains(char::is_whitespace)
    {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64_lenient(payload.as_bytes()).ok()?,
        "Q" | "q" => decode_quoted_printable(payload.replace('_', " ").as_bytes()),
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((decode_charset(&bytes, charset), consumed))
}

/// Converts bytes in the named charset to UTF-8.
///
/// An empty or unknown label falls back to lossy UTF-8.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    let label = charset.trim().trim_matches('"');
    match label.to_lowercase().as_str() {
        "" | "utf-8" | "utf8" | "us-ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unwrapped_len(encoded: &str) -> usize {
        encoded.replace("\r\n", "").len()
    }

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_streaming_encoder_pads_final_group() {
        for len in [1usize, 2, 3, 3000, 3001, 3002] {
            let data = vec![0xA5u8; len];
            let mut encoder = Base64Encoder::new();
            for chunk in data.chunks(1000) {
                encoder.update(chunk);
            }
            let encoded = encoder.finish();
            assert_eq!(unwrapped_len(&encoded) % 4, 0, "input length {len}");
            assert_eq!(decode_base64_lenient(encoded.as_bytes()).unwrap(), data);
        }
    }

    #[test]
    fn test_streaming_encoder_wraps_lines() {
        let encoded = encode_base64_wrapped(&[7u8; 200]);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert!(encoded.contains("\r\n"));
    }

    #[test]
    fn test_streaming_encoder_split_independent() {
        let data: Vec<u8> = (0..=255).collect();
        let mut odd = Base64Encoder::new();
        for chunk in data.chunks(7) {
            odd.update(chunk);
        }
        assert_eq!(odd.finish(), encode_base64_wrapped(&data));
    }

    #[test]
    fn test_lenient_base64_truncated() {
        // "Hello, World!" cut mid-group
        let decoded = decode_base64_lenient(b"SGVsbG8s\r\nIFdvcmxk\r\nI").unwrap();
        assert_eq!(decoded, b"Hello, World");
    }

    #[test]
    fn test_quoted_printable_encode() {
        let text = "Hello, World!";
        let encoded = encode_quoted_printable(text);
        assert_eq!(encoded, "Hello, World!");

        let text = "Héllo, Wørld!";
        let encoded = encode_quoted_printable(text);
        assert!(encoded.contains("=C3"));
    }

    #[test]
    fn test_quoted_printable_line_handling() {
        let encoded = encode_quoted_printable("first \nsecond");
        assert_eq!(encoded, "first=20\r\nsecond");

        let long = "x".repeat(200);
        let encoded = encode_quoted_printable(&long);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert_eq!(decode_quoted_printable(encoded.as_bytes()), long.as_bytes());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!"), b"Hello, World!");
        assert_eq!(
            decode_quoted_printable(b"H=C3=A9llo"),
            "Héllo".as_bytes()
        );
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"50=%"), b"50=%");
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");

        let encoded = encode_rfc2047("Héllo");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
        assert_eq!(decode_rfc2047(&encoded), "Héllo");
    }

    #[test]
    fn test_rfc2047_long_value_splits_words() {
        let text = "Привет мир, это длинная тема письма";
        let encoded = encode_rfc2047(text);
        assert!(encoded.split(' ').all(|word| word.len() <= 75));
        assert_eq!(decode_rfc2047(&encoded), text);
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?="), "Héllo there");
        assert_eq!(
            decode_rfc2047("Re: =?ISO-8859-1?Q?caf=E9?= ok"),
            "Re: café ok"
        );
        assert_eq!(
            decode_rfc2047("=?utf-8?B?SMOp?= =?utf-8?B?bGxv?="),
            "Héllo"
        );
        assert_eq!(decode_rfc2047("a =? b"), "a =? b");
    }

    #[test]
    fn test_decode_charset() {
        assert_eq!(decode_charset(&[0x63, 0x61, 0x66, 0xE9], "iso-8859-1"), "café");
        assert_eq!(decode_charset("ok".as_bytes(), "x-unknown"), "ok");
        assert_eq!(decode_charset("ü".as_bytes(), ""), "ü");
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::Base64.to_string(), "base64");
    }

    proptest! {
        #[test]
        fn prop_streaming_output_is_padded(data in proptest::collection::vec(any::<u8>(), 0..2048), split in 1usize..97) {
            let mut encoder = Base64Encoder::new();
            for chunk in data.chunks(split) {
                encoder.update(chunk);
            }
            let encoded = encoder.finish();
            prop_assert_eq!(unwrapped_len(&encoded) % 4, 0);
            prop_assert_eq!(decode_base64_lenient(encoded.as_bytes()).unwrap(), data);
        }
    }
}
