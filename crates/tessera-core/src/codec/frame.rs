//! # Frame Wire Form
//!
//! A frame is a typed header block plus an ordered token payload:
//!
//! ```text
//! {KEY value;KEY value|token;*blob;token}
//! ```
//!
//! - Header entries are emitted in ascending key order, `TYPE` included.
//! - Header values and word tokens escape `\ { | } ; *` with a backslash.
//! - Blob tokens are `*` followed by unpadded URL-safe base64.
//!
//! `encode` is total and deterministic. `decode` accepts headers in any
//! order, so `encode(decode(s))` is the canonical form of `s`.

use crate::TesseraError;
use crate::primitives::{
    BLOB_SIGIL, ESCAPE, ESCAPED_CHARS, FIELD_SEP, FRAME_END, FRAME_START, KEY_VALUE_SEP,
    MAX_FRAME_LENGTH, PAYLOAD_SEP,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::BTreeMap;
use std::fmt;

/// The header that carries the frame type on the wire.
pub const TYPE_HEADER: &str = "TYPE";

// =============================================================================
// FRAME TYPE
// =============================================================================

/// Recognized frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameType {
    Summary,
    Fact,
    TrainPair,
}

impl FrameType {
    /// The `TYPE` header value for this frame type.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            FrameType::Summary => "SUMMARY",
            FrameType::Fact => "FACT",
            FrameType::TrainPair => "TRAIN_PAIR",
        }
    }

    /// Headers this type requires besides `TYPE`.
    #[must_use]
    pub const fn required_headers(self) -> &'static [&'static str] {
        match self {
            FrameType::Summary => &["SUMMARY_ID", "CONVO_ID", "CREATED_AT"],
            FrameType::Fact => &["FACT_ID", "CONFIDENCE", "SOURCE_CHUNK_ID"],
            FrameType::TrainPair => &["CREATED_AT", "SOURCE"],
        }
    }

    /// Resolve a `TYPE` header value.
    pub fn from_tag(tag: &str) -> Result<Self, TesseraError> {
        match tag {
            "SUMMARY" => Ok(FrameType::Summary),
            "FACT" => Ok(FrameType::Fact),
            "TRAIN_PAIR" => Ok(FrameType::TrainPair),
            other => Err(TesseraError::Schema(format!(
                "unrecognized frame type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// =============================================================================
// TOKENS
// =============================================================================

/// One payload token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// UTF-8 text. Never empty.
    Word(String),
    /// Arbitrary bytes.
    Blob(Vec<u8>),
}

impl Token {
    /// Create a word token.
    #[must_use]
    pub fn word(s: impl Into<String>) -> Self {
        Token::Word(s.into())
    }

    /// Create a blob token.
    #[must_use]
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Token::Blob(bytes.into())
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// A validated frame. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    headers: BTreeMap<String, String>,
    payload: Vec<Token>,
}

impl Frame {
    /// Build a frame, validating it against its type.
    ///
    /// # Errors
    ///
    /// Returns `TesseraError::Schema` if:
    /// - a key is not `[A-Z][A-Z0-9_]*`, is `TYPE`, or appears twice
    /// - a header required by `frame_type` is missing
    /// - a word token is empty
    /// - the encoded frame would exceed `MAX_FRAME_LENGTH`
    pub fn new<K, V>(
        frame_type: FrameType,
        headers: impl IntoIterator<Item = (K, V)>,
        payload: Vec<Token>,
    ) -> Result<Self, TesseraError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in headers {
            let key = key.into();
            if !is_header_key(&key) {
                return Err(TesseraError::Schema(format!(
                    "invalid header key '{}'",
                    key
                )));
            }
            if key == TYPE_HEADER {
                return Err(TesseraError::Schema(
                    "TYPE is carried by the frame type, not the header map".to_string(),
                ));
            }
            if map.insert(key.clone(), value.into()).is_some() {
                return Err(TesseraError::Schema(format!(
                    "duplicate header key '{}'",
                    key
                )));
            }
        }

        for required in frame_type.required_headers() {
            if !map.contains_key(*required) {
                return Err(TesseraError::Schema(format!(
                    "{} frame is missing required header {}",
                    frame_type, required
                )));
            }
        }

        if payload
            .iter()
            .any(|t| matches!(t, Token::Word(w) if w.is_empty()))
        {
            return Err(TesseraError::Schema("empty word token".to_string()));
        }

        let frame = Self {
            frame_type,
            headers: map,
            payload,
        };
        let length = frame.encoded_len();
        if length > MAX_FRAME_LENGTH {
            return Err(TesseraError::Schema(format!(
                "frame would encode to {} bytes, maximum is {}",
                length, MAX_FRAME_LENGTH
            )));
        }
        Ok(frame)
    }

    /// Byte length of `encode(self)`, computed without encoding.
    fn encoded_len(&self) -> usize {
        let escaped = |text: &str| {
            text.chars()
                .map(|c| {
                    if ESCAPED_CHARS.contains(&c) {
                        ESCAPE.len_utf8() + c.len_utf8()
                    } else {
                        c.len_utf8()
                    }
                })
                .sum::<usize>()
        };
        let headers: usize = self
            .headers
            .iter()
            .map(|(k, v)| k.len() + KEY_VALUE_SEP.len_utf8() + escaped(v))
            .sum::<usize>()
            + TYPE_HEADER.len()
            + KEY_VALUE_SEP.len_utf8()
            + escaped(self.frame_type.tag());
        let payload: usize = self
            .payload
            .iter()
            .map(|token| match token {
                Token::Word(text) => escaped(text),
                Token::Blob(bytes) => BLOB_SIGIL.len_utf8() + base64_len(bytes.len()),
            })
            .sum();
        // One separator between each pair of header entries and tokens.
        let separators = self.headers.len() + self.payload.len().saturating_sub(1);

        FRAME_START.len_utf8()
            + headers
            + PAYLOAD_SEP.len_utf8()
            + payload
            + separators * FIELD_SEP.len_utf8()
            + FRAME_END.len_utf8()
    }

    /// The frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// All headers except `TYPE`, sorted by key.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Look up one header value.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// The payload tokens in order.
    #[must_use]
    pub fn payload(&self) -> &[Token] {
        &self.payload
    }
}

/// Length of unpadded base64 for `n` input bytes.
fn base64_len(n: usize) -> usize {
    n / 3 * 4
        + match n % 3 {
            0 => 0,
            1 => 2,
            _ => 3,
        }
}

/// Header keys are uppercase ASCII identifiers.
fn is_header_key(key: &str) -> bool {
    let mut bytes = key.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode a frame to its canonical wire form.
#[must_use]
pub fn encode(frame: &Frame) -> String {
    let mut entries: Vec<(&str, &str)> = frame
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    entries.push((TYPE_HEADER, frame.frame_type.tag()));
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    out.push(FRAME_START);
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEP);
        }
        out.push_str(key);
        out.push(KEY_VALUE_SEP);
        escape_into(value, &mut out);
    }
    out.push(PAYLOAD_SEP);
    for (i, token) in frame.payload.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEP);
        }
        match token {
            Token::Word(text) => escape_into(text, &mut out),
            Token::Blob(bytes) => {
                out.push(BLOB_SIGIL);
                out.push_str(&URL_SAFE_NO_PAD.encode(bytes));
            }
        }
    }
    out.push(FRAME_END);
    out
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        if ESCAPED_CHARS.contains(&ch) {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode a frame from its wire form.
///
/// Surrounding ASCII whitespace is ignored and header entries may appear
/// in any order.
///
/// # Errors
///
/// - `TesseraError::Parse` for malformed delimiters, bad escapes, empty or
///   truncated tokens, invalid base64, duplicate keys, trailing input
/// - `TesseraError::Schema` for an unknown or missing `TYPE`, or a missing
///   required header
pub fn decode(input: &str) -> Result<Frame, TesseraError> {
    if input.len() > MAX_FRAME_LENGTH {
        return Err(TesseraError::parse(
            0,
            format!(
                "frame is {} bytes, maximum is {}",
                input.len(),
                MAX_FRAME_LENGTH
            ),
        ));
    }

    let mut cursor = Cursor::new(input.trim_matches(|c: char| c.is_ascii_whitespace()));
    cursor.expect(FRAME_START)?;

    // Header section: at least one entry, terminated by PAYLOAD_SEP.
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    loop {
        let at = cursor.pos;
        let key = cursor.read_key()?;
        cursor.expect(KEY_VALUE_SEP)?;
        let value = cursor.read_text(&[FIELD_SEP, PAYLOAD_SEP])?;
        if headers.insert(key.clone(), value).is_some() {
            return Err(TesseraError::parse(
                at,
                format!("duplicate header key '{}'", key),
            ));
        }
        match cursor.bump() {
            Some(FIELD_SEP) => continue,
            Some(PAYLOAD_SEP) => break,
            // read_text stops only at a terminator or end of input.
            _ => return Err(cursor.truncated()),
        }
    }

    // Payload section: zero or more tokens, terminated by FRAME_END.
    let mut payload = Vec::new();
    if cursor.peek() == Some(FRAME_END) {
        cursor.bump();
    } else {
        loop {
            payload.push(cursor.read_token()?);
            match cursor.bump() {
                Some(FIELD_SEP) => continue,
                Some(FRAME_END) => break,
                _ => return Err(cursor.truncated()),
            }
        }
    }

    if !cursor.at_end() {
        return Err(TesseraError::parse(
            cursor.pos,
            "trailing characters after frame end",
        ));
    }

    let tag = headers
        .remove(TYPE_HEADER)
        .ok_or_else(|| TesseraError::Schema("missing TYPE header".to_string()))?;
    let frame_type = FrameType::from_tag(&tag)?;
    Frame::new(frame_type, headers, payload)
}

/// Byte-offset cursor over frame text.
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn truncated(&self) -> TesseraError {
        TesseraError::parse(self.pos, "truncated frame")
    }

    fn expect(&mut self, want: char) -> Result<(), TesseraError> {
        match self.peek() {
            Some(ch) if ch == want => {
                self.bump();
                Ok(())
            }
            Some(ch) => Err(TesseraError::parse(
                self.pos,
                format!("expected '{}', found '{}'", want, ch),
            )),
            None => Err(self.truncated()),
        }
    }

    fn read_key(&mut self) -> Result<String, TesseraError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let key = &self.input[start..self.pos];
        if !is_header_key(key) {
            return Err(TesseraError::parse(start, "expected header key"));
        }
        Ok(key.to_string())
    }

    /// Read escaped text up to (not including) one of `terminators`.
    ///
    /// Any other unescaped delimiter is an error.
    fn read_text(&mut self, terminators: &[char]) -> Result<String, TesseraError> {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if terminators.contains(&ch) {
                return Ok(text);
            }
            let at = self.pos;
            self.bump();
            match ch {
                ESCAPE => match self.bump() {
                    Some(escaped) if ESCAPED_CHARS.contains(&escaped) => text.push(escaped),
                    Some(other) => {
                        return Err(TesseraError::parse(
                            at,
                            format!("invalid escape '\\{}'", other),
                        ));
                    }
                    None => return Err(TesseraError::parse(at, "truncated escape")),
                },
                FRAME_START | PAYLOAD_SEP | FRAME_END | FIELD_SEP => {
                    return Err(TesseraError::parse(
                        at,
                        format!("unexpected delimiter '{}'", ch),
                    ));
                }
                _ => text.push(ch),
            }
        }
        Err(self.truncated())
    }

    fn read_token(&mut self) -> Result<Token, TesseraError> {
        let start = self.pos;
        if self.peek() == Some(BLOB_SIGIL) {
            self.bump();
            let body_start = self.pos;
            while let Some(ch) = self.peek() {
                if ch == FIELD_SEP || ch == FRAME_END {
                    break;
                }
                self.bump();
            }
            let body = &self.input[body_start..self.pos];
            let bytes = URL_SAFE_NO_PAD
                .decode(body)
                .map_err(|e| TesseraError::parse(start, format!("invalid blob token: {}", e)))?;
            return Ok(Token::Blob(bytes));
        }

        let text = self.read_text(&[FIELD_SEP, FRAME_END])?;
        if text.is_empty() {
            return Err(TesseraError::parse(start, "empty token"));
        }
        Ok(Token::Word(text))
    }
}

// =============================================================================
// TESTS
// =============================================================================
