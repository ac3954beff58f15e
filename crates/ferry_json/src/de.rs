//! JSON decoding.

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ferry_codec as codec;

use codec::{Deserialize, Error, MapSource, SeqSource, Visitor};

pub(crate) fn skip_spaces(input: &[u8]) -> &[u8] {
    let mut i = 0;
    while matches!(input.get(i), Some(&(b' ' | b'\t' | b'\n' | b'\r'))) {
        i += 1;
    }
    &input[i..]
}

/// A short prefix of the remaining input, for error context.
pub(crate) fn prefix(input: &[u8]) -> String {
    if input.len() < 32 {
        String::from_utf8_lossy(input).into_owned()
    } else {
        format!("{}...", String::from_utf8_lossy(&input[..32]))
    }
}

fn end_of_input() -> Error {
    Error::syntax("unexpected end of JSON input", "")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumKind {
    Uint,
    Int,
    Float,
}

// -----------------------------------------------------------------------------
// Decoder

pub(crate) struct Decoder<'de> {
    input: &'de [u8],
}

impl<'de> Decoder<'de> {
    pub(crate) fn new(input: &'de [u8]) -> Self {
        Self { input }
    }

    pub(crate) fn rest(&self) -> &'de [u8] {
        self.input
    }

    fn peek(&mut self) -> Option<u8> {
        self.input = skip_spaces(self.input);
        self.input.first().copied()
    }

    fn bump(&mut self, n: usize) {
        self.input = &self.input[n..];
    }

    fn literal(&mut self, lit: &'static str) -> Result<(), Error> {
        let bytes = lit.as_bytes();
        if self.input.starts_with(bytes) {
            self.bump(bytes.len());
            return Ok(());
        }
        match self.input.iter().zip(bytes).find(|(a, b)| a != b) {
            Some((&got, _)) => Err(Error::syntax(
                format!("invalid character '{}' in literal {lit}", got as char),
                prefix(self.input),
            )),
            None => Err(end_of_input()),
        }
    }

    /// Consumes one number token, validating the JSON grammar. The returned
    /// kind is `Uint` for plain digits, `Int` for a leading minus, and
    /// `Float` when a fraction or exponent appears.
    fn number_token(&mut self) -> Result<(&'de str, NumKind), Error> {
        let start = self.input;
        let mut i = 0;
        let mut kind = NumKind::Uint;
        if start.get(i).copied() == Some(b'-') {
            kind = NumKind::Int;
            i += 1;
        }
        match start.get(i).copied() {
            Some(b'0') => i += 1,
            Some(b'1'..=b'9') => {
                while matches!(start.get(i).copied(), Some(b'0'..=b'9')) {
                    i += 1;
                }
            }
            Some(c) => {
                return Err(Error::syntax(
                    format!("invalid character '{}' in numeric literal", c as char),
                    prefix(start),
                ));
            }
            None => return Err(end_of_input()),
        }
        if start.get(i).copied() == Some(b'.') {
            kind = NumKind::Float;
            i += 1;
            match start.get(i).copied() {
                Some(b'0'..=b'9') => {
                    while matches!(start.get(i).copied(), Some(b'0'..=b'9')) {
                        i += 1;
                    }
                }
                Some(c) => {
                    return Err(Error::syntax(
                        format!(
                            "invalid character '{}' after decimal point in numeric literal",
                            c as char
                        ),
                        prefix(start),
                    ));
                }
                None => return Err(end_of_input()),
            }
        }
        if matches!(start.get(i).copied(), Some(b'e' | b'E')) {
            kind = NumKind::Float;
            i += 1;
            if matches!(start.get(i).copied(), Some(b'+' | b'-')) {
                i += 1;
            }
            match start.get(i).copied() {
                Some(b'0'..=b'9') => {
                    while matches!(start.get(i).copied(), Some(b'0'..=b'9')) {
                        i += 1;
                    }
                }
                Some(c) => {
                    return Err(Error::syntax(
                        format!(
                            "invalid character '{}' in exponent of numeric literal",
                            c as char
                        ),
                        prefix(start),
                    ));
                }
                None => return Err(end_of_input()),
            }
        }
        let tok = &start[..i];
        self.input = &start[i..];
        // Number tokens are ASCII by construction.
        Ok((std::str::from_utf8(tok).unwrap_or(""), kind))
    }

    /// Consumes one string token, including the quotes. Escape-free strings
    /// borrow from the input.
    fn parse_string(&mut self) -> Result<Cow<'de, str>, Error> {
        let bytes = &self.input[1..];
        let mut i = 0;
        let mut has_escape = false;
        loop {
            match bytes.get(i).copied() {
                None => return Err(end_of_input()),
                Some(b'"') => break,
                Some(b'\\') => {
                    has_escape = true;
                    i += 2;
                }
                Some(_) => i += 1,
            }
        }
        let content = &bytes[..i];
        self.input = &bytes[i + 1..];
        if !has_escape {
            return Ok(String::from_utf8_lossy(content));
        }
        Ok(Cow::Owned(unescape(content)?))
    }
}

macro_rules! decode_int_hint {
    ($($method:ident: $ty:ty => $visit:ident;)*) => {
        $(
            fn $method(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
                match self.peek() {
                    Some(b'-' | b'0'..=b'9') => {
                        let (tok, kind) = self.number_token()?;
                        if kind == NumKind::Float {
                            return Err(Error::mismatch_value(
                                format!("number {tok}"),
                                visitor.expecting(),
                            ));
                        }
                        let v: $ty = tok
                            .parse()
                            .map_err(|_| Error::overflow(tok, stringify!($ty)))?;
                        visitor.$visit(v)
                    }
                    _ => self.decode_any(visitor),
                }
            }
        )*
    };
}

macro_rules! decode_float_hint {
    ($($method:ident: $ty:ty => $visit:ident;)*) => {
        $(
            fn $method(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
                match self.peek() {
                    Some(b'-' | b'0'..=b'9') => {
                        let (tok, _) = self.number_token()?;
                        let v: $ty = tok
                            .parse()
                            .map_err(|_| Error::overflow(tok, stringify!($ty)))?;
                        if v.is_infinite() {
                            return Err(Error::overflow(tok, stringify!($ty)));
                        }
                        visitor.$visit(v)
                    }
                    _ => self.decode_any(visitor),
                }
            }
        )*
    };
}

impl codec::Decoder for Decoder<'_> {
    fn decode_any(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        let Some(b) = self.peek() else {
            return Err(end_of_input());
        };
        match b {
            b'{' => {
                self.bump(1);
                visitor.visit_map(&mut JsonMapSource {
                    de: self,
                    first: true,
                })
            }
            b'[' => {
                self.bump(1);
                visitor.visit_seq(&mut JsonSeqSource {
                    de: self,
                    first: true,
                })
            }
            b'"' => {
                let s = self.parse_string()?;
                visitor.visit_str(&s)
            }
            b'n' => {
                self.literal("null")?;
                visitor.visit_nil()
            }
            b't' => {
                self.literal("true")?;
                visitor.visit_bool(true)
            }
            b'f' => {
                self.literal("false")?;
                visitor.visit_bool(false)
            }
            b'-' | b'0'..=b'9' => {
                let (tok, kind) = self.number_token()?;
                match kind {
                    NumKind::Uint => {
                        let v = tok.parse().map_err(|_| Error::overflow(tok, "u64"))?;
                        visitor.visit_u64(v)
                    }
                    NumKind::Int => {
                        let v = tok.parse().map_err(|_| Error::overflow(tok, "i64"))?;
                        visitor.visit_i64(v)
                    }
                    NumKind::Float => {
                        let v: f64 = tok.parse().map_err(|_| Error::overflow(tok, "f64"))?;
                        if v.is_infinite() {
                            return Err(Error::overflow(tok, "f64"));
                        }
                        visitor.visit_f64(v)
                    }
                }
            }
            c => Err(Error::syntax(
                format!("invalid character '{}' looking for beginning of value", c as char),
                prefix(self.input),
            )),
        }
    }

    fn decode_nil(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        match self.peek() {
            Some(b'n') => {
                self.literal("null")?;
                visitor.visit_nil()
            }
            _ => self.decode_any(visitor),
        }
    }

    fn decode_bool(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        match self.peek() {
            Some(b't') => {
                self.literal("true")?;
                visitor.visit_bool(true)
            }
            Some(b'f') => {
                self.literal("false")?;
                visitor.visit_bool(false)
            }
            _ => self.decode_any(visitor),
        }
    }

    decode_int_hint! {
        decode_i8: i8 => visit_i8;
        decode_i16: i16 => visit_i16;
        decode_i32: i32 => visit_i32;
        decode_i64: i64 => visit_i64;
        decode_isize: isize => visit_isize;
        decode_u8: u8 => visit_u8;
        decode_u16: u16 => visit_u16;
        decode_u32: u32 => visit_u32;
        decode_u64: u64 => visit_u64;
        decode_usize: usize => visit_usize;
    }

    decode_float_hint! {
        decode_f32: f32 => visit_f32;
        decode_f64: f64 => visit_f64;
    }

    fn decode_str(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        match self.peek() {
            Some(b'"') => {
                let s = self.parse_string()?;
                visitor.visit_str(&s)
            }
            _ => self.decode_any(visitor),
        }
    }

    fn decode_bytes(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        match self.peek() {
            Some(b'n') => {
                self.literal("null")?;
                visitor.visit_nil()
            }
            Some(b'"') => {
                let s = self.parse_string()?;
                let decoded = STANDARD
                    .decode(s.as_bytes())
                    .map_err(|err| {
                        Error::syntax(
                            format!("invalid base64 byte string: {err}"),
                            prefix(s.as_bytes()),
                        )
                    })?;
                visitor.visit_bytes(&decoded)
            }
            Some(b'[') => {
                self.bump(1);
                visitor.visit_seq(&mut JsonSeqSource {
                    de: self,
                    first: true,
                })
            }
            _ => self.decode_any(visitor),
        }
    }

    fn decode_option(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        match self.peek() {
            Some(b'n') => {
                self.literal("null")?;
                visitor.visit_nil()
            }
            _ => visitor.visit_some(self),
        }
    }

    fn as_decoder(&mut self) -> &mut dyn codec::Decoder {
        self
    }
}

// -----------------------------------------------------------------------------
// Containers

struct JsonSeqSource<'a, 'de> {
    de: &'a mut Decoder<'de>,
    first: bool,
}

impl SeqSource for JsonSeqSource<'_, '_> {
    fn size_hint(&self) -> Option<usize> {
        None
    }

    fn next_element(&mut self, element: &mut dyn Deserialize) -> Result<bool, Error> {
        let Some(b) = self.de.peek() else {
            return Err(Error::syntax(
                "missing closing ']' after array value",
                prefix(self.de.input),
            ));
        };
        if b == b']' {
            self.de.bump(1);
            return Ok(false);
        }
        if !self.first {
            if b != b',' {
                return Err(Error::syntax(
                    format!("expected ',' after array element but found '{}'", b as char),
                    prefix(self.de.input),
                ));
            }
            self.de.bump(1);
            if self.de.peek() == Some(b']') {
                return Err(Error::syntax(
                    "unexpected trailing comma after array element",
                    prefix(self.de.input),
                ));
            }
        }
        self.first = false;
        element.deserialize(&mut *self.de)?;
        Ok(true)
    }
}

struct JsonMapSource<'a, 'de> {
    de: &'a mut Decoder<'de>,
    first: bool,
}

impl MapSource for JsonMapSource<'_, '_> {
    fn size_hint(&self) -> Option<usize> {
        None
    }

    fn next_key(&mut self, key: &mut dyn Deserialize) -> Result<bool, Error> {
        let Some(b) = self.de.peek() else {
            return Err(Error::syntax("cannot decode object from empty input", ""));
        };
        if b == b'}' {
            self.de.bump(1);
            return Ok(false);
        }
        if !self.first {
            if b != b',' {
                return Err(Error::syntax(
                    format!(
                        "expected ',' after object field value but found '{}'",
                        b as char
                    ),
                    prefix(self.de.input),
                ));
            }
            self.de.bump(1);
            if self.de.peek() == Some(b'}') {
                return Err(Error::syntax(
                    "unexpected trailing comma after object field",
                    prefix(self.de.input),
                ));
            }
        }
        self.first = false;
        key.deserialize(&mut KeyDecoder { de: self.de })?;
        Ok(true)
    }

    fn next_value(&mut self, value: &mut dyn Deserialize) -> Result<(), Error> {
        match self.de.peek() {
            Some(b':') => {
                self.de.bump(1);
                value.deserialize(&mut *self.de)
            }
            Some(c) => Err(Error::syntax(
                format!("expected ':' after object field key but found '{}'", c as char),
                prefix(self.de.input),
            )),
            None => Err(end_of_input()),
        }
    }
}

// -----------------------------------------------------------------------------
// Object keys

/// Decodes object keys: strings pass through, integer destinations parse the
/// quoted decimal, everything else fails as a string mismatch.
struct KeyDecoder<'a, 'de> {
    de: &'a mut Decoder<'de>,
}

impl<'de> KeyDecoder<'_, 'de> {
    fn quoted(&mut self) -> Result<Cow<'de, str>, Error> {
        match self.de.peek() {
            Some(b'"') => self.de.parse_string(),
            Some(c) => Err(Error::syntax(
                format!(
                    "invalid character '{}' looking for beginning of object key string",
                    c as char
                ),
                prefix(self.de.input),
            )),
            None => Err(end_of_input()),
        }
    }
}

macro_rules! key_int_hint {
    ($($method:ident: $ty:ty => $visit:ident;)*) => {
        $(
            fn $method(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
                let s = self.quoted()?;
                let v: $ty = s
                    .parse()
                    .map_err(|_| Error::mismatch_value(format!("number {s}"), visitor.expecting()))?;
                visitor.$visit(v)
            }
        )*
    };
}

impl codec::Decoder for KeyDecoder<'_, '_> {
    fn decode_any(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        let s = self.quoted()?;
        visitor.visit_str(&s)
    }

    fn decode_str(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    key_int_hint! {
        decode_i8: i8 => visit_i8;
        decode_i16: i16 => visit_i16;
        decode_i32: i32 => visit_i32;
        decode_i64: i64 => visit_i64;
        decode_isize: isize => visit_isize;
        decode_u8: u8 => visit_u8;
        decode_u16: u16 => visit_u16;
        decode_u32: u32 => visit_u32;
        decode_u64: u64 => visit_u64;
        decode_usize: usize => visit_usize;
    }

    fn as_decoder(&mut self) -> &mut dyn codec::Decoder {
        self
    }
}

// -----------------------------------------------------------------------------
// String escapes

fn unescape(content: &[u8]) -> Result<String, Error> {
    let mut s = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(pos) = rest.iter().position(|&b| b == b'\\') {
        s.push_str(&String::from_utf8_lossy(&rest[..pos]));
        let consumed = match rest[pos + 1] {
            b'"' => {
                s.push('"');
                2
            }
            b'\\' => {
                s.push('\\');
                2
            }
            b'/' => {
                s.push('/');
                2
            }
            b'b' => {
                s.push('\u{8}');
                2
            }
            b'f' => {
                s.push('\u{c}');
                2
            }
            b'n' => {
                s.push('\n');
                2
            }
            b'r' => {
                s.push('\r');
                2
            }
            b't' => {
                s.push('\t');
                2
            }
            b'u' => unescape_unicode(&rest[pos..], &mut s)?,
            other => {
                return Err(Error::syntax(
                    format!("invalid character '{}' in string escape code", other as char),
                    prefix(&rest[pos..]),
                ));
            }
        };
        rest = &rest[pos + consumed..];
    }
    s.push_str(&String::from_utf8_lossy(rest));
    Ok(s)
}

/// Decodes a `\uXXXX` escape, pairing surrogates when possible and mapping
/// unpaired surrogates to U+FFFD. Returns the bytes consumed.
fn unescape_unicode(input: &[u8], s: &mut String) -> Result<usize, Error> {
    let hi = parse_hex4(input.get(2..6))?;
    if (0xdc00..0xe000).contains(&hi) {
        s.push('\u{fffd}');
        return Ok(6);
    }
    if (0xd800..0xdc00).contains(&hi) {
        if input.get(6..8) == Some(&b"\\u"[..]) {
            if let Ok(lo) = parse_hex4(input.get(8..12)) {
                if (0xdc00..0xe000).contains(&lo) {
                    let cp = 0x10000 + ((u32::from(hi) - 0xd800) << 10) + (u32::from(lo) - 0xdc00);
                    s.push(char::from_u32(cp).unwrap_or('\u{fffd}'));
                    return Ok(12);
                }
            }
        }
        s.push('\u{fffd}');
        return Ok(6);
    }
    s.push(char::from_u32(u32::from(hi)).unwrap_or('\u{fffd}'));
    Ok(6)
}

fn parse_hex4(digits: Option<&[u8]>) -> Result<u16, Error> {
    let digits = digits.ok_or_else(end_of_input)?;
    let mut v = 0u16;
    for &b in digits {
        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => {
                return Err(Error::syntax(
                    format!(
                        "invalid character '{}' in \\u hexadecimal character escape",
                        b as char
                    ),
                    prefix(digits),
                ));
            }
        };
        v = v << 4 | u16::from(d);
    }
    Ok(v)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn string_of(input: &str) -> Cow<'_, str> {
        let mut de = Decoder::new(input.as_bytes());
        assert_eq!(de.peek(), Some(b'"'));
        de.parse_string().unwrap()
    }

    #[test]
    fn plain_strings_borrow() {
        let s = string_of(r#""hello""#);
        assert_eq!(s, "hello");
        assert!(matches!(s, Cow::Borrowed(_)));
    }

    #[test]
    fn escape_sequences_decode() {
        assert_eq!(string_of(r#""a\nb""#), "a\nb");
        assert_eq!(string_of(r#""é""#), "\u{e9}");
        assert_eq!(string_of(r#""😀""#), "\u{1f600}");
        assert_eq!(string_of(r#""\u00e9""#), "\u{e9}");
        assert_eq!(string_of(r#""\ud83d\ude00""#), "\u{1f600}");
        assert_eq!(string_of(r#""\ud800x""#), "\u{fffd}x");
        assert_eq!(string_of(r#""\udc00""#), "\u{fffd}");
        assert_eq!(string_of(r#""slash\/quote\"""#), "slash/quote\"");
    }

    #[test]
    fn number_tokens_carry_their_kind() {
        let mut de = Decoder::new(b"42 ");
        assert_eq!(de.number_token().unwrap(), ("42", NumKind::Uint));

        let mut de = Decoder::new(b"-7,");
        assert_eq!(de.number_token().unwrap(), ("-7", NumKind::Int));

        let mut de = Decoder::new(b"1.5e3]");
        assert_eq!(de.number_token().unwrap(), ("1.5e3", NumKind::Float));
        assert_eq!(de.rest(), b"]");

        let mut de = Decoder::new(b"01");
        assert_eq!(de.number_token().unwrap(), ("0", NumKind::Uint));

        let mut de = Decoder::new(b"1.");
        assert!(de.number_token().is_err());
    }

    #[test]
    fn prefix_truncates_long_input() {
        assert_eq!(prefix(b"short"), "short");
        let long = vec![b'x'; 40];
        assert_eq!(prefix(&long), format!("{}...", "x".repeat(32)));
    }
}
