//! JSON encoding.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ferry_codec as codec;

use codec::{Error, MapSink, RecordSink, SeqSink, Serialize, Shape};

use crate::AppendFlags;

// Nesting deeper than this is assumed to be a cycle through shared state
// rather than a legitimate document.
const MAX_DEPTH: u32 = 1000;

// -----------------------------------------------------------------------------
// Encoder

pub(crate) struct Encoder<'a> {
    out: &'a mut Vec<u8>,
    flags: AppendFlags,
    depth: u32,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>, flags: AppendFlags) -> Self {
        Self {
            out,
            flags,
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), Error> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::Cycle);
        }
        self.depth += 1;
        Ok(())
    }

    fn escape_html(&self) -> bool {
        self.flags.contains(AppendFlags::ESCAPE_HTML)
    }
}

macro_rules! encode_signed {
    ($($method:ident: $ty:ty;)*) => {
        $(
            fn $method(&mut self, v: $ty) -> Result<(), Error> {
                push_i64(self.out, v as i64);
                Ok(())
            }
        )*
    };
}

macro_rules! encode_unsigned {
    ($($method:ident: $ty:ty;)*) => {
        $(
            fn $method(&mut self, v: $ty) -> Result<(), Error> {
                push_u64(self.out, v as u64);
                Ok(())
            }
        )*
    };
}

impl codec::Encoder for Encoder<'_> {
    fn encode_nil(&mut self) -> Result<(), Error> {
        self.out.extend_from_slice(b"null");
        Ok(())
    }

    fn encode_bool(&mut self, v: bool) -> Result<(), Error> {
        self.out
            .extend_from_slice(if v { &b"true"[..] } else { &b"false"[..] });
        Ok(())
    }

    encode_signed! {
        encode_i8: i8;
        encode_i16: i16;
        encode_i32: i32;
        encode_i64: i64;
        encode_isize: isize;
    }

    encode_unsigned! {
        encode_u8: u8;
        encode_u16: u16;
        encode_u32: u32;
        encode_u64: u64;
        encode_usize: usize;
    }

    fn encode_f32(&mut self, v: f32) -> Result<(), Error> {
        push_f32(self.out, v)
    }

    fn encode_f64(&mut self, v: f64) -> Result<(), Error> {
        push_f64(self.out, v)
    }

    fn encode_str(&mut self, v: &str) -> Result<(), Error> {
        push_string(self.out, v, self.escape_html());
        Ok(())
    }

    fn encode_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        // Base64 output never needs escaping.
        self.out.push(b'"');
        let encoded = STANDARD.encode(v);
        self.out.extend_from_slice(encoded.as_bytes());
        self.out.push(b'"');
        Ok(())
    }

    fn encode_seq(&mut self, _len: Option<usize>) -> Result<Box<dyn SeqSink + '_>, Error> {
        self.enter()?;
        self.out.push(b'[');
        Ok(Box::new(ContainerSink {
            enc: self,
            first: true,
            close: b']',
        }))
    }

    fn encode_map(&mut self, _len: Option<usize>) -> Result<Box<dyn MapSink + '_>, Error> {
        self.enter()?;
        self.out.push(b'{');
        Ok(Box::new(ContainerSink {
            enc: self,
            first: true,
            close: b'}',
        }))
    }

    fn encode_struct(&mut self, _name: &str) -> Result<Box<dyn RecordSink + '_>, Error> {
        self.enter()?;
        self.out.push(b'{');
        Ok(Box::new(ContainerSink {
            enc: self,
            first: true,
            close: b'}',
        }))
    }
}

// -----------------------------------------------------------------------------
// Sinks

struct ContainerSink<'a, 'b> {
    enc: &'a mut Encoder<'b>,
    first: bool,
    close: u8,
}

impl ContainerSink<'_, '_> {
    fn comma(&mut self) {
        if self.first {
            self.first = false;
        } else {
            self.enc.out.push(b',');
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        self.enc.out.push(self.close);
        self.enc.depth -= 1;
        Ok(())
    }
}

impl SeqSink for ContainerSink<'_, '_> {
    fn element(&mut self, value: &dyn Serialize) -> Result<(), Error> {
        self.comma();
        value.serialize(&mut *self.enc)
    }

    fn end(&mut self) -> Result<(), Error> {
        self.close()
    }
}

impl MapSink for ContainerSink<'_, '_> {
    fn entry(&mut self, key: &dyn Serialize, value: &dyn Serialize) -> Result<(), Error> {
        self.comma();
        key.serialize(&mut KeyEncoder {
            enc: &mut *self.enc,
        })?;
        self.enc.out.push(b':');
        value.serialize(&mut *self.enc)
    }

    fn end(&mut self) -> Result<(), Error> {
        self.close()
    }
}

impl RecordSink for ContainerSink<'_, '_> {
    fn field(&mut self, name: &str, value: &dyn Serialize) -> Result<(), Error> {
        self.comma();
        let escape_html = self.enc.escape_html();
        push_string(self.enc.out, name, escape_html);
        self.enc.out.push(b':');
        value.serialize(&mut *self.enc)
    }

    fn end(&mut self) -> Result<(), Error> {
        self.close()
    }
}

// -----------------------------------------------------------------------------
// Map keys

/// Object keys must be strings; integer keys are quoted, everything else is
/// rejected.
struct KeyEncoder<'a, 'b> {
    enc: &'a mut Encoder<'b>,
}

impl KeyEncoder<'_, '_> {
    fn quoted_i64(&mut self, v: i64) -> Result<(), Error> {
        self.enc.out.push(b'"');
        push_i64(self.enc.out, v);
        self.enc.out.push(b'"');
        Ok(())
    }

    fn quoted_u64(&mut self, v: u64) -> Result<(), Error> {
        self.enc.out.push(b'"');
        push_u64(self.enc.out, v);
        self.enc.out.push(b'"');
        Ok(())
    }
}

macro_rules! key_signed {
    ($($method:ident: $ty:ty;)*) => {
        $(
            fn $method(&mut self, v: $ty) -> Result<(), Error> {
                self.quoted_i64(v as i64)
            }
        )*
    };
}

macro_rules! key_unsigned {
    ($($method:ident: $ty:ty;)*) => {
        $(
            fn $method(&mut self, v: $ty) -> Result<(), Error> {
                self.quoted_u64(v as u64)
            }
        )*
    };
}

impl codec::Encoder for KeyEncoder<'_, '_> {
    fn encode_nil(&mut self) -> Result<(), Error> {
        Err(Error::map_key(Shape::Nil))
    }

    fn encode_bool(&mut self, _v: bool) -> Result<(), Error> {
        Err(Error::map_key(Shape::Bool))
    }

    key_signed! {
        encode_i8: i8;
        encode_i16: i16;
        encode_i32: i32;
        encode_i64: i64;
        encode_isize: isize;
    }

    key_unsigned! {
        encode_u8: u8;
        encode_u16: u16;
        encode_u32: u32;
        encode_u64: u64;
        encode_usize: usize;
    }

    fn encode_f32(&mut self, _v: f32) -> Result<(), Error> {
        Err(Error::map_key(Shape::F32))
    }

    fn encode_f64(&mut self, _v: f64) -> Result<(), Error> {
        Err(Error::map_key(Shape::F64))
    }

    fn encode_str(&mut self, v: &str) -> Result<(), Error> {
        push_string(self.enc.out, v, self.enc.escape_html());
        Ok(())
    }

    fn encode_bytes(&mut self, _v: &[u8]) -> Result<(), Error> {
        Err(Error::map_key(Shape::Bytes))
    }

    fn encode_seq(&mut self, _len: Option<usize>) -> Result<Box<dyn SeqSink + '_>, Error> {
        Err(Error::map_key(Shape::Seq))
    }

    fn encode_map(&mut self, _len: Option<usize>) -> Result<Box<dyn MapSink + '_>, Error> {
        Err(Error::map_key(Shape::Map))
    }

    fn encode_struct(&mut self, _name: &str) -> Result<Box<dyn RecordSink + '_>, Error> {
        Err(Error::map_key(Shape::Record))
    }
}

// -----------------------------------------------------------------------------
// Scalars

fn push_u64(out: &mut Vec<u8>, mut v: u64) {
    let mut buf = [0u8; 20];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    out.extend_from_slice(&buf[i..]);
}

fn push_i64(out: &mut Vec<u8>, v: i64) {
    if v < 0 {
        out.push(b'-');
    }
    push_u64(out, v.unsigned_abs());
}

fn push_f64(out: &mut Vec<u8>, v: f64) -> Result<(), Error> {
    if v.is_nan() {
        return Err(Error::unsupported_value("NaN"));
    }
    if v.is_infinite() {
        return Err(Error::unsupported_value("inf"));
    }
    let abs = v.abs();
    if abs != 0.0 && (abs < 1e-6 || abs >= 1e21) {
        push_exponent(out, format!("{v:e}"));
    } else {
        out.extend_from_slice(format!("{v}").as_bytes());
    }
    Ok(())
}

fn push_f32(out: &mut Vec<u8>, v: f32) -> Result<(), Error> {
    if v.is_nan() {
        return Err(Error::unsupported_value("NaN"));
    }
    if v.is_infinite() {
        return Err(Error::unsupported_value("inf"));
    }
    let abs = v.abs();
    if abs != 0.0 && (abs < 1e-6_f32 || abs >= 1e21_f32) {
        push_exponent(out, format!("{v:e}"));
    } else {
        out.extend_from_slice(format!("{v}").as_bytes());
    }
    Ok(())
}

// The `{:e}` format omits the sign on positive exponents; ES6 number syntax
// wants it back.
fn push_exponent(out: &mut Vec<u8>, s: String) {
    match s.find('e') {
        Some(pos) if s.as_bytes().get(pos + 1) != Some(&b'-') => {
            out.extend_from_slice(&s.as_bytes()[..=pos]);
            out.push(b'+');
            out.extend_from_slice(&s.as_bytes()[pos + 1..]);
        }
        _ => out.extend_from_slice(s.as_bytes()),
    }
}

// -----------------------------------------------------------------------------
// Strings

fn push_string(out: &mut Vec<u8>, s: &str, escape_html: bool) {
    out.push(b'"');
    escape_into(out, s, escape_html);
    out.push(b'"');
}

fn escape_into(out: &mut Vec<u8>, s: &str, escape_html: bool) {
    let bytes = s.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b @ (b'"' | b'\\') => {
                out.extend_from_slice(&bytes[start..i]);
                out.push(b'\\');
                out.push(b);
                i += 1;
                start = i;
            }
            b'\n' => {
                out.extend_from_slice(&bytes[start..i]);
                out.extend_from_slice(b"\\n");
                i += 1;
                start = i;
            }
            b'\r' => {
                out.extend_from_slice(&bytes[start..i]);
                out.extend_from_slice(b"\\r");
                i += 1;
                start = i;
            }
            b'\t' => {
                out.extend_from_slice(&bytes[start..i]);
                out.extend_from_slice(b"\\t");
                i += 1;
                start = i;
            }
            b @ 0x00..=0x1f => {
                out.extend_from_slice(&bytes[start..i]);
                push_unicode_escape(out, u16::from(b));
                i += 1;
                start = i;
            }
            b @ (b'<' | b'>' | b'&') if escape_html => {
                out.extend_from_slice(&bytes[start..i]);
                push_unicode_escape(out, u16::from(b));
                i += 1;
                start = i;
            }
            // U+2028 and U+2029 are valid JSON but break JavaScript string
            // literals.
            0xe2 if bytes.get(i + 1) == Some(&0x80)
                && matches!(bytes.get(i + 2), Some(&0xa8) | Some(&0xa9)) =>
            {
                out.extend_from_slice(&bytes[start..i]);
                out.extend_from_slice(if bytes[i + 2] == 0xa8 {
                    b"\\u2028"
                } else {
                    b"\\u2029"
                });
                i += 3;
                start = i;
            }
            _ => i += 1,
        }
    }
    out.extend_from_slice(&bytes[start..]);
}

fn push_unicode_escape(out: &mut Vec<u8>, code: u16) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.extend_from_slice(b"\\u");
    out.push(HEX[(code >> 12) as usize & 0xf]);
    out.push(HEX[(code >> 8) as usize & 0xf]);
    out.push(HEX[(code >> 4) as usize & 0xf]);
    out.push(HEX[code as usize & 0xf]);
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_str(v: f64) -> String {
        let mut out = Vec::new();
        push_f64(&mut out, v).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn escaped(s: &str, escape_html: bool) -> String {
        let mut out = Vec::new();
        push_string(&mut out, s, escape_html);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn floats_switch_to_exponent_form_outside_the_band() {
        assert_eq!(f64_str(0.0), "0");
        assert_eq!(f64_str(-2.5), "-2.5");
        assert_eq!(f64_str(0.000001), "0.000001");
        assert_eq!(f64_str(0.0000005), "5e-7");
        assert_eq!(f64_str(1e20), "100000000000000000000");
        assert_eq!(f64_str(1e21), "1e+21");
        assert_eq!(f64_str(-1e21), "-1e+21");
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let mut out = Vec::new();
        assert!(push_f64(&mut out, f64::NAN).is_err());
        assert!(push_f64(&mut out, f64::INFINITY).is_err());
        assert!(push_f32(&mut out, f32::NEG_INFINITY).is_err());
    }

    #[test]
    fn f32_band_uses_f32_limits() {
        let mut out = Vec::new();
        push_f32(&mut out, 0.25_f32).unwrap();
        assert_eq!(out, b"0.25");
    }

    #[test]
    fn integer_extremes() {
        let mut out = Vec::new();
        push_i64(&mut out, i64::MIN);
        out.push(b' ');
        push_u64(&mut out, u64::MAX);
        assert_eq!(out, b"-9223372036854775808 18446744073709551615");
    }

    #[test]
    fn string_escapes() {
        assert_eq!(escaped("plain", false), r#""plain""#);
        assert_eq!(escaped("a\"b\\c", false), r#""a\"b\\c""#);
        assert_eq!(escaped("line\nbreak\ttab", false), r#""line\nbreak\ttab""#);
        assert_eq!(escaped("\u{1}", false), r#""\u0001""#);
        assert_eq!(escaped("caf\u{e9}", false), "\"caf\u{e9}\"");
        assert_eq!(escaped("\u{2028}", false), r#""\u2028""#);
        assert_eq!(escaped("x\u{2029}y", false), r#""x\u2029y""#);
    }

    #[test]
    fn html_escaping_is_flag_gated() {
        assert_eq!(escaped("a<b>&c", false), r#""a<b>&c""#);
        assert_eq!(escaped("a<b>&c", true), r#""a\u003cb\u003e\u0026c""#);
    }
}
