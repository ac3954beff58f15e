#![doc = include_str!("../README.md")]

use ferry_codec as codec;

mod de;
mod ser;

// -----------------------------------------------------------------------------
// Flags

/// Flags controlling JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendFlags(u32);

impl AppendFlags {
    /// No flags set.
    pub const NONE: AppendFlags = AppendFlags(0);

    /// Escape `<`, `>`, and `&` so the output can be embedded in HTML.
    pub const ESCAPE_HTML: AppendFlags = AppendFlags(1 << 0);

    pub const fn contains(self, other: AppendFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for AppendFlags {
    type Output = AppendFlags;

    fn bitor(self, rhs: AppendFlags) -> AppendFlags {
        AppendFlags(self.0 | rhs.0)
    }
}

// -----------------------------------------------------------------------------
// Entry points

/// Appends the JSON encoding of `value` to `out`.
///
/// On error `out` is truncated back to its original length, so a failed
/// append never leaves partial output behind.
pub fn append(
    out: &mut Vec<u8>,
    value: &dyn codec::Serialize,
    flags: AppendFlags,
) -> Result<(), codec::Error> {
    let start = out.len();
    let mut encoder = ser::Encoder::new(out, flags);
    match value.serialize(&mut encoder) {
        Ok(()) => Ok(()),
        Err(err) => {
            out.truncate(start);
            Err(err)
        }
    }
}

/// Parses one JSON value from the front of `input` into `value` and returns
/// the unconsumed remainder.
pub fn parse<'a>(
    input: &'a [u8],
    value: &mut dyn codec::Deserialize,
) -> Result<&'a [u8], codec::Error> {
    let mut decoder = de::Decoder::new(input);
    value.deserialize(&mut decoder)?;
    Ok(decoder.rest())
}

/// Serializes `value` to a JSON byte vector with HTML escaping enabled.
///
/// # Examples
///
/// ```
/// use ferry_codec::CodecRegistry;
///
/// let registry = CodecRegistry::new();
/// let bytes = ferry_json::to_vec(&vec![1_i32, 2, 3], &registry)?;
/// assert_eq!(bytes, b"[1,2,3]");
/// # Ok::<(), ferry_codec::Error>(())
/// ```
pub fn to_vec<T: codec::Described>(
    value: &T,
    registry: &codec::CodecRegistry,
) -> Result<Vec<u8>, codec::Error> {
    let mut out = Vec::new();
    append(&mut out, &registry.serializer(value), AppendFlags::ESCAPE_HTML)?;
    Ok(out)
}

/// Deserializes a value of type `T` from `input`, requiring that nothing but
/// whitespace follows the value.
pub fn from_slice<T: codec::Described>(
    input: &[u8],
    registry: &codec::CodecRegistry,
) -> Result<T, codec::Error> {
    let mut value = T::default();
    let rest = parse(input, &mut registry.deserializer(&mut value))?;
    let rest = de::skip_spaces(rest);
    if let Some(&b) = rest.first() {
        return Err(codec::Error::syntax(
            format!("invalid character '{}' after top-level value", b as char),
            de::prefix(rest),
        ));
    }
    Ok(value)
}
