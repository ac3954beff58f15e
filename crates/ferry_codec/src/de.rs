use crate::error::Error;
use crate::shape::Shape;

// -----------------------------------------------------------------------------
// Visitor

/// The receiving side of a decode operation.
///
/// A [`Decoder`] parses one value from its input and fires exactly one
/// `visit_*` callback describing the shape it found. Every method has a
/// default body that fails with a shape mismatch naming [`expecting`], so a
/// concrete visitor overrides only the shapes it accepts.
///
/// [`expecting`]: Visitor::expecting
pub trait Visitor {
    /// A short description of the destination, used in mismatch errors.
    fn expecting(&self) -> &'static str;

    fn visit_nil(&mut self) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Nil, self.expecting()))
    }

    fn visit_bool(&mut self, _v: bool) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Bool, self.expecting()))
    }

    fn visit_i8(&mut self, _v: i8) -> Result<(), Error> {
        Err(Error::mismatch(Shape::I8, self.expecting()))
    }

    fn visit_i16(&mut self, _v: i16) -> Result<(), Error> {
        Err(Error::mismatch(Shape::I16, self.expecting()))
    }

    fn visit_i32(&mut self, _v: i32) -> Result<(), Error> {
        Err(Error::mismatch(Shape::I32, self.expecting()))
    }

    fn visit_i64(&mut self, _v: i64) -> Result<(), Error> {
        Err(Error::mismatch(Shape::I64, self.expecting()))
    }

    fn visit_isize(&mut self, _v: isize) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Isize, self.expecting()))
    }

    fn visit_u8(&mut self, _v: u8) -> Result<(), Error> {
        Err(Error::mismatch(Shape::U8, self.expecting()))
    }

    fn visit_u16(&mut self, _v: u16) -> Result<(), Error> {
        Err(Error::mismatch(Shape::U16, self.expecting()))
    }

    fn visit_u32(&mut self, _v: u32) -> Result<(), Error> {
        Err(Error::mismatch(Shape::U32, self.expecting()))
    }

    fn visit_u64(&mut self, _v: u64) -> Result<(), Error> {
        Err(Error::mismatch(Shape::U64, self.expecting()))
    }

    fn visit_usize(&mut self, _v: usize) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Usize, self.expecting()))
    }

    fn visit_f32(&mut self, _v: f32) -> Result<(), Error> {
        Err(Error::mismatch(Shape::F32, self.expecting()))
    }

    fn visit_f64(&mut self, _v: f64) -> Result<(), Error> {
        Err(Error::mismatch(Shape::F64, self.expecting()))
    }

    /// Visits a string. The slice may borrow from the decoder's input
    /// buffer; a visitor that retains it must copy.
    fn visit_str(&mut self, _v: &str) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Str, self.expecting()))
    }

    /// Visits an opaque byte string. The slice may borrow from the
    /// decoder's input buffer.
    fn visit_bytes(&mut self, _v: &[u8]) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Bytes, self.expecting()))
    }

    /// Visits the present arm of an optional value. The visitor decodes the
    /// inner value from `decoder`.
    fn visit_some(&mut self, _decoder: &mut dyn Decoder) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Option, self.expecting()))
    }

    /// Visits a sequence. The visitor drives `seq` to stream elements; the
    /// decoder's cursor advances exactly as far as the visitor pulls.
    fn visit_seq(&mut self, _seq: &mut dyn SeqSource) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Seq, self.expecting()))
    }

    /// Visits a map. The visitor drives `map`, alternating
    /// [`next_key`](MapSource::next_key) and
    /// [`next_value`](MapSource::next_value).
    fn visit_map(&mut self, _map: &mut dyn MapSource) -> Result<(), Error> {
        Err(Error::mismatch(Shape::Map, self.expecting()))
    }
}

// -----------------------------------------------------------------------------
// Decoder

/// The format side of a decode operation.
///
/// `decode_any` parses whatever value comes next and dispatches on its
/// shape. The remaining methods are shape hints: the caller states what it
/// expects, and a format may use the hint to parse more precisely (numeric
/// width checks, base64 byte strings) before firing the visitor. Every hint
/// defaults to `decode_any`, so a format only overrides the hints it can
/// exploit.
///
/// Exactly one visitor method fires per `decode_*` call.
pub trait Decoder {
    fn decode_any(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error>;

    fn decode_nil(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_bool(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_i8(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_i16(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_i32(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_i64(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_isize(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_u8(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_u16(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_u32(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_u64(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_usize(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_f32(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_f64(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_str(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_bytes(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    /// Decodes an optional value. A format with a native absent value
    /// overrides this to route absence to [`Visitor::visit_nil`] and
    /// presence to [`Visitor::visit_some`]; the default assumes presence.
    fn decode_option(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        visitor.visit_some(self.as_decoder())
    }

    fn decode_seq(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    fn decode_map(&mut self, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    /// Decodes a record. Self-describing formats ignore `name`; schema'd
    /// formats may use it to select a message type.
    fn decode_struct(&mut self, _name: &str, visitor: &mut dyn Visitor) -> Result<(), Error> {
        self.decode_any(visitor)
    }

    /// Upcast helper so default method bodies can pass `self` as a trait
    /// object.
    fn as_decoder(&mut self) -> &mut dyn Decoder;
}

// -----------------------------------------------------------------------------
// Streaming sources

/// A streaming source of sequence elements.
pub trait SeqSource {
    /// The number of remaining elements, when the format knows it upfront.
    fn size_hint(&self) -> Option<usize>;

    /// Decodes the next element into `element`. Returns `Ok(false)` when
    /// the sequence is exhausted, in which case `element` is untouched.
    fn next_element(&mut self, element: &mut dyn Deserialize) -> Result<bool, Error>;
}

/// A streaming source of map entries.
///
/// Callers alternate [`next_key`](MapSource::next_key) and
/// [`next_value`](MapSource::next_value); calling `next_value` is only
/// meaningful immediately after `next_key` returned `Ok(true)`.
pub trait MapSource {
    /// The number of remaining entries, when the format knows it upfront.
    fn size_hint(&self) -> Option<usize>;

    /// Decodes the next key into `key`. Returns `Ok(false)` when the map is
    /// exhausted.
    fn next_key(&mut self, key: &mut dyn Deserialize) -> Result<bool, Error>;

    /// Decodes the value belonging to the key just returned.
    fn next_value(&mut self, value: &mut dyn Deserialize) -> Result<(), Error>;
}

// -----------------------------------------------------------------------------
// Deserialize

/// A destination that can populate itself from a [`Decoder`].
///
/// Implementations pick the shape hint that matches their destination type
/// and hand the decoder a matching [`Visitor`].
pub trait Deserialize {
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error>;
}

impl<T: Deserialize + ?Sized> Deserialize for &mut T {
    #[inline]
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        (**self).deserialize(decoder)
    }
}

// -----------------------------------------------------------------------------
// Skip

/// A sink that accepts any value and discards it.
///
/// `Skip` validates syntax and advances the decoder's cursor without
/// producing a value. It is how unknown record keys and excess fixed-array
/// elements are consumed.
pub struct Skip;

impl Visitor for Skip {
    fn expecting(&self) -> &'static str {
        "any value"
    }

    fn visit_nil(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_bool(&mut self, _v: bool) -> Result<(), Error> {
        Ok(())
    }

    fn visit_i8(&mut self, _v: i8) -> Result<(), Error> {
        Ok(())
    }

    fn visit_i16(&mut self, _v: i16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_i32(&mut self, _v: i32) -> Result<(), Error> {
        Ok(())
    }

    fn visit_i64(&mut self, _v: i64) -> Result<(), Error> {
        Ok(())
    }

    fn visit_isize(&mut self, _v: isize) -> Result<(), Error> {
        Ok(())
    }

    fn visit_u8(&mut self, _v: u8) -> Result<(), Error> {
        Ok(())
    }

    fn visit_u16(&mut self, _v: u16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_u32(&mut self, _v: u32) -> Result<(), Error> {
        Ok(())
    }

    fn visit_u64(&mut self, _v: u64) -> Result<(), Error> {
        Ok(())
    }

    fn visit_usize(&mut self, _v: usize) -> Result<(), Error> {
        Ok(())
    }

    fn visit_f32(&mut self, _v: f32) -> Result<(), Error> {
        Ok(())
    }

    fn visit_f64(&mut self, _v: f64) -> Result<(), Error> {
        Ok(())
    }

    fn visit_str(&mut self, _v: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_bytes(&mut self, _v: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn visit_some(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        decoder.decode_any(&mut Skip)
    }

    fn visit_seq(&mut self, seq: &mut dyn SeqSource) -> Result<(), Error> {
        while seq.next_element(&mut Skip)? {}
        Ok(())
    }

    fn visit_map(&mut self, map: &mut dyn MapSource) -> Result<(), Error> {
        while map.next_key(&mut Skip)? {
            map.next_value(&mut Skip)?;
        }
        Ok(())
    }
}

impl Deserialize for Skip {
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        decoder.decode_any(self)
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct BoolOnly(bool);

    impl Visitor for BoolOnly {
        fn expecting(&self) -> &'static str {
            "bool"
        }

        fn visit_bool(&mut self, v: bool) -> Result<(), Error> {
            self.0 = v;
            Ok(())
        }
    }

    #[test]
    fn default_methods_mismatch() {
        let mut visitor = BoolOnly(false);
        assert!(visitor.visit_bool(true).is_ok());
        assert!(visitor.0);

        let err = visitor.visit_str("yes").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);
        assert_eq!(err.to_string(), "cannot decode string into value of type bool");
    }
}
