use crate::error::Error;

// -----------------------------------------------------------------------------
// Encoder

/// The format side of an encode operation.
///
/// Exactly one method fires per serialized value: a primitive `encode_*`
/// call, or one of the three builder calls that open a container and return
/// a sink. Sinks must have [`end`](SeqSink::end) called on every exit path,
/// including after an element error, because formats emit their closing
/// delimiters there.
pub trait Encoder {
    fn encode_nil(&mut self) -> Result<(), Error>;
    fn encode_bool(&mut self, v: bool) -> Result<(), Error>;
    fn encode_i8(&mut self, v: i8) -> Result<(), Error>;
    fn encode_i16(&mut self, v: i16) -> Result<(), Error>;
    fn encode_i32(&mut self, v: i32) -> Result<(), Error>;
    fn encode_i64(&mut self, v: i64) -> Result<(), Error>;
    fn encode_isize(&mut self, v: isize) -> Result<(), Error>;
    fn encode_u8(&mut self, v: u8) -> Result<(), Error>;
    fn encode_u16(&mut self, v: u16) -> Result<(), Error>;
    fn encode_u32(&mut self, v: u32) -> Result<(), Error>;
    fn encode_u64(&mut self, v: u64) -> Result<(), Error>;
    fn encode_usize(&mut self, v: usize) -> Result<(), Error>;
    fn encode_f32(&mut self, v: f32) -> Result<(), Error>;
    fn encode_f64(&mut self, v: f64) -> Result<(), Error>;
    fn encode_str(&mut self, v: &str) -> Result<(), Error>;
    fn encode_bytes(&mut self, v: &[u8]) -> Result<(), Error>;

    /// Opens a sequence. `len` is the element count when the caller knows
    /// it; formats may use it to preallocate or emit a length prefix.
    fn encode_seq(&mut self, len: Option<usize>) -> Result<Box<dyn SeqSink + '_>, Error>;

    /// Opens a map. `len` is the entry count when known.
    fn encode_map(&mut self, len: Option<usize>) -> Result<Box<dyn MapSink + '_>, Error>;

    /// Opens a record. Self-describing formats ignore `name`.
    fn encode_struct(&mut self, name: &str) -> Result<Box<dyn RecordSink + '_>, Error>;
}

// -----------------------------------------------------------------------------
// Sinks

/// Streaming sink for sequence elements.
pub trait SeqSink {
    fn element(&mut self, value: &dyn Serialize) -> Result<(), Error>;

    /// Closes the sequence. Must be called on every exit path.
    fn end(&mut self) -> Result<(), Error>;
}

/// Streaming sink for map entries.
pub trait MapSink {
    fn entry(&mut self, key: &dyn Serialize, value: &dyn Serialize) -> Result<(), Error>;

    /// Closes the map. Must be called on every exit path.
    fn end(&mut self) -> Result<(), Error>;
}

/// Streaming sink for record fields.
pub trait RecordSink {
    fn field(&mut self, name: &str, value: &dyn Serialize) -> Result<(), Error>;

    /// Closes the record. Must be called on every exit path.
    fn end(&mut self) -> Result<(), Error>;
}

// -----------------------------------------------------------------------------
// Serialize

/// A source value that can write itself to an [`Encoder`].
pub trait Serialize {
    fn serialize(&self, encoder: &mut dyn Encoder) -> Result<(), Error>;
}

impl<T: Serialize + ?Sized> Serialize for &T {
    #[inline]
    fn serialize(&self, encoder: &mut dyn Encoder) -> Result<(), Error> {
        (**self).serialize(encoder)
    }
}
