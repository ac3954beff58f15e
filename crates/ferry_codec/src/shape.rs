use core::fmt;

// -----------------------------------------------------------------------------
// Shape

/// The closed set of value shapes that can cross the exchange protocol.
///
/// Every value handed to a [`Visitor`](crate::Visitor) or an
/// [`Encoder`](crate::Encoder) has exactly one of these shapes. Formats map
/// their own syntax onto shapes; typed codecs map shapes onto Rust values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Nil,
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Str,
    Bytes,
    Option,
    Seq,
    Map,
    Record,
}

impl Shape {
    /// Returns the lowercase display name of the shape.
    pub const fn name(self) -> &'static str {
        match self {
            Shape::Nil => "nil",
            Shape::Bool => "bool",
            Shape::I8 => "i8",
            Shape::I16 => "i16",
            Shape::I32 => "i32",
            Shape::I64 => "i64",
            Shape::Isize => "isize",
            Shape::U8 => "u8",
            Shape::U16 => "u16",
            Shape::U32 => "u32",
            Shape::U64 => "u64",
            Shape::Usize => "usize",
            Shape::F32 => "f32",
            Shape::F64 => "f64",
            Shape::Str => "string",
            Shape::Bytes => "bytes",
            Shape::Option => "option",
            Shape::Seq => "sequence",
            Shape::Map => "map",
            Shape::Record => "record",
        }
    }
}

impl fmt::Display for Shape {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
