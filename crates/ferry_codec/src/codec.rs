//! The compiled codec interface.

use core::any::Any;

use crate::de::{Decoder, Deserialize};
use crate::error::Error;
use crate::ser::{Encoder, Serialize};

// -----------------------------------------------------------------------------
// Codec

/// A compiled serializer/deserializer pair for one concrete type.
///
/// Codecs are erased: both directions take the value as `dyn Any` and
/// downcast internally. They are built once per type by the compiler, cached
/// in the [`CodecRegistry`](crate::CodecRegistry), and shared across threads.
pub trait Codec: Send + Sync {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error>;

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error>;
}

// -----------------------------------------------------------------------------
// CustomCodec

/// Per-direction hand-written overrides for a [`Described`] type.
///
/// Either direction may be set independently; the compiler wraps the
/// structural codec and routes only the overridden directions through these
/// hooks.
///
/// [`Described`]: crate::Described
#[derive(Clone, Copy)]
pub struct CustomCodec {
    pub serialize: Option<fn(&dyn Any, &mut dyn Encoder) -> Result<(), Error>>,
    pub deserialize: Option<fn(&mut dyn Any, &mut dyn Decoder) -> Result<(), Error>>,
}

impl CustomCodec {
    pub const fn none() -> Self {
        Self {
            serialize: None,
            deserialize: None,
        }
    }

    pub const fn is_none(&self) -> bool {
        self.serialize.is_none() && self.deserialize.is_none()
    }
}

// -----------------------------------------------------------------------------
// Adapters

/// Pairs a codec with an erased value to form a [`Serialize`].
///
/// This is how compiled codecs hand nested values to format sinks: the sink
/// sees a `&dyn Serialize`, the codec keeps driving the traversal.
#[derive(Clone, Copy)]
pub struct Ser<'a> {
    pub codec: &'a dyn Codec,
    pub value: &'a dyn Any,
}

impl Serialize for Ser<'_> {
    #[inline]
    fn serialize(&self, encoder: &mut dyn Encoder) -> Result<(), Error> {
        self.codec.serialize(self.value, encoder)
    }
}

/// Pairs a codec with a mutable erased value to form a [`Deserialize`].
pub struct De<'a> {
    pub codec: &'a dyn Codec,
    pub value: &'a mut dyn Any,
}

impl Deserialize for De<'_> {
    #[inline]
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        self.codec.deserialize(self.value, decoder)
    }
}
