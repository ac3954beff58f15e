//! The codec cache.

use core::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::codec::Codec;
use crate::compile::{Seen, compile};
use crate::de::{Decoder, Deserialize};
use crate::desc::{Described, TypeRef};
use crate::error::Error;
use crate::ser::{Encoder, Serialize};

// -----------------------------------------------------------------------------
// Options

/// Knobs that affect compiled codecs.
///
/// Options are fixed at registry construction; codecs compiled under one set
/// of options never observe another.
#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    /// Fail decoding when a record key matches no field, instead of
    /// skipping the value.
    pub deny_unknown_fields: bool,
}

// -----------------------------------------------------------------------------
// CodecRegistry

/// A concurrent cache of compiled codecs, keyed by type.
///
/// Reads take a lock-free snapshot. A cache miss compiles the codec and
/// publishes a new snapshot; two racing writers may each publish, and the
/// last one wins. The loser's entry is simply recompiled on its next miss,
/// so the race costs work but never correctness.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// use ferry_codec::{CodecRegistry, Described};
///
/// #[derive(Described, Default)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// let registry = CodecRegistry::new();
/// let codec = registry.get::<Point>();
/// assert!(Arc::ptr_eq(&codec, &registry.get::<Point>()));
/// ```
pub struct CodecRegistry {
    cache: ArcSwap<HashMap<TypeId, Arc<dyn Codec>>>,
    options: CodecOptions,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::with_options(CodecOptions::default())
    }

    pub fn with_options(options: CodecOptions) -> Self {
        Self {
            cache: ArcSwap::from_pointee(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Returns the codec for `T`, compiling and caching it on first use.
    pub fn get<T: Described>(&self) -> Arc<dyn Codec> {
        self.lookup(TypeRef::of::<T>())
    }

    fn lookup(&self, ty: TypeRef) -> Arc<dyn Codec> {
        let snapshot = self.cache.load();
        if let Some(codec) = snapshot.get(&ty.id) {
            return codec.clone();
        }
        let codec = compile(&ty, &mut Seen::default(), &self.options);
        let mut next: HashMap<TypeId, Arc<dyn Codec>> = (**snapshot).clone();
        next.insert(ty.id, codec.clone());
        self.cache.store(Arc::new(next));
        codec
    }

    /// Binds a value to its codec as a [`Serialize`], ready to hand to a
    /// format.
    pub fn serializer<'a, T: Described>(&self, value: &'a T) -> Serializer<'a> {
        Serializer {
            codec: self.get::<T>(),
            value,
        }
    }

    /// Binds a mutable value to its codec as a [`Deserialize`].
    pub fn deserializer<'a, T: Described>(&self, value: &'a mut T) -> Deserializer<'a> {
        Deserializer {
            codec: self.get::<T>(),
            value,
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Bound values

/// A value paired with its compiled codec.
pub struct Serializer<'a> {
    codec: Arc<dyn Codec>,
    value: &'a dyn Any,
}

impl Serialize for Serializer<'_> {
    fn serialize(&self, encoder: &mut dyn Encoder) -> Result<(), Error> {
        self.codec.serialize(self.value, encoder)
    }
}

/// A mutable value paired with its compiled codec.
pub struct Deserializer<'a> {
    codec: Arc<dyn Codec>,
    value: &'a mut dyn Any,
}

impl Deserialize for Deserializer<'_> {
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        self.codec.deserialize(self.value, decoder)
    }
}

// -----------------------------------------------------------------------------
// Tests
