//! Type descriptors.
//!
//! A [`Described`] type reports its structure as a [`TypeDesc`] tree. The
//! descriptor is pure data plus erased accessors; the codec compiler walks it
//! once per type and caches the result, so `describe` is free to rebuild the
//! tree on every call.

use core::any::{Any, TypeId, type_name};

use crate::codec::CustomCodec;
use crate::ops::{ArrayOps, BoxedOps, GetFn, GetMutFn, ListOps, MapOps, OptionOps};

// -----------------------------------------------------------------------------
// Described

/// A type that can be serialized and deserialized through a compiled codec.
///
/// Implementations normally come from the [`Described`](macro@crate::Described)
/// derive. The `Default` supertrait is what lets decoders materialize
/// elements in place: absent options, fresh list slots, and map keys all
/// start from `T::default()`.
///
/// # Examples
///
/// ```
/// use ferry_codec::{CodecRegistry, Described};
///
/// #[derive(Described, Default, PartialEq, Debug)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// let registry = CodecRegistry::new();
/// let codec = registry.get::<Point>();
/// # let _ = codec;
/// ```
pub trait Described: Any + Default {
    /// Reports the structure of the type.
    fn describe() -> TypeDesc;

    /// Whether the value is empty for the purpose of `omit_empty` fields.
    ///
    /// Containers report emptiness, scalars report their zero value, and
    /// structs are never empty.
    fn is_empty(&self) -> bool {
        false
    }

    /// Hand-written codec hooks, if the type overrides either direction.
    fn custom_codec() -> CustomCodec {
        CustomCodec::none()
    }
}

// -----------------------------------------------------------------------------
// TypeRef

/// An erased handle to a [`Described`] type.
///
/// A `TypeRef` is `Copy` and carries everything the compiler and the compiled
/// codecs need without naming the type: identity, a descriptor thunk, a
/// default constructor, and the emptiness probe.
#[derive(Clone, Copy)]
pub struct TypeRef {
    pub id: TypeId,
    pub name: &'static str,
    pub describe: fn() -> TypeDesc,
    pub new_boxed: fn() -> Box<dyn Any>,
    pub is_empty: fn(&dyn Any) -> bool,
    pub custom: fn() -> CustomCodec,
}

impl TypeRef {
    pub fn of<T: Described>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            describe: T::describe,
            new_boxed: || Box::new(T::default()),
            is_empty: |v| crate::ops::downcast_ref::<T>(v).is_empty(),
            custom: T::custom_codec,
        }
    }
}

impl core::fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeRef").field("name", &self.name).finish()
    }
}

// -----------------------------------------------------------------------------
// TypeDesc

/// The structure of a [`Described`] type, one level deep.
///
/// Nested types appear as [`TypeRef`]s rather than inline descriptors, so a
/// recursive type describes itself without recursing.
pub enum TypeDesc {
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
    Option(OptionDesc),
    Boxed(BoxedDesc),
    Array(ArrayDesc),
    List(ListDesc),
    Map(MapDesc),
    Struct(StructDesc),
    /// A type with no protocol representation. Compiles to a codec that
    /// fails in both directions, so unsupported fields only error when
    /// actually exercised.
    Unsupported,
}

pub struct OptionDesc {
    pub elem: TypeRef,
    pub ops: OptionOps,
}

pub struct BoxedDesc {
    pub elem: TypeRef,
    pub ops: BoxedOps,
}

pub struct ArrayDesc {
    pub elem: TypeRef,
    pub len: usize,
    pub ops: ArrayOps,
}

pub struct ListDesc {
    pub elem: TypeRef,
    pub ops: ListOps,
}

pub struct MapDesc {
    pub key: TypeRef,
    pub value: TypeRef,
    pub ops: MapOps,
}

pub struct StructDesc {
    pub name: &'static str,
    pub fields: Vec<FieldDecl>,
}

// -----------------------------------------------------------------------------
// FieldDecl

/// One declared field of a struct, before name resolution.
///
/// The derive emits one `FieldDecl` per named field, in declaration order.
/// `flatten` marks a field whose own fields are promoted into the parent
/// record, subject to the shadowing rules applied at compile time.
pub struct FieldDecl {
    /// The declared field name.
    pub name: &'static str,
    /// Wire-name override from a `rename` attribute. A renamed field is
    /// "tagged": it wins shadowing conflicts against untagged fields.
    pub rename: Option<&'static str>,
    pub skip: bool,
    pub omit_empty: bool,
    pub flatten: bool,
    /// Whether the field is visible to decoders through a flattened
    /// reference. Descriptors built by the derive always set this; it exists
    /// for hand-built descriptors mirroring restricted fields.
    pub exported: bool,
    pub ty: TypeRef,
    pub get: GetFn,
    pub get_mut: GetMutFn,
}

impl FieldDecl {
    /// The name the field uses on the wire.
    pub fn wire_name(&self) -> &'static str {
        self.rename.unwrap_or(self.name)
    }

    /// Whether the field carries a rename tag.
    pub fn tagged(&self) -> bool {
        self.rename.is_some()
    }
}
