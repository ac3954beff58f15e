//! The codec compiler.
//!
//! Walks a type descriptor once and produces an erased [`Codec`] for it.
//! Struct layouts are shared through [`Seen`] cells so that recursive types
//! compile to codecs that reference their own layout instead of recursing
//! forever.

use core::any::{Any, TypeId};
use core::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::codec::{Codec, De, Ser};
use crate::de::{Decoder, Deserialize, MapSource, SeqSource, Skip, Visitor};
use crate::desc::{TypeDesc, TypeRef};
use crate::error::Error;
use crate::fields::{StructLayout, resolve_struct};
use crate::ops::{ArrayOps, BoxedOps, ListOps, MapOps, OptionOps, downcast_mut, downcast_ref};
use crate::registry::CodecOptions;
use crate::ser::Encoder;

// -----------------------------------------------------------------------------
// Seen

/// Struct layout cells for one compilation walk.
///
/// A cell that exists but is not yet filled marks a struct whose resolution
/// is in progress further up the walk.
#[derive(Default)]
pub(crate) struct Seen {
    cells: HashMap<TypeId, Arc<OnceLock<StructLayout>>>,
}

impl Seen {
    pub(crate) fn in_progress(&self, id: &TypeId) -> bool {
        self.cells.get(id).is_some_and(|cell| cell.get().is_none())
    }
}

// -----------------------------------------------------------------------------
// Entry point

pub(crate) fn compile(ty: &TypeRef, seen: &mut Seen, options: &CodecOptions) -> Arc<dyn Codec> {
    let base = compile_base(ty, seen, options);
    let custom = (ty.custom)();
    if custom.is_none() {
        base
    } else {
        Arc::new(CustomWrap { base, custom })
    }
}

fn compile_base(ty: &TypeRef, seen: &mut Seen, options: &CodecOptions) -> Arc<dyn Codec> {
    match (ty.describe)() {
        TypeDesc::Bool => Arc::new(BoolCodec),
        TypeDesc::I8 => Arc::new(I8Codec),
        TypeDesc::I16 => Arc::new(I16Codec),
        TypeDesc::I32 => Arc::new(I32Codec),
        TypeDesc::I64 => Arc::new(I64Codec),
        TypeDesc::Isize => Arc::new(IsizeCodec),
        TypeDesc::U8 => Arc::new(U8Codec),
        TypeDesc::U16 => Arc::new(U16Codec),
        TypeDesc::U32 => Arc::new(U32Codec),
        TypeDesc::U64 => Arc::new(U64Codec),
        TypeDesc::Usize => Arc::new(UsizeCodec),
        TypeDesc::F32 => Arc::new(F32Codec),
        TypeDesc::F64 => Arc::new(F64Codec),
        TypeDesc::Str => Arc::new(StringCodec),
        TypeDesc::Option(d) => Arc::new(OptionCodec {
            elem: compile(&d.elem, seen, options),
            ops: d.ops,
        }),
        TypeDesc::Boxed(d) => Arc::new(BoxedCodec {
            elem: compile(&d.elem, seen, options),
            ops: d.ops,
        }),
        TypeDesc::Array(d) => Arc::new(ArrayCodec {
            elem: compile(&d.elem, seen, options),
            elem_ty: d.elem,
            len: d.len,
            ops: d.ops,
        }),
        // Byte lists serialize as byte strings rather than element by
        // element.
        TypeDesc::List(d) if d.elem.id == TypeId::of::<u8>() => Arc::new(BytesCodec),
        TypeDesc::List(d) => Arc::new(ListCodec {
            elem: compile(&d.elem, seen, options),
            ops: d.ops,
        }),
        TypeDesc::Map(d) => {
            // Only string and integer keys have a map key representation on
            // the wire; any other key fails the whole map in both
            // directions.
            let Some(cmp) = key_cmp(&(d.key.describe)()) else {
                return Arc::new(UnsupportedCodec { name: ty.name });
            };
            Arc::new(MapCodec {
                key_codec: compile(&d.key, seen, options),
                val_codec: compile(&d.value, seen, options),
                key_ty: d.key,
                val_ty: d.value,
                ops: d.ops,
                cmp,
            })
        }
        TypeDesc::Struct(desc) => {
            let (cell, fresh) = match seen.cells.get(&ty.id) {
                Some(cell) => (cell.clone(), false),
                None => {
                    let cell = Arc::new(OnceLock::new());
                    seen.cells.insert(ty.id, cell.clone());
                    (cell, true)
                }
            };
            if fresh {
                let layout = resolve_struct(&desc, seen, options);
                let _ = cell.set(layout);
            }
            Arc::new(StructCodec {
                layout: cell,
                options: options.clone(),
            })
        }
        TypeDesc::Unsupported => Arc::new(UnsupportedCodec { name: ty.name }),
    }
}

struct CustomWrap {
    base: Arc<dyn Codec>,
    custom: crate::codec::CustomCodec,
}

impl Codec for CustomWrap {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        match self.custom.serialize {
            Some(serialize) => serialize(value, encoder),
            None => self.base.serialize(value, encoder),
        }
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        match self.custom.deserialize {
            Some(deserialize) => deserialize(value, decoder),
            None => self.base.deserialize(value, decoder),
        }
    }
}

// -----------------------------------------------------------------------------
// Scalars

macro_rules! scalar_codec {
    ($($codec:ident: $ty:ty, $encode:ident, $decode:ident, $visit:ident;)*) => {
        $(
            struct $codec;

            impl Codec for $codec {
                fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
                    encoder.$encode(*downcast_ref::<$ty>(value))
                }

                fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
                    struct V<'a>(&'a mut $ty);

                    impl Visitor for V<'_> {
                        fn expecting(&self) -> &'static str {
                            stringify!($ty)
                        }

                        fn $visit(&mut self, v: $ty) -> Result<(), Error> {
                            *self.0 = v;
                            Ok(())
                        }
                    }

                    decoder.$decode(&mut V(downcast_mut::<$ty>(value)))
                }
            }
        )*
    };
}

scalar_codec! {
    BoolCodec: bool, encode_bool, decode_bool, visit_bool;
    I8Codec: i8, encode_i8, decode_i8, visit_i8;
    I16Codec: i16, encode_i16, decode_i16, visit_i16;
    I32Codec: i32, encode_i32, decode_i32, visit_i32;
    I64Codec: i64, encode_i64, decode_i64, visit_i64;
    IsizeCodec: isize, encode_isize, decode_isize, visit_isize;
    U8Codec: u8, encode_u8, decode_u8, visit_u8;
    U16Codec: u16, encode_u16, decode_u16, visit_u16;
    U32Codec: u32, encode_u32, decode_u32, visit_u32;
    U64Codec: u64, encode_u64, decode_u64, visit_u64;
    UsizeCodec: usize, encode_usize, decode_usize, visit_usize;
    F32Codec: f32, encode_f32, decode_f32, visit_f32;
    F64Codec: f64, encode_f64, decode_f64, visit_f64;
}

struct StringCodec;

impl Codec for StringCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        encoder.encode_str(downcast_ref::<String>(value))
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        struct V<'a>(&'a mut String);

        impl Visitor for V<'_> {
            fn expecting(&self) -> &'static str {
                "string"
            }

            fn visit_str(&mut self, v: &str) -> Result<(), Error> {
                self.0.clear();
                self.0.push_str(v);
                Ok(())
            }
        }

        decoder.decode_str(&mut V(downcast_mut::<String>(value)))
    }
}

// -----------------------------------------------------------------------------
// Bytes

struct BytesCodec;

impl Codec for BytesCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        encoder.encode_bytes(downcast_ref::<Vec<u8>>(value))
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        struct V<'a>(&'a mut Vec<u8>);

        impl Visitor for V<'_> {
            fn expecting(&self) -> &'static str {
                "bytes"
            }

            fn visit_nil(&mut self) -> Result<(), Error> {
                self.0.clear();
                Ok(())
            }

            fn visit_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
                self.0.clear();
                self.0.extend_from_slice(v);
                Ok(())
            }

            // Formats without a native byte string fall back to a sequence
            // of integers.
            fn visit_seq(&mut self, seq: &mut dyn SeqSource) -> Result<(), Error> {
                self.0.clear();
                self.0.reserve(seq.size_hint().unwrap_or(10));
                let mut elem = ByteElem(0);
                while seq.next_element(&mut elem)? {
                    self.0.push(elem.0);
                }
                Ok(())
            }
        }

        decoder.decode_bytes(&mut V(downcast_mut::<Vec<u8>>(value)))
    }
}

struct ByteElem(u8);

impl Deserialize for ByteElem {
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        struct V<'a>(&'a mut u8);

        impl Visitor for V<'_> {
            fn expecting(&self) -> &'static str {
                "u8"
            }

            fn visit_u8(&mut self, v: u8) -> Result<(), Error> {
                *self.0 = v;
                Ok(())
            }
        }

        decoder.decode_u8(&mut V(&mut self.0))
    }
}

// -----------------------------------------------------------------------------
// Option

struct OptionCodec {
    elem: Arc<dyn Codec>,
    ops: OptionOps,
}

impl Codec for OptionCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        match (self.ops.get)(value) {
            Some(inner) => self.elem.serialize(inner, encoder),
            None => encoder.encode_nil(),
        }
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        decoder.decode_option(&mut OptionVisitor {
            codec: &*self.elem,
            ops: self.ops,
            value,
        })
    }
}

struct OptionVisitor<'a> {
    codec: &'a dyn Codec,
    ops: OptionOps,
    value: &'a mut dyn Any,
}

impl Visitor for OptionVisitor<'_> {
    fn expecting(&self) -> &'static str {
        "option"
    }

    fn visit_nil(&mut self) -> Result<(), Error> {
        (self.ops.clear)(&mut *self.value);
        Ok(())
    }

    fn visit_some(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        let slot = (self.ops.get_or_insert)(&mut *self.value);
        self.codec.deserialize(slot, decoder)
    }
}

// -----------------------------------------------------------------------------
// Box

struct BoxedCodec {
    elem: Arc<dyn Codec>,
    ops: BoxedOps,
}

impl Codec for BoxedCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        self.elem.serialize((self.ops.get)(value), encoder)
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        self.elem.deserialize((self.ops.get_mut)(value), decoder)
    }
}

// -----------------------------------------------------------------------------
// Array

struct ArrayCodec {
    elem: Arc<dyn Codec>,
    elem_ty: TypeRef,
    len: usize,
    ops: ArrayOps,
}

impl Codec for ArrayCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        let mut sink = encoder.encode_seq(Some(self.len))?;
        let mut result = Ok(());
        for i in 0..self.len {
            let elem = Ser {
                codec: &*self.elem,
                value: (self.ops.get)(value, i),
            };
            if let Err(err) = sink.element(&elem) {
                result = Err(err);
                break;
            }
        }
        let end = sink.end();
        result?;
        end
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        decoder.decode_seq(&mut ArrayVisitor {
            codec: &*self.elem,
            elem_ty: self.elem_ty,
            len: self.len,
            ops: self.ops,
            value,
        })
    }
}

struct ArrayVisitor<'a> {
    codec: &'a dyn Codec,
    elem_ty: TypeRef,
    len: usize,
    ops: ArrayOps,
    value: &'a mut dyn Any,
}

impl Visitor for ArrayVisitor<'_> {
    fn expecting(&self) -> &'static str {
        "array"
    }

    fn visit_nil(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_seq(&mut self, seq: &mut dyn SeqSource) -> Result<(), Error> {
        for i in 0..self.len {
            let slot = (self.ops.get_mut)(&mut *self.value, i);
            let mut elem = De {
                codec: self.codec,
                value: slot,
            };
            if !seq.next_element(&mut elem)? {
                return Ok(());
            }
        }
        // Surplus elements are decoded into scratch and discarded.
        loop {
            let mut scratch = (self.elem_ty.new_boxed)();
            let mut elem = De {
                codec: self.codec,
                value: &mut *scratch,
            };
            if !seq.next_element(&mut elem)? {
                return Ok(());
            }
        }
    }
}

// -----------------------------------------------------------------------------
// List

struct ListCodec {
    elem: Arc<dyn Codec>,
    ops: ListOps,
}

impl Codec for ListCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        let len = (self.ops.len)(value);
        let mut sink = encoder.encode_seq(Some(len))?;
        let mut result = Ok(());
        for i in 0..len {
            let elem = Ser {
                codec: &*self.elem,
                value: (self.ops.get)(value, i),
            };
            if let Err(err) = sink.element(&elem) {
                result = Err(err);
                break;
            }
        }
        let end = sink.end();
        result?;
        end
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        decoder.decode_seq(&mut ListVisitor {
            codec: &*self.elem,
            ops: self.ops,
            value,
        })
    }
}

struct ListVisitor<'a> {
    codec: &'a dyn Codec,
    ops: ListOps,
    value: &'a mut dyn Any,
}

impl Visitor for ListVisitor<'_> {
    fn expecting(&self) -> &'static str {
        "sequence"
    }

    fn visit_nil(&mut self) -> Result<(), Error> {
        (self.ops.clear)(&mut *self.value);
        Ok(())
    }

    fn visit_seq(&mut self, seq: &mut dyn SeqSource) -> Result<(), Error> {
        (self.ops.clear)(&mut *self.value);
        (self.ops.reserve)(&mut *self.value, seq.size_hint().unwrap_or(10));
        loop {
            let slot = (self.ops.push_slot)(&mut *self.value);
            let mut elem = De {
                codec: self.codec,
                value: slot,
            };
            if !seq.next_element(&mut elem)? {
                (self.ops.pop)(&mut *self.value);
                return Ok(());
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Map

struct MapCodec {
    key_codec: Arc<dyn Codec>,
    val_codec: Arc<dyn Codec>,
    key_ty: TypeRef,
    val_ty: TypeRef,
    ops: MapOps,
    cmp: fn(&dyn Any, &dyn Any) -> Ordering,
}

impl Codec for MapCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        let mut entries = (self.ops.entries)(value);
        // Keys always serialize sorted, so hash maps produce deterministic
        // output.
        entries.sort_by(|a, b| (self.cmp)(a.0, b.0));
        let mut sink = encoder.encode_map(Some(entries.len()))?;
        let mut result = Ok(());
        for (k, v) in entries {
            let key = Ser {
                codec: &*self.key_codec,
                value: k,
            };
            let val = Ser {
                codec: &*self.val_codec,
                value: v,
            };
            if let Err(err) = sink.entry(&key, &val) {
                result = Err(err);
                break;
            }
        }
        let end = sink.end();
        result?;
        end
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        decoder.decode_map(&mut MapVisitor {
            key_codec: &*self.key_codec,
            val_codec: &*self.val_codec,
            key_ty: self.key_ty,
            val_ty: self.val_ty,
            ops: self.ops,
            value,
        })
    }
}

struct MapVisitor<'a> {
    key_codec: &'a dyn Codec,
    val_codec: &'a dyn Codec,
    key_ty: TypeRef,
    val_ty: TypeRef,
    ops: MapOps,
    value: &'a mut dyn Any,
}

impl Visitor for MapVisitor<'_> {
    fn expecting(&self) -> &'static str {
        "map"
    }

    fn visit_nil(&mut self) -> Result<(), Error> {
        (self.ops.clear)(&mut *self.value);
        Ok(())
    }

    fn visit_map(&mut self, map: &mut dyn MapSource) -> Result<(), Error> {
        (self.ops.clear)(&mut *self.value);
        loop {
            let mut key = (self.key_ty.new_boxed)();
            let mut key_slot = De {
                codec: self.key_codec,
                value: &mut *key,
            };
            if !map.next_key(&mut key_slot)? {
                return Ok(());
            }
            let mut val = (self.val_ty.new_boxed)();
            let mut val_slot = De {
                codec: self.val_codec,
                value: &mut *val,
            };
            map.next_value(&mut val_slot)?;
            (self.ops.insert)(&mut *self.value, key, val);
        }
    }
}

fn cmp_keys<T: Ord + Any>(a: &dyn Any, b: &dyn Any) -> Ordering {
    downcast_ref::<T>(a).cmp(downcast_ref::<T>(b))
}

/// The key ordering doubles as the map key gate: kinds with no entry here
/// cannot be map keys at all.
fn key_cmp(desc: &TypeDesc) -> Option<fn(&dyn Any, &dyn Any) -> Ordering> {
    Some(match desc {
        TypeDesc::I8 => cmp_keys::<i8>,
        TypeDesc::I16 => cmp_keys::<i16>,
        TypeDesc::I32 => cmp_keys::<i32>,
        TypeDesc::I64 => cmp_keys::<i64>,
        TypeDesc::Isize => cmp_keys::<isize>,
        TypeDesc::U8 => cmp_keys::<u8>,
        TypeDesc::U16 => cmp_keys::<u16>,
        TypeDesc::U32 => cmp_keys::<u32>,
        TypeDesc::U64 => cmp_keys::<u64>,
        TypeDesc::Usize => cmp_keys::<usize>,
        TypeDesc::Str => cmp_keys::<String>,
        _ => return None,
    })
}

// -----------------------------------------------------------------------------
// Struct

struct StructCodec {
    layout: Arc<OnceLock<StructLayout>>,
    options: CodecOptions,
}

impl StructCodec {
    fn layout(&self) -> &StructLayout {
        match self.layout.get() {
            Some(layout) => layout,
            // Cells are filled before compile returns.
            None => unreachable!("struct layout used before resolution finished"),
        }
    }
}

impl Codec for StructCodec {
    fn serialize(&self, value: &dyn Any, encoder: &mut dyn Encoder) -> Result<(), Error> {
        let layout = self.layout();
        let mut sink = encoder.encode_struct(layout.name)?;
        let mut result = Ok(());
        for field in &layout.fields {
            let Some(slot) = field.project(value) else {
                continue;
            };
            if field.omit_empty && (field.ty.is_empty)(slot) {
                continue;
            }
            let elem = Ser {
                codec: &*field.codec,
                value: slot,
            };
            if let Err(err) = sink.field(&field.name, &elem) {
                result = Err(err.for_field(layout.name, &field.name));
                break;
            }
        }
        let end = sink.end();
        result?;
        end
    }

    fn deserialize(&self, value: &mut dyn Any, decoder: &mut dyn Decoder) -> Result<(), Error> {
        let layout = self.layout();
        decoder.decode_struct(
            layout.name,
            &mut StructVisitor {
                layout,
                options: &self.options,
                value,
            },
        )
    }
}

struct StructVisitor<'a> {
    layout: &'a StructLayout,
    options: &'a CodecOptions,
    value: &'a mut dyn Any,
}

impl Visitor for StructVisitor<'_> {
    fn expecting(&self) -> &'static str {
        self.layout.name
    }

    fn visit_nil(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_map(&mut self, map: &mut dyn MapSource) -> Result<(), Error> {
        loop {
            let mut key = KeyBuf::default();
            if !map.next_key(&mut key)? {
                return Ok(());
            }
            match self.layout.lookup(&key.0) {
                Some(field) => {
                    let slot = field.project_mut(&mut *self.value)?;
                    let mut dest = De {
                        codec: &*field.codec,
                        value: slot,
                    };
                    map.next_value(&mut dest)
                        .map_err(|err| err.for_field(self.layout.name, &field.name))?;
                }
                None if self.options.deny_unknown_fields => {
                    return Err(Error::message(format!(
                        "unknown field {:?} in {}",
                        key.0, self.layout.name
                    )));
                }
                None => map.next_value(&mut Skip)?,
            }
        }
    }
}

#[derive(Default)]
struct KeyBuf(String);

impl Deserialize for KeyBuf {
    fn deserialize(&mut self, decoder: &mut dyn Decoder) -> Result<(), Error> {
        struct V<'a>(&'a mut String);

        impl Visitor for V<'_> {
            fn expecting(&self) -> &'static str {
                "object key"
            }

            fn visit_str(&mut self, v: &str) -> Result<(), Error> {
                self.0.clear();
                self.0.push_str(v);
                Ok(())
            }
        }

        decoder.decode_str(&mut V(&mut self.0))
    }
}

// -----------------------------------------------------------------------------
// Unsupported

struct UnsupportedCodec {
    name: &'static str,
}

impl Codec for UnsupportedCodec {
    fn serialize(&self, _value: &dyn Any, _encoder: &mut dyn Encoder) -> Result<(), Error> {
        Err(Error::unsupported_type(self.name))
    }

    fn deserialize(&self, _value: &mut dyn Any, _decoder: &mut dyn Decoder) -> Result<(), Error> {
        Err(Error::unsupported_type(self.name))
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{Described, FieldDecl, StructDesc};
    use crate::ser::{MapSink, RecordSink, SeqSink, Serialize};

    // A recording encoder: every call appends one token, so tests can
    // assert on traversal order without a real format.
    struct Rec<'a>(&'a mut Vec<String>);

    macro_rules! rec_scalar {
        ($($method:ident: $ty:ty;)*) => {
            $(
                fn $method(&mut self, v: $ty) -> Result<(), Error> {
                    self.0.push(format!(concat!(stringify!($method), " {}"), v));
                    Ok(())
                }
            )*
        };
    }

    impl Encoder for Rec<'_> {
        fn encode_nil(&mut self) -> Result<(), Error> {
            self.0.push("nil".to_owned());
            Ok(())
        }

        rec_scalar! {
            encode_bool: bool;
            encode_i8: i8;
            encode_i16: i16;
            encode_i32: i32;
            encode_i64: i64;
            encode_isize: isize;
            encode_u8: u8;
            encode_u16: u16;
            encode_u32: u32;
            encode_u64: u64;
            encode_usize: usize;
            encode_f32: f32;
            encode_f64: f64;
        }

        fn encode_str(&mut self, v: &str) -> Result<(), Error> {
            self.0.push(format!("str {v}"));
            Ok(())
        }

        fn encode_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
            self.0.push(format!("bytes {v:?}"));
            Ok(())
        }

        fn encode_seq(&mut self, len: Option<usize>) -> Result<Box<dyn SeqSink + '_>, Error> {
            self.0.push(format!("seq {len:?}"));
            Ok(Box::new(RecSink(self.0)))
        }

        fn encode_map(&mut self, len: Option<usize>) -> Result<Box<dyn MapSink + '_>, Error> {
            self.0.push(format!("map {len:?}"));
            Ok(Box::new(RecSink(self.0)))
        }

        fn encode_struct(&mut self, name: &str) -> Result<Box<dyn RecordSink + '_>, Error> {
            self.0.push(format!("struct {name}"));
            Ok(Box::new(RecSink(self.0)))
        }
    }

    struct RecSink<'a>(&'a mut Vec<String>);

    impl SeqSink for RecSink<'_> {
        fn element(&mut self, value: &dyn Serialize) -> Result<(), Error> {
            value.serialize(&mut Rec(self.0))
        }

        fn end(&mut self) -> Result<(), Error> {
            self.0.push("end".to_owned());
            Ok(())
        }
    }

    impl MapSink for RecSink<'_> {
        fn entry(&mut self, key: &dyn Serialize, value: &dyn Serialize) -> Result<(), Error> {
            key.serialize(&mut Rec(self.0))?;
            value.serialize(&mut Rec(self.0))
        }

        fn end(&mut self) -> Result<(), Error> {
            self.0.push("end".to_owned());
            Ok(())
        }
    }

    impl RecordSink for RecSink<'_> {
        fn field(&mut self, name: &str, value: &dyn Serialize) -> Result<(), Error> {
            self.0.push(format!("field {name}"));
            value.serialize(&mut Rec(self.0))
        }

        fn end(&mut self) -> Result<(), Error> {
            self.0.push("end".to_owned());
            Ok(())
        }
    }

    // A decoder with no input; codecs that fail before reading never reach
    // it.
    struct FailDecoder;

    impl Decoder for FailDecoder {
        fn decode_any(&mut self, _visitor: &mut dyn Visitor) -> Result<(), Error> {
            Err(Error::message("no input"))
        }

        fn as_decoder(&mut self) -> &mut dyn Decoder {
            self
        }
    }

    fn compile_for<T: Described>() -> Arc<dyn Codec> {
        compile(
            &TypeRef::of::<T>(),
            &mut Seen::default(),
            &CodecOptions::default(),
        )
    }

    fn record<T: Described>(value: &T) -> Vec<String> {
        let codec = compile_for::<T>();
        let mut events = Vec::new();
        codec.serialize(value, &mut Rec(&mut events)).unwrap();
        events
    }

    #[test]
    fn byte_lists_use_the_bytes_path() {
        let events = record(&vec![1_u8, 2, 3]);
        assert_eq!(events, ["bytes [1, 2, 3]"]);

        let events = record(&vec![1_u16, 2]);
        assert_eq!(events, ["seq Some(2)", "encode_u16 1", "encode_u16 2", "end"]);
    }

    #[test]
    fn options_encode_nil_or_inner() {
        assert_eq!(record(&None::<i32>), ["nil"]);
        assert_eq!(record(&Some(5_i32)), ["encode_i32 5"]);
    }

    #[test]
    fn non_key_kinds_fail_the_whole_map() {
        use std::collections::BTreeMap;

        let mut map = BTreeMap::new();
        map.insert(true, 1_i32);
        let codec = compile_for::<BTreeMap<bool, i32>>();

        let mut events = Vec::new();
        let err = codec.serialize(&map, &mut Rec(&mut events)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedType);

        let mut dest = BTreeMap::<bool, i32>::new();
        let err = codec
            .deserialize(&mut dest, &mut FailDecoder)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedType);
    }

    #[test]
    fn hash_maps_serialize_sorted() {
        let mut map = std::collections::HashMap::new();
        map.insert("b".to_owned(), 2_i64);
        map.insert("a".to_owned(), 1_i64);

        let events = record(&map);
        assert_eq!(
            events,
            [
                "map Some(2)",
                "str a",
                "encode_i64 1",
                "str b",
                "encode_i64 2",
                "end"
            ]
        );
    }

    #[derive(Default)]
    struct Node {
        label: String,
        next: Option<Box<Node>>,
    }

    impl Described for Node {
        fn describe() -> TypeDesc {
            TypeDesc::Struct(StructDesc {
                name: "Node",
                fields: vec![
                    FieldDecl {
                        name: "label",
                        rename: None,
                        skip: false,
                        omit_empty: false,
                        flatten: false,
                        exported: true,
                        ty: TypeRef::of::<String>(),
                        get: |v| &downcast_ref::<Node>(v).label,
                        get_mut: |v| &mut downcast_mut::<Node>(v).label,
                    },
                    FieldDecl {
                        name: "next",
                        rename: None,
                        skip: false,
                        omit_empty: true,
                        flatten: false,
                        exported: true,
                        ty: TypeRef::of::<Option<Box<Node>>>(),
                        get: |v| &downcast_ref::<Node>(v).next,
                        get_mut: |v| &mut downcast_mut::<Node>(v).next,
                    },
                ],
            })
        }
    }

    #[test]
    fn recursive_struct_compiles_and_serializes() {
        let value = Node {
            label: "head".to_owned(),
            next: Some(Box::new(Node {
                label: "tail".to_owned(),
                next: None,
            })),
        };

        assert_eq!(
            record(&value),
            [
                "struct Node",
                "field label",
                "str head",
                "field next",
                "struct Node",
                "field label",
                "str tail",
                "end",
                "end"
            ]
        );
    }

    #[test]
    fn omit_empty_drops_empty_fields() {
        let value = Node {
            label: String::new(),
            next: None,
        };
        // label is not omit_empty, next is.
        assert_eq!(record(&value), ["struct Node", "field label", "str ", "end"]);
    }
}
