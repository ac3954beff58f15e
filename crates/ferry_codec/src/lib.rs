#![doc = include_str!("../README.md")]

// Generated code names this crate by its package name; the alias keeps that
// working from inside the crate itself.
extern crate self as ferry_codec;

pub mod codec;
mod compile;
pub mod de;
pub mod desc;
mod error;
mod fields;
mod impls;
mod keyset;
pub mod ops;
pub mod registry;
pub mod ser;
mod shape;

pub use ferry_codec_derive::Described;

pub use crate::codec::{Codec, CustomCodec};
pub use crate::de::{Decoder, Deserialize, MapSource, SeqSource, Skip, Visitor};
pub use crate::desc::{Described, FieldDecl, TypeDesc, TypeRef};
pub use crate::error::{Error, ErrorKind};
pub use crate::registry::{CodecOptions, CodecRegistry, Deserializer, Serializer};
pub use crate::ser::{Encoder, MapSink, RecordSink, SeqSink, Serialize};
pub use crate::shape::Shape;
