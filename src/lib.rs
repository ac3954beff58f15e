#![doc = include_str!("../README.md")]

pub use ferry_codec as codec;
pub use ferry_json as json;
