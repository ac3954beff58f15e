//! [`Described`] implementations for primitives and standard containers.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::desc::{
    ArrayDesc, BoxedDesc, Described, ListDesc, MapDesc, OptionDesc, TypeDesc, TypeRef,
};
use crate::ops::{ArrayOps, BoxedOps, ListOps, MapOps, OptionOps};

// -----------------------------------------------------------------------------
// Scalars

macro_rules! scalar_described {
    ($($ty:ty => $variant:ident, $empty:expr;)*) => {
        $(
            impl Described for $ty {
                fn describe() -> TypeDesc {
                    TypeDesc::$variant
                }

                fn is_empty(&self) -> bool {
                    let probe: fn(&$ty) -> bool = $empty;
                    probe(self)
                }
            }
        )*
    };
}

scalar_described! {
    bool => Bool, |v| !*v;
    i8 => I8, |v| *v == 0;
    i16 => I16, |v| *v == 0;
    i32 => I32, |v| *v == 0;
    i64 => I64, |v| *v == 0;
    isize => Isize, |v| *v == 0;
    u8 => U8, |v| *v == 0;
    u16 => U16, |v| *v == 0;
    u32 => U32, |v| *v == 0;
    u64 => U64, |v| *v == 0;
    usize => Usize, |v| *v == 0;
    f32 => F32, |v| *v == 0.0;
    f64 => F64, |v| *v == 0.0;
}

impl Described for String {
    fn describe() -> TypeDesc {
        TypeDesc::Str
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

// -----------------------------------------------------------------------------
// Containers

impl<T: Described> Described for Option<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Option(OptionDesc {
            elem: TypeRef::of::<T>(),
            ops: OptionOps::of::<T>(),
        })
    }

    fn is_empty(&self) -> bool {
        self.is_none()
    }
}

impl<T: Described> Described for Box<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Boxed(BoxedDesc {
            elem: TypeRef::of::<T>(),
            ops: BoxedOps::of::<T>(),
        })
    }
}

impl<T: Described, const N: usize> Described for [T; N]
where
    [T; N]: Default,
{
    fn describe() -> TypeDesc {
        TypeDesc::Array(ArrayDesc {
            elem: TypeRef::of::<T>(),
            len: N,
            ops: ArrayOps::of::<T, N>(),
        })
    }

    fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<T: Described> Described for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::List(ListDesc {
            elem: TypeRef::of::<T>(),
            ops: ListOps::of::<T>(),
        })
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Described for HashMap<K, V>
where
    K: Described + Eq + Hash,
    V: Described,
{
    fn describe() -> TypeDesc {
        TypeDesc::Map(MapDesc {
            key: TypeRef::of::<K>(),
            value: TypeRef::of::<V>(),
            ops: MapOps::hash_map::<K, V>(),
        })
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Described for BTreeMap<K, V>
where
    K: Described + Ord,
    V: Described,
{
    fn describe() -> TypeDesc {
        TypeDesc::Map(MapDesc {
            key: TypeRef::of::<K>(),
            value: TypeRef::of::<V>(),
            ops: MapOps::btree_map::<K, V>(),
        })
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_emptiness() {
        assert!(0_i32.is_empty());
        assert!(!1_i32.is_empty());
        assert!(false.is_empty());
        assert!(0.0_f64.is_empty());
        assert!(String::new().is_empty());
        assert!(Described::is_empty(&None::<u8>));
        assert!(!Described::is_empty(&Some(0_u8)));
    }

    #[test]
    fn vec_u8_describes_as_list() {
        // The byte fast path is a compiler decision, not a descriptor one.
        match <Vec<u8>>::describe() {
            TypeDesc::List(desc) => assert_eq!(desc.elem.name, "u8"),
            _ => panic!("expected a list descriptor"),
        }
    }
}
