//! Erased accessors over `dyn Any` values.
//!
//! The compiler works on values it cannot name. Each container kind exposes
//! its operations as a bundle of plain `fn` pointers built by a generic
//! constructor, so the typed accessors are erased once per concrete type and
//! the compiled codecs stay object-safe and allocation-free on the access
//! path.

use core::any::{Any, type_name};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

// -----------------------------------------------------------------------------
// Downcasts

/// Downcasts a shared erased value.
///
/// # Panics
///
/// Panics if `value` is not a `T`. Accessors produced by the
/// [`Described`](crate::Described) derive only ever receive the value they
/// were generated for, so a failure here means a hand-built descriptor
/// paired an accessor with the wrong type.
#[inline]
pub fn downcast_ref<T: Any>(value: &dyn Any) -> &T {
    match value.downcast_ref() {
        Some(value) => value,
        None => type_confusion::<T>(),
    }
}

/// Downcasts a mutable erased value.
///
/// # Panics
///
/// Panics if `value` is not a `T`; see [`downcast_ref`].
#[inline]
pub fn downcast_mut<T: Any>(value: &mut dyn Any) -> &mut T {
    match value.downcast_mut() {
        Some(value) => value,
        None => type_confusion::<T>(),
    }
}

pub(crate) fn take_box<T: Any>(value: Box<dyn Any>) -> T {
    match value.downcast() {
        Ok(value) => *value,
        Err(_) => type_confusion::<T>(),
    }
}

#[cold]
fn type_confusion<T>() -> ! {
    panic!(
        "erased accessor applied to a value that is not `{}`",
        type_name::<T>()
    )
}

// -----------------------------------------------------------------------------
// Accessor signatures

/// Projects a field out of a shared erased value.
pub type GetFn = for<'a> fn(&'a dyn Any) -> &'a dyn Any;

/// Projects a field out of a mutable erased value.
pub type GetMutFn = for<'a> fn(&'a mut dyn Any) -> &'a mut dyn Any;

// -----------------------------------------------------------------------------
// Option

/// Erased operations over an `Option<T>`.
#[derive(Clone, Copy)]
pub struct OptionOps {
    pub is_some: fn(&dyn Any) -> bool,
    pub get: for<'a> fn(&'a dyn Any) -> Option<&'a dyn Any>,
    /// Inserts a defaulted element when absent and returns the element.
    pub get_or_insert: GetMutFn,
    pub clear: fn(&mut dyn Any),
}

impl OptionOps {
    pub fn of<T: Any + Default>() -> Self {
        Self {
            is_some: |v| downcast_ref::<Option<T>>(v).is_some(),
            get: |v| match downcast_ref::<Option<T>>(v) {
                Some(elem) => Some(elem),
                None => None,
            },
            get_or_insert: |v| downcast_mut::<Option<T>>(v).get_or_insert_with(T::default),
            clear: |v| *downcast_mut::<Option<T>>(v) = None,
        }
    }
}

// -----------------------------------------------------------------------------
// Box

/// Erased operations over a `Box<T>`.
#[derive(Clone, Copy)]
pub struct BoxedOps {
    pub get: GetFn,
    pub get_mut: GetMutFn,
}

impl BoxedOps {
    pub fn of<T: Any>() -> Self {
        Self {
            get: |v| &**downcast_ref::<Box<T>>(v),
            get_mut: |v| &mut **downcast_mut::<Box<T>>(v),
        }
    }
}

// -----------------------------------------------------------------------------
// Array

/// Erased operations over a `[T; N]`.
#[derive(Clone, Copy)]
pub struct ArrayOps {
    pub get: for<'a> fn(&'a dyn Any, usize) -> &'a dyn Any,
    pub get_mut: for<'a> fn(&'a mut dyn Any, usize) -> &'a mut dyn Any,
}

impl ArrayOps {
    pub fn of<T: Any, const N: usize>() -> Self {
        Self {
            get: |v, i| &downcast_ref::<[T; N]>(v)[i],
            get_mut: |v, i| &mut downcast_mut::<[T; N]>(v)[i],
        }
    }
}

// -----------------------------------------------------------------------------
// List

/// Erased operations over a `Vec<T>`.
#[derive(Clone, Copy)]
pub struct ListOps {
    pub len: fn(&dyn Any) -> usize,
    pub get: for<'a> fn(&'a dyn Any, usize) -> &'a dyn Any,
    pub clear: fn(&mut dyn Any),
    pub reserve: fn(&mut dyn Any, usize),
    /// Pushes a defaulted element and returns a reference to it, so the
    /// caller can decode in place.
    pub push_slot: GetMutFn,
    /// Removes the element added by the last `push_slot`.
    pub pop: fn(&mut dyn Any),
}

impl ListOps {
    pub fn of<T: Any + Default>() -> Self {
        Self {
            len: |v| downcast_ref::<Vec<T>>(v).len(),
            get: |v, i| &downcast_ref::<Vec<T>>(v)[i],
            clear: |v| downcast_mut::<Vec<T>>(v).clear(),
            reserve: |v, n| downcast_mut::<Vec<T>>(v).reserve(n),
            push_slot: |v| {
                let list = downcast_mut::<Vec<T>>(v);
                list.push(T::default());
                // Just pushed, so the list is non-empty.
                let last = list.len() - 1;
                &mut list[last]
            },
            pop: |v| {
                downcast_mut::<Vec<T>>(v).pop();
            },
        }
    }
}

// -----------------------------------------------------------------------------
// Map

/// Erased operations over a map collection.
#[derive(Clone, Copy)]
pub struct MapOps {
    pub len: fn(&dyn Any) -> usize,
    /// Snapshots the entries as erased key/value pairs, in the map's own
    /// iteration order.
    pub entries: for<'a> fn(&'a dyn Any) -> Vec<(&'a dyn Any, &'a dyn Any)>,
    pub clear: fn(&mut dyn Any),
    pub insert: fn(&mut dyn Any, Box<dyn Any>, Box<dyn Any>),
}

impl MapOps {
    pub fn hash_map<K, V>() -> Self
    where
        K: Any + Eq + Hash,
        V: Any,
    {
        Self {
            len: |v| downcast_ref::<HashMap<K, V>>(v).len(),
            entries: |v| {
                downcast_ref::<HashMap<K, V>>(v)
                    .iter()
                    .map(|(k, v)| (k as &dyn Any, v as &dyn Any))
                    .collect()
            },
            clear: |v| downcast_mut::<HashMap<K, V>>(v).clear(),
            insert: |v, k, val| {
                downcast_mut::<HashMap<K, V>>(v).insert(take_box::<K>(k), take_box::<V>(val));
            },
        }
    }

    pub fn btree_map<K, V>() -> Self
    where
        K: Any + Ord,
        V: Any,
    {
        Self {
            len: |v| downcast_ref::<BTreeMap<K, V>>(v).len(),
            entries: |v| {
                downcast_ref::<BTreeMap<K, V>>(v)
                    .iter()
                    .map(|(k, v)| (k as &dyn Any, v as &dyn Any))
                    .collect()
            },
            clear: |v| downcast_mut::<BTreeMap<K, V>>(v).clear(),
            insert: |v, k, val| {
                downcast_mut::<BTreeMap<K, V>>(v).insert(take_box::<K>(k), take_box::<V>(val));
            },
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_ops_roundtrip() {
        let ops = OptionOps::of::<u32>();
        let mut value: Option<u32> = None;

        assert!(!(ops.is_some)(&value));
        *downcast_mut::<u32>((ops.get_or_insert)(&mut value)) = 7;
        assert_eq!(value, Some(7));
        assert_eq!((ops.get)(&value).map(downcast_ref::<u32>), Some(&7));

        (ops.clear)(&mut value);
        assert_eq!(value, None);
    }

    #[test]
    fn list_push_slot_and_pop() {
        let ops = ListOps::of::<String>();
        let mut list: Vec<String> = vec!["a".to_owned()];

        *downcast_mut::<String>((ops.push_slot)(&mut list)) = "b".to_owned();
        assert_eq!(list, ["a", "b"]);

        (ops.push_slot)(&mut list);
        (ops.pop)(&mut list);
        assert_eq!(list, ["a", "b"]);
        assert_eq!((ops.len)(&list), 2);
    }

    #[test]
    fn map_insert_erased() {
        let ops = MapOps::btree_map::<String, i64>();
        let mut map: BTreeMap<String, i64> = BTreeMap::new();

        (ops.insert)(&mut map, Box::new("k".to_owned()), Box::new(3_i64));
        assert_eq!(map.get("k"), Some(&3));
        assert_eq!((ops.entries)(&map).len(), 1);
    }

    #[test]
    #[should_panic(expected = "erased accessor")]
    fn downcast_mismatch_panics() {
        let value: u32 = 1;
        downcast_ref::<String>(&value);
    }
}
