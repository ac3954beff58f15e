//! Fixed-width field-name matcher.
//!
//! Structs with at most 32 fields whose wire names all fit in 16 bytes get
//! their names packed into `u128` words. Lookup is then a linear scan of
//! integer compares, which beats hashing short keys for the struct sizes seen
//! in practice.

pub(crate) const MAX_KEYS: usize = 32;
pub(crate) const MAX_KEY_LEN: usize = 16;

pub(crate) struct Keyset {
    entries: Vec<(u128, u8)>,
}

impl Keyset {
    /// Packs the wire names, or returns `None` when the set does not fit.
    pub(crate) fn new(names: &[&str]) -> Option<Keyset> {
        if names.len() > MAX_KEYS {
            return None;
        }
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            entries.push(pack(name.as_bytes())?);
        }
        Some(Keyset { entries })
    }

    /// Returns the index of the matching name, if any. Comparison is exact.
    pub(crate) fn lookup(&self, key: &[u8]) -> Option<usize> {
        let packed = pack(key)?;
        self.entries.iter().position(|&entry| entry == packed)
    }
}

fn pack(key: &[u8]) -> Option<(u128, u8)> {
    if key.len() > MAX_KEY_LEN {
        return None;
    }
    let mut word = [0u8; MAX_KEY_LEN];
    word[..key.len()].copy_from_slice(key);
    Some((u128::from_le_bytes(word), key.len() as u8))
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_exact() {
        let set = Keyset::new(&["id", "name", "created_at"]).unwrap();
        assert_eq!(set.lookup(b"id"), Some(0));
        assert_eq!(set.lookup(b"created_at"), Some(2));
        assert_eq!(set.lookup(b"Name"), None);
        assert_eq!(set.lookup(b"missing"), None);
    }

    #[test]
    fn prefix_is_not_a_match() {
        let set = Keyset::new(&["name"]).unwrap();
        assert_eq!(set.lookup(b"nam"), None);
        assert_eq!(set.lookup(b"names"), None);
    }

    #[test]
    fn oversized_names_reject_the_set() {
        assert!(Keyset::new(&["a_name_longer_than_sixteen"]).is_none());
        assert_eq!(
            Keyset::new(&["exactly_16_chars"]).unwrap().lookup(b"exactly_16_chars"),
            Some(0)
        );
    }

    #[test]
    fn too_many_keys_reject_the_set() {
        let names: Vec<String> = (0..33).map(|i| format!("f{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        assert!(Keyset::new(&refs).is_none());
    }

    #[test]
    fn oversized_probe_misses() {
        let set = Keyset::new(&["id"]).unwrap();
        assert_eq!(set.lookup(b"a_probe_longer_than_sixteen_bytes"), None);
    }
}
