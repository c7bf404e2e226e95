//! Key ranges.

use crate::error::{EngineError, EngineResult};
use agilestore_codec::Key;
use std::ops::Bound;

/// A contiguous interval of keys.
///
/// Used to scope reads, counts, deletes and cursors. Ranges are validated on
/// construction, so iterating a store with one never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// A range matching every key.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// A range matching exactly `key`.
    #[must_use]
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys at or above `key` (strictly above when `open`).
    #[must_use]
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: bound(key, open),
            upper: Bound::Unbounded,
        }
    }

    /// Keys at or below `key` (strictly below when `open`).
    #[must_use]
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: bound(key, open),
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns a data error if `lower` sorts after `upper`, or if they are
    /// equal and either end is open.
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> EngineResult<Self> {
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(EngineError::data(format!(
                "empty key range: lower {lower} is not below upper {upper}"
            )));
        }
        Ok(Self {
            lower: bound(lower, lower_open),
            upper: bound(upper, upper_open),
        })
    }

    /// Returns the lower end.
    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    /// Returns the upper end.
    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// Returns true if `key` lies inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    pub(crate) fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (self.lower.as_ref(), self.upper.as_ref())
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        Self::only(key)
    }
}

fn bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn only_contains_single_key() {
        let range = KeyRange::only(Key::from(5));
        assert!(range.contains(&Key::from(5)));
        assert!(!range.contains(&Key::from(4)));
        assert!(!range.contains(&Key::from(6)));
    }

    #[test]
    fn open_bounds_exclude_endpoints() {
        let range = KeyRange::bound(Key::from(1), Key::from(3), true, true).unwrap();
        assert!(!range.contains(&Key::from(1)));
        assert!(range.contains(&Key::from(2)));
        assert!(!range.contains(&Key::from(3)));
    }

    #[test]
    fn half_open_ranges() {
        let lower = KeyRange::lower_bound(Key::from("m"), false);
        assert!(lower.contains(&Key::from("m")));
        assert!(lower.contains(&Key::from("z")));
        assert!(!lower.contains(&Key::from("a")));

        let upper = KeyRange::upper_bound(Key::from("m"), true);
        assert!(upper.contains(&Key::from("a")));
        assert!(!upper.contains(&Key::from("m")));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = KeyRange::bound(Key::from(3), Key::from(1), false, false).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Data);
        assert!(KeyRange::bound(Key::from(1), Key::from(1), true, false).is_err());
        assert!(KeyRange::bound(Key::from(1), Key::from(1), false, false).is_ok());
    }

    proptest! {
        #[test]
        fn bound_matches_interval(lo in -50i64..50, hi in -50i64..50, k in -60i64..60) {
            prop_assume!(lo <= hi);
            let range = KeyRange::bound(Key::from(lo), Key::from(hi), false, false).unwrap();
            prop_assert_eq!(range.contains(&Key::from(k)), lo <= k && k <= hi);
        }
    }
}
