//! Range descriptors for key and index lookups.

use crate::error::{CoreError, CoreResult};
use agilestore_codec::{Key, Value};
use agilestore_engine::KeyRange as EngineRange;

/// Which keys a lookup, count or delete covers.
///
/// `only` takes precedence over the bounds. With neither set the range is
/// unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Exact key to match.
    pub only: Option<Value>,
    /// Lower bound.
    pub lower: Option<Value>,
    /// Whether the lower bound is excluded.
    pub lower_open: bool,
    /// Upper bound.
    pub upper: Option<Value>,
    /// Whether the upper bound is excluded.
    pub upper_open: bool,
}

impl KeyRange {
    /// A range covering every key.
    pub fn all() -> Self {
        Self::default()
    }

    /// A range matching exactly `value`.
    pub fn only(value: impl Into<Value>) -> Self {
        Self {
            only: Some(value.into()),
            ..Self::default()
        }
    }

    /// A range from `lower` to `upper`, both included.
    pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self::default().lower(lower).upper(upper)
    }

    /// Sets the lower bound.
    #[must_use]
    pub fn lower(mut self, value: impl Into<Value>) -> Self {
        self.lower = Some(value.into());
        self
    }

    /// Sets whether the lower bound is excluded.
    #[must_use]
    pub fn lower_open(mut self, open: bool) -> Self {
        self.lower_open = open;
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub fn upper(mut self, value: impl Into<Value>) -> Self {
        self.upper = Some(value.into());
        self
    }

    /// Sets whether the upper bound is excluded.
    #[must_use]
    pub fn upper_open(mut self, open: bool) -> Self {
        self.upper_open = open;
        self
    }

    /// Returns true if the range has neither `only` nor bounds.
    pub fn is_unbounded(&self) -> bool {
        self.only.is_none() && self.lower.is_none() && self.upper.is_none()
    }

    /// Translates the descriptor into an engine range (`None` when unbounded).
    pub(crate) fn to_engine(&self) -> CoreResult<Option<EngineRange>> {
        if let Some(only) = &self.only {
            return Ok(Some(EngineRange::only(Key::new(only.clone())?)));
        }
        let lower = self.lower.clone().map(Key::new).transpose()?;
        let upper = self.upper.clone().map(Key::new).transpose()?;
        Ok(match (lower, upper) {
            (Some(lower), Some(upper)) => Some(
                EngineRange::bound(lower, upper, self.lower_open, self.upper_open)
                    .map_err(CoreError::request)?,
            ),
            (Some(lower), None) => Some(EngineRange::lower_bound(lower, self.lower_open)),
            (None, Some(upper)) => Some(EngineRange::upper_bound(upper, self.upper_open)),
            (None, None) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agilestore_engine::ErrorKind;

    #[test]
    fn only_wins_over_bounds() {
        let range = KeyRange::only(5).lower(1).upper(3);
        let engine = range.to_engine().unwrap().unwrap();
        assert!(engine.contains(&Key::from(5)));
        assert!(!engine.contains(&Key::from(2)));
    }

    #[test]
    fn no_bounds_is_unbounded() {
        assert!(KeyRange::all().is_unbounded());
        assert_eq!(KeyRange::all().to_engine().unwrap(), None);
    }

    #[test]
    fn open_flags_are_honoured() {
        let range = KeyRange::between(1, 3).lower_open(true);
        let engine = range.to_engine().unwrap().unwrap();
        assert!(!engine.contains(&Key::from(1)));
        assert!(engine.contains(&Key::from(3)));

        let upper = KeyRange::all().upper("m").upper_open(true);
        let engine = upper.to_engine().unwrap().unwrap();
        assert!(engine.contains(&Key::from("a")));
        assert!(!engine.contains(&Key::from("m")));
    }

    #[test]
    fn inverted_range_is_a_data_error() {
        let err = KeyRange::between(5, 1).to_engine().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Data));
    }

    #[test]
    fn invalid_key_is_a_codec_error() {
        let err = KeyRange::only(true).to_engine().unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));
    }
}
