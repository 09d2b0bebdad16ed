//! An immutable, sorted, deduplicated set of integer timestamps.
//!
//! A [`Cursor`] is a position in that set. Stepping a cursor is index
//! arithmetic on the shared buffer; locating a timestamp is a binary search.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    timestamps: Vec<i64>,
}

/// Result of [`Timeline::seek`].
///
/// When the timestamp is stored, `exact` points at it and `before`/`after`
/// are its neighbours. Otherwise `exact` is `None` and `before`/`after` are
/// the closest stored values on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seek<'a> {
    pub before: Option<Cursor<'a>>,
    pub exact: Option<Cursor<'a>>,
    pub after: Option<Cursor<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor<'a> {
    timestamps: &'a [i64],
    index: usize,
}

impl Timeline {
    pub fn from_integers<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut timestamps: Vec<i64> = values.into_iter().collect();
        timestamps.sort_unstable();
        timestamps.dedup();
        Timeline { timestamps }
    }

    /// Build from real numbers that must all be whole.
    pub fn try_from_reals(values: &[f64]) -> Result<Self> {
        let mut integers = Vec::with_capacity(values.len());
        for &value in values {
            if !value.is_finite() || value.fract() != 0.0 {
                return Err(Error::Domain(format!(
                    "timeline timestamps must be integers, got {value}"
                )));
            }
            integers.push(value as i64);
        }
        Ok(Self::from_integers(integers))
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Ascending iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = i64> + '_ {
        self.timestamps.iter().copied()
    }

    /// Descending iteration.
    pub fn backward(&self) -> impl Iterator<Item = i64> + '_ {
        self.timestamps.iter().rev().copied()
    }

    pub fn start(&self) -> Option<Cursor<'_>> {
        self.cursor(0)
    }

    pub fn end(&self) -> Option<Cursor<'_>> {
        self.timestamps.len().checked_sub(1).and_then(|i| self.cursor(i))
    }

    /// Cursor at a position in sorted order, if that position exists.
    pub fn cursor(&self, index: usize) -> Option<Cursor<'_>> {
        (index < self.timestamps.len()).then_some(Cursor {
            timestamps: &self.timestamps,
            index,
        })
    }

    /// Sorted position of `timestamp` if it is stored.
    pub fn position(&self, timestamp: i64) -> Option<usize> {
        self.timestamps.binary_search(&timestamp).ok()
    }

    pub fn seek(&self, timestamp: i64) -> Seek<'_> {
        match self.timestamps.binary_search(&timestamp) {
            Ok(index) => Seek {
                before: index.checked_sub(1).and_then(|i| self.cursor(i)),
                exact: self.cursor(index),
                after: self.cursor(index + 1),
            },
            // `insert_at` is the first stored value greater than `timestamp`.
            Err(insert_at) => Seek {
                before: insert_at.checked_sub(1).and_then(|i| self.cursor(i)),
                exact: None,
                after: self.cursor(insert_at),
            },
        }
    }
}

impl FromIterator<i64> for Timeline {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self::from_integers(iter)
    }
}

impl<'a> Cursor<'a> {
    pub fn timestamp(&self) -> i64 {
        self.timestamps[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn next(&self) -> Option<Cursor<'a>> {
        let index = self.index + 1;
        (index < self.timestamps.len()).then_some(Cursor {
            timestamps: self.timestamps,
            index,
        })
    }

    pub fn prev(&self) -> Option<Cursor<'a>> {
        self.index.checked_sub(1).map(|index| Cursor {
            timestamps: self.timestamps,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(cursor: Option<Cursor<'_>>) -> Option<i64> {
        cursor.map(|c| c.timestamp())
    }

    #[test]
    fn sorts_and_deduplicates() {
        let timeline = Timeline::from_integers([30, 10, 20, 10, 30, -5]);
        assert_eq!(timeline.timestamps(), &[-5, 10, 20, 30]);
        assert_eq!(timeline.len(), 4);
        assert_eq!(timeline.backward().collect::<Vec<_>>(), vec![30, 20, 10, -5]);
    }

    #[test]
    fn rejects_non_integer_reals() {
        let err = Timeline::try_from_reals(&[1.0, 2.5]).unwrap_err();
        assert!(matches!(err, Error::Domain(_)));

        let timeline = Timeline::try_from_reals(&[3.0, 1.0, 3.0]).unwrap();
        assert_eq!(timeline.timestamps(), &[1, 3]);
    }

    #[test]
    fn seek_between_values() {
        let timeline = Timeline::from_integers([10, 20, 30]);

        let seek = timeline.seek(25);
        assert_eq!(stamp(seek.before), Some(20));
        assert_eq!(stamp(seek.exact), None);
        assert_eq!(stamp(seek.after), Some(30));

        let seek = timeline.seek(5);
        assert_eq!(stamp(seek.before), None);
        assert_eq!(stamp(seek.exact), None);
        assert_eq!(stamp(seek.after), Some(10));

        let seek = timeline.seek(35);
        assert_eq!(stamp(seek.before), Some(30));
        assert_eq!(stamp(seek.after), None);
    }

    #[test]
    fn seek_exact_value() {
        let timeline = Timeline::from_integers([10, 20, 30]);

        let seek = timeline.seek(20);
        assert_eq!(stamp(seek.before), Some(10));
        assert_eq!(stamp(seek.exact), Some(20));
        assert_eq!(stamp(seek.after), Some(30));

        let seek = timeline.seek(10);
        assert_eq!(stamp(seek.before), None);
        assert_eq!(stamp(seek.exact), Some(10));
    }

    #[test]
    fn cursors_walk_both_ways() {
        let timeline = Timeline::from_integers([1, 2, 3]);
        let start = timeline.start().unwrap();
        assert!(start.prev().is_none());

        let mut forward = Vec::new();
        let mut cursor = Some(start);
        while let Some(c) = cursor {
            forward.push(c.timestamp());
            cursor = c.next();
        }
        assert_eq!(forward, vec![1, 2, 3]);

        let end = timeline.end().unwrap();
        assert_eq!(end.timestamp(), 3);
        assert!(end.next().is_none());
        assert_eq!(end.prev().unwrap().timestamp(), 2);
    }

    #[test]
    fn empty_timeline_has_no_cursors() {
        let timeline = Timeline::from_integers(std::iter::empty());
        assert!(timeline.is_empty());
        assert!(timeline.start().is_none());
        assert!(timeline.end().is_none());

        let seek = timeline.seek(0);
        assert!(seek.before.is_none() && seek.exact.is_none() && seek.after.is_none());
    }

    #[test]
    fn seek_brackets_tightly_over_many_values() {
        let timeline: Timeline = (0..100).map(|i| i * 3).collect();
        for t in -2..300 {
            let seek = timeline.seek(t);
            let stored = timeline.timestamps();
            let below = stored.iter().copied().filter(|&v| v < t).max();
            let above = stored.iter().copied().filter(|&v| v > t).min();
            assert_eq!(stamp(seek.before), below, "before {t}");
            assert_eq!(stamp(seek.after), above, "after {t}");
            assert_eq!(stamp(seek.exact), stored.contains(&t).then_some(t));
        }
    }
}
