//! Authoritative current value of every monitored point.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current state of one point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointState {
    /// Position within the polled block.
    pub index: usize,
    /// Last known value, `None` until the first successful cycle.
    pub value: Option<bool>,
    /// When the value was last written by a cycle.
    pub last_changed: Option<DateTime<Utc>>,
}

/// Fixed-size table of [`PointState`], one entry per polled point.
#[derive(Debug, Clone)]
pub struct PointTable {
    points: Vec<PointState>,
}

impl PointTable {
    pub fn new(count: usize) -> Self {
        Self {
            points: (0..count)
                .map(|index| PointState {
                    index,
                    value: None,
                    last_changed: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PointState> {
        self.points.get(index)
    }

    /// Value of a point, `None` when unknown or out of range.
    pub fn value(&self, index: usize) -> Option<bool> {
        self.points.get(index).and_then(|p| p.value)
    }

    /// All values in index order.
    pub fn values(&self) -> Vec<Option<bool>> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointState> {
        self.points.iter()
    }

    /// Write `values[i]` into every point listed in `changed`.
    pub fn apply(&mut self, changed: &[usize], values: &[bool], now: DateTime<Utc>) {
        for &index in changed {
            if let (Some(point), Some(&value)) = (self.points.get_mut(index), values.get(index)) {
                point.value = Some(value);
                point.last_changed = Some(now);
            }
        }
    }
}

/// Point table shared between the scheduler (sole writer) and readers.
#[derive(Debug, Clone)]
pub struct SharedPoints(Arc<RwLock<PointTable>>);

impl SharedPoints {
    pub fn new(count: usize) -> Self {
        Self(Arc::new(RwLock::new(PointTable::new(count))))
    }

    /// Read access. A poisoned lock still yields the last written table.
    pub fn read(&self) -> RwLockReadGuard<'_, PointTable> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PointTable> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> PointTable {
        self.read().clone()
    }

    /// Value of a point, `None` when unknown or out of range.
    pub fn value(&self, index: usize) -> Option<bool> {
        self.read().value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_is_unknown() {
        let table = PointTable::new(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.values(), vec![None, None, None]);
        assert!(table.get(2).unwrap().last_changed.is_none());
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_apply_only_touches_changed() {
        let mut table = PointTable::new(3);
        let now = Utc::now();
        table.apply(&[0, 2], &[true, true, false], now);

        assert_eq!(table.values(), vec![Some(true), None, Some(false)]);
        assert_eq!(table.get(0).unwrap().last_changed, Some(now));
        assert!(table.get(1).unwrap().last_changed.is_none());
    }

    #[test]
    fn test_shared_points() {
        let shared = SharedPoints::new(2);
        shared.write().apply(&[1], &[false, true], Utc::now());

        assert_eq!(shared.value(0), None);
        assert_eq!(shared.value(1), Some(true));
        assert_eq!(shared.snapshot().values(), vec![None, Some(true)]);
    }
}
