//! Change detection between successive cycles.

/// Indices where `previous` and `current` differ, in ascending order.
///
/// Both slices are expected to have the same length; extra entries in the
/// longer one are reported as changed.
pub fn changed_indices(previous: &[bool], current: &[bool]) -> Vec<usize> {
    let len = previous.len().max(current.len());
    (0..len)
        .filter(|&i| previous.get(i) != current.get(i))
        .collect()
}

/// Compares each decoded sequence against the last one it saw.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    baseline: Option<Vec<bool>>,
    only_on_change: bool,
}

impl ChangeDetector {
    pub fn new(only_on_change: bool) -> Self {
        Self {
            baseline: None,
            only_on_change,
        }
    }

    /// Indices to dispatch for `current`, then adopt it as the new baseline.
    ///
    /// The first call reports every index. Afterwards, every index is reported
    /// when change filtering is off, otherwise only those that differ.
    pub fn diff(&mut self, current: &[bool]) -> Vec<usize> {
        let changed = match &self.baseline {
            Some(previous) if self.only_on_change => changed_indices(previous, current),
            _ => (0..current.len()).collect(),
        };

        if self.baseline.as_deref() != Some(current) {
            self.baseline = Some(current.to_vec());
        }

        changed
    }

    /// The last sequence passed to [`diff`](Self::diff).
    pub fn baseline(&self) -> Option<&[bool]> {
        self.baseline.as_deref()
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_indices() {
        assert_eq!(
            changed_indices(&[false, true, true], &[true, true, false]),
            vec![0, 2]
        );
        assert!(changed_indices(&[true, false], &[true, false]).is_empty());
    }

    #[test]
    fn test_first_diff_reports_everything() {
        let mut detector = ChangeDetector::new(true);
        assert!(!detector.has_baseline());
        assert_eq!(detector.diff(&[true, false, true, true]), vec![0, 1, 2, 3]);
        assert_eq!(detector.baseline(), Some(&[true, false, true, true][..]));
    }

    #[test]
    fn test_only_on_change() {
        let mut detector = ChangeDetector::new(true);
        detector.diff(&[false, true]);

        assert!(detector.diff(&[false, true]).is_empty());
        assert_eq!(detector.diff(&[true, true]), vec![0]);
    }

    #[test]
    fn test_idempotent_after_baseline_update() {
        let mut detector = ChangeDetector::new(true);
        detector.diff(&[false, false, false]);

        assert_eq!(detector.diff(&[false, true, true]), vec![1, 2]);
        assert!(detector.diff(&[false, true, true]).is_empty());
    }

    #[test]
    fn test_change_filter_disabled() {
        let mut detector = ChangeDetector::new(false);
        assert_eq!(detector.diff(&[true, false]), vec![0, 1]);
        assert_eq!(detector.diff(&[true, false]), vec![0, 1]);
    }
}
