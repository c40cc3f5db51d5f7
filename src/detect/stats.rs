use std::collections::BTreeMap;

use super::result::Detection;

/// Per-class counts for the most recent frame.
///
/// Replaced wholesale on every update: a class absent from the latest frame has
/// no row, even if it was present before. Rows iterate in class-name order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionStats {
    counts: BTreeMap<String, usize>,
}

impl DetectionStats {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = BTreeMap::new();
        for detection in detections {
            *counts.entry(detection.class_name.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Replace all counts with those of `detections`.
    pub fn replace(&mut self, detections: &[Detection]) {
        *self = Self::from_detections(detections);
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn get(&self, class_name: &str) -> usize {
        self.counts.get(class_name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Table rows `(class name, count)`.
    pub fn rows(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }
}
