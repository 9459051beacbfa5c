//! Segment-to-class label assignment with count balancing.

use std::collections::HashMap;

use crate::palette::ClassLabel;

/// Per-class labeled-segment counters, kept in exact sync with the
/// assignment by increment/decrement on every insert/remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    counts: [usize; ClassLabel::ALL.len()],
}

impl ClassCounts {
    pub fn get(&self, label: ClassLabel) -> usize {
        self.counts[label.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Integer percentage per class, in [`ClassLabel::ALL`] order.
    ///
    /// A zero labeled total reports 0 for every class rather than failing.
    pub fn percentages(&self) -> [u32; ClassLabel::ALL.len()] {
        let total = self.total();
        if total == 0 {
            return [0; ClassLabel::ALL.len()];
        }
        let mut out = [0u32; ClassLabel::ALL.len()];
        for (slot, &count) in out.iter_mut().zip(&self.counts) {
            *slot = (100 * count / total) as u32;
        }
        out
    }

    fn add(&mut self, label: ClassLabel) {
        self.counts[label.index()] += 1;
    }

    fn remove(&mut self, label: ClassLabel) {
        self.counts[label.index()] -= 1;
    }
}

/// Mapping from segment id to class label.
///
/// Each segment id appears at most once: assigning a new label first removes
/// the previous pair (decrementing its class count) and then inserts the new
/// one (incrementing). Assigning the label a segment already holds is a
/// no-op. Any segment id and any of the fixed class labels are valid, so the
/// operation never fails.
#[derive(Debug, Clone, Default)]
pub struct LabelAssignment {
    by_segment: HashMap<u32, ClassLabel>,
    counts: ClassCounts,
}

impl LabelAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, segment_id: u32, label: ClassLabel) {
        match self.by_segment.get(&segment_id) {
            Some(current) if *current == label => {}
            Some(&previous) => {
                self.counts.remove(previous);
                self.by_segment.insert(segment_id, label);
                self.counts.add(label);
            }
            None => {
                self.by_segment.insert(segment_id, label);
                self.counts.add(label);
            }
        }
    }

    pub fn label_of(&self, segment_id: u32) -> Option<ClassLabel> {
        self.by_segment.get(&segment_id).copied()
    }

    pub fn counts_snapshot(&self) -> ClassCounts {
        self.counts
    }

    /// Number of labeled segments (the progress-bar value).
    pub fn labeled_total(&self) -> usize {
        self.by_segment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_segment.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, ClassLabel)> + '_ {
        self.by_segment.iter().map(|(&id, &label)| (id, label))
    }

    pub fn reset(&mut self) {
        self.by_segment.clear();
        self.counts = ClassCounts::default();
    }

    /// Direct tally over the pair set, used to cross-check the maintained
    /// counters after arbitrary assignment sequences.
    #[cfg(test)]
    fn recount(&self) -> ClassCounts {
        let mut counts = ClassCounts::default();
        for &label in self.by_segment.values() {
            counts.add(label);
        }
        counts
    }
}
