//! Range markers that follow text edits.
//!
//! Every reference, declaration and text occurrence handed out by the
//! in-memory graph is backed by a marker. Edits shift markers that lie after
//! them, grow or shrink markers that contain them and invalidate markers they
//! partially overlap.

use crate::graph::MarkerId;
use crate::symbol::Location;

#[derive(Debug, Clone)]
struct Marker {
    file: String,
    start: usize,
    end: usize,
    valid: bool,
}

/// Table of all markers of a graph.
#[derive(Debug, Clone, Default)]
pub(crate) struct MarkerTable {
    markers: Vec<Marker>,
}

impl MarkerTable {
    /// Register a new marker.
    pub(crate) fn add(&mut self, file: &str, start: usize, end: usize) -> MarkerId {
        let id = MarkerId(self.markers.len() as u32);
        self.markers.push(Marker {
            file: file.to_string(),
            start,
            end,
            valid: true,
        });
        id
    }

    /// Current location of a marker, `None` once invalidated.
    pub(crate) fn location(&self, id: MarkerId) -> Option<Location> {
        self.markers
            .get(id.0 as usize)
            .filter(|m| m.valid)
            .map(|m| Location::new(m.file.clone(), m.start, m.end))
    }

    /// Last location of a marker, valid or not.
    pub(crate) fn last_known(&self, id: MarkerId) -> Option<Location> {
        self.markers
            .get(id.0 as usize)
            .map(|m| Location::new(m.file.clone(), m.start, m.end))
    }

    /// Move the start of a valid marker back over text inserted right before it.
    pub(crate) fn extend_start(&mut self, id: MarkerId, start: usize) {
        if let Some(marker) = self.markers.get_mut(id.0 as usize) {
            if marker.valid && start <= marker.start {
                marker.start = start;
            }
        }
    }

    /// Mark a marker as no longer pointing at anything.
    pub(crate) fn invalidate(&mut self, id: MarkerId) {
        if let Some(marker) = self.markers.get_mut(id.0 as usize) {
            marker.valid = false;
        }
    }

    /// Adjust all markers of `file` for a replacement of `[start, end)` by
    /// `new_len` bytes.
    pub(crate) fn apply_edit(&mut self, file: &str, start: usize, end: usize, new_len: usize) {
        for marker in self.markers.iter_mut().filter(|m| m.valid && m.file == file) {
            if marker.end <= start {
                continue;
            }
            if marker.start >= end {
                marker.start = marker.start - end + start + new_len;
                marker.end = marker.end - end + start + new_len;
            } else if marker.start <= start && marker.end >= end {
                marker.end = marker.end - end + start + new_len;
            } else {
                marker.valid = false;
            }
        }
    }

    /// Move all markers of one file to another path.
    pub(crate) fn rename_file(&mut self, from: &str, to: &str) {
        for marker in self.markers.iter_mut().filter(|m| m.file == from) {
            marker.file = to.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_after_edit_shift() {
        let mut table = MarkerTable::default();
        let before = table.add("A.java", 0, 3);
        let after = table.add("A.java", 20, 25);
        table.apply_edit("A.java", 5, 10, 8);
        assert_eq!(table.location(before), Some(Location::new("A.java", 0, 3)));
        assert_eq!(table.location(after), Some(Location::new("A.java", 23, 28)));
    }

    #[test]
    fn test_containing_marker_grows_and_edited_marker_resizes() {
        let mut table = MarkerTable::default();
        let outer = table.add("A.java", 0, 100);
        let exact = table.add("A.java", 10, 15);
        table.apply_edit("A.java", 10, 15, 2);
        assert_eq!(table.location(outer), Some(Location::new("A.java", 0, 97)));
        assert_eq!(table.location(exact), Some(Location::new("A.java", 10, 12)));
    }

    #[test]
    fn test_partial_overlap_invalidates() {
        let mut table = MarkerTable::default();
        let overlapping = table.add("A.java", 8, 12);
        let other_file = table.add("B.java", 8, 12);
        table.apply_edit("A.java", 10, 20, 0);
        assert_eq!(table.location(overlapping), None);
        assert_eq!(table.location(other_file), Some(Location::new("B.java", 8, 12)));
    }
}
