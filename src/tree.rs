//! Rebuilds the group tree from the flat, marker-delimited layer list.
//!
//! Photoshop stores layers bottom to top, and a group as a divider record
//! below its children followed by a folder record above them. Scanning the
//! list from the top therefore meets the folder first, which is the group's
//! `end`, and the divider last, which is its `start`.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::layer::{LayerRecord, SectionKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    /// Index of the divider record, the lowest layer owned by the group.
    pub start: usize,
    /// Index of the folder record, the group's header row.
    pub end: usize,
    pub visible: bool,
    /// Expanded in the layer list.
    pub opened: bool,
}

impl GroupInfo {
    fn new(name: &str, end: usize, visible: bool, opened: bool) -> Self {
        GroupInfo {
            name: name.to_string(),
            start: end,
            end,
            visible,
            opened,
        }
    }

    pub fn contains_layer(&self, index: usize) -> bool {
        index <= self.end && index >= self.start
    }

    pub fn span(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct LayerTree {
    records: Vec<LayerRecord>,
    groups: Vec<GroupInfo>,
    layer_visibility: Vec<bool>,
    layer_indices: Vec<usize>,
}

impl LayerTree {
    pub fn build(records: Vec<LayerRecord>) -> Result<Self> {
        let mut layer_indices = vec![];
        let mut groups = vec![];
        let mut open_groups: Vec<GroupInfo> = vec![];
        let mut layer_visibility = Vec::with_capacity(records.len());

        // Top to bottom, the way the layers panel shows them
        for (index, record) in records.iter().enumerate().rev() {
            layer_visibility.push(record.visible);

            match record.section {
                Some(SectionKind::OpenFolder) | Some(SectionKind::ClosedFolder) => {
                    let opened = record.section == Some(SectionKind::OpenFolder);
                    open_groups.push(GroupInfo::new(&record.name, index, record.visible, opened));
                }
                Some(SectionKind::Divider) => {
                    let mut group = open_groups
                        .pop()
                        .ok_or(ImportError::MalformedSections { index })?;
                    group.start = index;
                    debug!(
                        "group '{}' spans layers {}..={}",
                        group.name, group.start, group.end
                    );
                    groups.push(group);
                }
                None => layer_indices.push(index),
            }
        }

        if let Some(group) = open_groups.pop() {
            return Err(ImportError::UnclosedGroup {
                name: group.name,
                end: group.end,
            });
        }

        // Collected top first, flip back to storage order
        layer_visibility.reverse();

        Ok(LayerTree {
            records,
            groups,
            layer_visibility,
            layer_indices,
        })
    }

    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&LayerRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Completed groups, in the order their dividers were reached.
    pub fn groups(&self) -> &[GroupInfo] {
        &self.groups
    }

    pub fn group(&self, id: usize) -> Option<&GroupInfo> {
        self.groups.get(id)
    }

    /// Per-record visibility, indexed by storage position.
    pub fn layer_visibility(&self) -> &[bool] {
        &self.layer_visibility
    }

    pub fn is_layer_visible(&self, index: usize) -> bool {
        self.layer_visibility.get(index).copied().unwrap_or(false)
    }

    /// Plain (non-marker) layers, top first.
    pub fn layer_indices(&self) -> &[usize] {
        &self.layer_indices
    }

    /// Innermost group containing `index`, `None` for top-level layers.
    pub fn innermost_group(&self, index: usize) -> Option<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.contains_layer(index))
            .min_by_key(|(_, group)| group.span())
            .map(|(id, _)| id)
    }

    pub fn group_by_layer_index(&self, index: usize) -> Option<&GroupInfo> {
        self.innermost_group(index).and_then(|id| self.group(id))
    }

    /// Group whose header row sits at `index`.
    pub fn group_by_start_index(&self, index: usize) -> Option<&GroupInfo> {
        self.groups.iter().find(|group| group.end == index)
    }

    pub fn find_group(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|group| group.name == name)
    }

    pub fn set_group_visible(&mut self, id: usize, visible: bool) -> Result<()> {
        let group = self
            .groups
            .get_mut(id)
            .ok_or(ImportError::UnknownGroupId(id))?;
        group.visible = visible;

        if let Some(header) = self.layer_visibility.get_mut(group.end) {
            *header = visible;
        }

        Ok(())
    }

    pub fn set_group_opened(&mut self, id: usize, opened: bool) -> Result<()> {
        let group = self
            .groups
            .get_mut(id)
            .ok_or(ImportError::UnknownGroupId(id))?;
        group.opened = opened;

        Ok(())
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        let slot = self
            .layer_visibility
            .get_mut(index)
            .ok_or(ImportError::UnknownLayer(index))?;
        *slot = visible;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Rect, StreamBuilder};

    fn rect() -> Rect {
        Rect::new(0, 0, 8, 8)
    }

    // Outer [ A, Inner [ B ], C ], D
    fn nested() -> Vec<LayerRecord> {
        StreamBuilder::new()
            .open_group("Outer", true, true)
            .layer("A", true, rect())
            .open_group("Inner", false, true)
            .layer("B", true, rect())
            .close_group()
            .layer("C", false, rect())
            .close_group()
            .layer("D", true, rect())
            .build()
    }

    #[test]
    fn builds_nested_ranges() {
        let tree = LayerTree::build(nested()).unwrap();

        // Storage: 0 D, 1 div, 2 C, 3 div, 4 B, 5 Inner, 6 A, 7 Outer
        assert_eq!(tree.groups().len(), 2);
        let inner = &tree.groups()[0];
        assert_eq!((inner.name.as_str(), inner.start, inner.end), ("Inner", 3, 5));
        assert!(!inner.visible);
        let outer = &tree.groups()[1];
        assert_eq!((outer.name.as_str(), outer.start, outer.end), ("Outer", 1, 7));

        assert_eq!(tree.layer_indices(), &[6, 4, 2, 0]);
    }

    #[test]
    fn visibility_is_in_storage_order() {
        let records = nested();
        let tree = LayerTree::build(records.clone()).unwrap();

        let expected: Vec<bool> = records.iter().map(|r| r.visible).collect();
        assert_eq!(tree.layer_visibility(), expected.as_slice());

        let mut twice = tree.layer_visibility().to_vec();
        twice.reverse();
        twice.reverse();
        assert_eq!(twice, expected);
    }

    #[test]
    fn innermost_group_wins() {
        let tree = LayerTree::build(nested()).unwrap();

        assert_eq!(tree.group_by_layer_index(4).unwrap().name, "Inner");
        assert_eq!(tree.group_by_layer_index(5).unwrap().name, "Inner");
        assert_eq!(tree.group_by_layer_index(6).unwrap().name, "Outer");
        assert_eq!(tree.group_by_layer_index(2).unwrap().name, "Outer");
        assert!(tree.group_by_layer_index(0).is_none());
        assert_eq!(tree.group_by_start_index(5).unwrap().name, "Inner");
        assert!(tree.group_by_start_index(4).is_none());
    }

    #[test]
    fn ranges_never_straddle() {
        let records = StreamBuilder::new()
            .open_group("A", true, true)
            .open_group("B", true, false)
            .layer("b", true, rect())
            .close_group()
            .open_group("C", true, true)
            .open_group("D", true, true)
            .layer("d", true, rect())
            .close_group()
            .close_group()
            .close_group()
            .open_group("E", true, true)
            .close_group()
            .build();
        let tree = LayerTree::build(records).unwrap();

        for a in tree.groups() {
            for b in tree.groups() {
                let disjoint = a.end < b.start || b.end < a.start;
                let a_in_b = b.start <= a.start && a.end <= b.end;
                let b_in_a = a.start <= b.start && b.end <= a.end;
                assert!(disjoint || a_in_b || b_in_a, "{a:?} straddles {b:?}");
            }
        }
    }

    #[test]
    fn stray_divider_is_an_error() {
        let records = vec![
            LayerRecord::layer(0, "Background", true, rect()),
            LayerRecord::divider(1),
        ];

        match LayerTree::build(records) {
            Err(ImportError::MalformedSections { index }) => assert_eq!(index, 1),
            other => panic!("expected malformed sections, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_group_is_an_error() {
        let records = vec![
            LayerRecord::layer(0, "Background", true, rect()),
            LayerRecord::folder(1, "Dangling", true, true),
        ];

        assert!(matches!(
            LayerTree::build(records),
            Err(ImportError::UnclosedGroup { end: 1, .. })
        ));
    }

    #[test]
    fn hiding_a_group_updates_its_header_row() {
        let mut tree = LayerTree::build(nested()).unwrap();
        let outer = tree.find_group("Outer").unwrap();

        tree.set_group_visible(outer, false).unwrap();

        assert!(!tree.group(outer).unwrap().visible);
        assert!(!tree.is_layer_visible(7));
        assert!(tree.is_layer_visible(6));
    }

    #[test]
    fn unknown_group_ids_are_rejected() {
        let mut tree = LayerTree::build(nested()).unwrap();
        let missing = tree.groups().len();

        assert!(tree.group(missing).is_none());
        assert!(matches!(
            tree.set_group_visible(missing, false),
            Err(ImportError::UnknownGroupId(id)) if id == missing
        ));
        assert!(matches!(
            tree.set_group_opened(missing, false),
            Err(ImportError::UnknownGroupId(id)) if id == missing
        ));
    }
}
