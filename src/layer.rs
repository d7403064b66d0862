use serde::{Deserialize, Serialize};

/// Layer bounds in document pixels, origin at the top left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pseudo-layer kinds delimiting groups in the layer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    OpenFolder,
    ClosedFolder,
    Divider,
}

/// One entry of the flat layer list, in storage order (bottom first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub index: usize,
    pub name: String,
    pub visible: bool,
    pub rect: Rect,
    pub section: Option<SectionKind>,
}

impl LayerRecord {
    pub fn layer(index: usize, name: impl Into<String>, visible: bool, rect: Rect) -> Self {
        LayerRecord {
            index,
            name: name.into(),
            visible,
            rect,
            section: None,
        }
    }

    pub fn folder(index: usize, name: impl Into<String>, visible: bool, opened: bool) -> Self {
        let section = if opened {
            SectionKind::OpenFolder
        } else {
            SectionKind::ClosedFolder
        };

        LayerRecord {
            index,
            name: name.into(),
            visible,
            rect: Rect::default(),
            section: Some(section),
        }
    }

    pub fn divider(index: usize) -> Self {
        LayerRecord {
            index,
            name: String::from("</Layer group>"),
            visible: true,
            rect: Rect::default(),
            section: Some(SectionKind::Divider),
        }
    }

    pub fn is_marker(&self) -> bool {
        self.section.is_some()
    }
}

/// Builds a storage-order record list from an authoring-order outline.
///
/// Handy for tests and for callers that already have a tree; indices are
/// assigned so that the first outline entry ends up on top.
#[derive(Debug, Default)]
pub struct StreamBuilder {
    // Authoring order, top first.
    entries: Vec<LayerRecord>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, name: &str, visible: bool, rect: Rect) -> Self {
        self.entries.push(LayerRecord::layer(0, name, visible, rect));
        self
    }

    pub fn open_group(mut self, name: &str, visible: bool, opened: bool) -> Self {
        self.entries.push(LayerRecord::folder(0, name, visible, opened));
        self
    }

    pub fn close_group(mut self) -> Self {
        self.entries.push(LayerRecord::divider(0));
        self
    }

    pub fn build(self) -> Vec<LayerRecord> {
        let mut records = self.entries;
        records.reverse();
        for (index, record) in records.iter_mut().enumerate() {
            record.index = index;
        }

        records
    }
}
