//! Rebuilds the group hierarchy as scene nodes.
//!
//! Building happens in three steps: [`plan`] walks the layers and places
//! every sprite in absolute target space, the plan then anchors each group
//! on the bounds of everything below it, and [`materialize`] hands the final
//! tree to a [`SceneBackend`] one node at a time.

use std::path::PathBuf;

pub use glam::Vec2;
use log::debug;
use serde::Serialize;

use crate::error::{ImportError, Result};
use crate::export;
use crate::mask::{self, Row, RowKind};
use crate::settings::{Alignment, ExportSettings};
use crate::tree::LayerTree;

/// Axis aligned box in target space, y up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Point inside the box at normalized `pivot`.
    pub fn lerp(&self, pivot: (f32, f32)) -> Vec2 {
        self.min + (self.max - self.min) * Vec2::from(pivot)
    }
}

/// Target space of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Units {
    /// World units, pixels divided by pixels per unit.
    Sprite,
    /// Canvas pixels.
    Ui,
}

/// What gets attached to a leaf node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visual {
    pub layer: usize,
    pub sprite: PathBuf,
    /// Size in target units.
    pub size: Vec2,
    pub pivot: (f32, f32),
    /// Higher draws on top.
    pub sorting_order: i32,
    pub sorting_layer: Option<String>,
}

/// Host side of a build: how nodes are made and how sprites are shown.
pub trait SceneBackend {
    type Node;

    fn units(&self) -> Units;

    fn create_node(&mut self, parent: Option<&Self::Node>, name: &str, local: Vec2) -> Self::Node;

    fn attach_visual(&mut self, node: &Self::Node, visual: &Visual);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub name: String,
    /// Position relative to the parent node.
    pub local: Vec2,
    /// Position in target space, the anchor for groups.
    pub absolute: Vec2,
    pub bounds: Option<Bounds>,
    pub visual: Option<Visual>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    fn container(name: &str) -> Self {
        PlanNode {
            name: name.to_string(),
            local: Vec2::ZERO,
            absolute: Vec2::ZERO,
            bounds: None,
            visual: None,
            children: vec![],
        }
    }

    pub fn find(&self, name: &str) -> Option<&PlanNode> {
        if self.name == name {
            return Some(self);
        }

        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn leaf_count(&self) -> usize {
        let own = usize::from(self.visual.is_some());

        own + self.children.iter().map(PlanNode::leaf_count).sum::<usize>()
    }

    pub fn list(&self) -> Vec<String> {
        let mut strings = vec![];
        self.list_into(0, &mut strings);

        strings
    }

    fn list_into(&self, depth: usize, strings: &mut Vec<String>) {
        let kind = if self.visual.is_some() { "S" } else { "G" };
        strings.push(format!(
            "{}[{kind}] {} ({:.3}, {:.3})",
            "\t".repeat(depth),
            self.name,
            self.local.x,
            self.local.y
        ));

        for child in &self.children {
            child.list_into(depth + 1, strings);
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build only this group instead of the whole document.
    pub group: Option<usize>,
    /// Document point that lands on the root's origin.
    pub document_pivot: Alignment,
    pub document_size: (u32, u32),
    pub sorting_layer: Option<String>,
    /// Root node name, the file stem when unset.
    pub root_name: Option<String>,
}

impl BuildOptions {
    pub fn new(document_size: (u32, u32)) -> Self {
        BuildOptions {
            group: None,
            document_pivot: Alignment::TopLeft,
            document_size,
            sorting_layer: None,
            root_name: None,
        }
    }
}

// Scale applied to source pixels for a layer.
fn unit_scale(settings: &ExportSettings, index: usize, units: Units) -> f32 {
    let factor = settings.scale_for(index).factor();

    match units {
        Units::Sprite => factor / settings.pixels_per_unit,
        Units::Ui => factor,
    }
}

/// Offset moving `document_pivot` onto the origin. Layers sit below and to
/// the right of the origin when the document is pinned at its top left.
fn document_offset(settings: &ExportSettings, options: &BuildOptions, units: Units) -> Vec2 {
    let Some((px, py)) = options.document_pivot.vector() else {
        return Vec2::ZERO;
    };

    let mut scale = settings.scale.factor();
    if units == Units::Sprite {
        scale /= settings.pixels_per_unit;
    }

    let (width, height) = options.document_size;
    Vec2::new(-(width as f32) * px, height as f32 * (1.0 - py)) * scale
}

fn leaf(
    tree: &LayerTree,
    settings: &ExportSettings,
    options: &BuildOptions,
    units: Units,
    index: usize,
    offset: Vec2,
    sorting_order: i32,
) -> Option<PlanNode> {
    let record = tree.record(index)?;
    let rect = record.rect;
    if rect.is_empty() {
        return None;
    }

    let scale = unit_scale(settings, index, units);
    let pivot = settings.pivot_for(index);
    let (x, y) = (rect.x as f32, rect.y as f32);
    let (width, height) = (rect.width as f32, rect.height as f32);

    // Source y grows down, target y grows up
    let position = Vec2::new(x + width * pivot.0, -(y + height * (1.0 - pivot.1))) * scale + offset;
    let bounds = Bounds {
        min: Vec2::new(x, -(y + height)) * scale + offset,
        max: Vec2::new(x + width, -y) * scale + offset,
    };

    Some(PlanNode {
        name: record.name.clone(),
        local: position,
        absolute: position,
        bounds: Some(bounds),
        visual: Some(Visual {
            layer: index,
            sprite: settings.layer_path(&record.name),
            size: Vec2::new(width, height) * scale,
            pivot,
            sorting_order,
            sorting_layer: options.sorting_layer.clone(),
        }),
        children: vec![],
    })
}

/// First pass: containers for visible groups and absolutely placed leaves.
fn place_leaves(
    tree: &LayerTree,
    settings: &ExportSettings,
    options: &BuildOptions,
    units: Units,
    rows: &[Row],
    root: PlanNode,
) -> Result<PlanNode> {
    let exported = export::export_set(tree, settings);
    let offset = document_offset(settings, options, units);
    let mut sorting_order = i32::try_from(tree.len()).unwrap_or(i32::MAX);

    let group_open =
        |row: &Row, id: usize| !row.disabled && tree.group(id).is_some_and(|group| group.visible);

    let mut stack = vec![root];

    for row in rows {
        let index = row.index;

        match row.kind {
            RowKind::GroupStart(id) => {
                if let Some(group) = tree.group(id).filter(|_| group_open(row, id)) {
                    stack.push(PlanNode::container(&group.name));
                }
            }
            RowKind::GroupEnd(id) => {
                if group_open(row, id) {
                    let node = stack.pop().ok_or(ImportError::NoContainer { index })?;
                    stack
                        .last_mut()
                        .ok_or(ImportError::NoContainer { index })?
                        .children
                        .push(node);
                }
            }
            RowKind::Layer => {
                if row.disabled || !tree.is_layer_visible(index) || !exported.contains(&index) {
                    continue;
                }

                let Some(node) = leaf(tree, settings, options, units, index, offset, sorting_order)
                else {
                    debug!("layer {index} has an empty rect, no sprite");
                    continue;
                };
                sorting_order -= 1;

                stack
                    .last_mut()
                    .ok_or(ImportError::NoContainer { index })?
                    .children
                    .push(node);
            }
        }
    }

    if stack.len() != 1 {
        let index = rows.last().map_or(0, |row| row.index);
        return Err(ImportError::NoContainer { index });
    }

    stack.pop().ok_or(ImportError::NoContainer { index: 0 })
}

// Union of all leaf bounds under `node`, cached on group nodes.
fn collect_bounds(node: &mut PlanNode) -> Option<Bounds> {
    if node.visual.is_some() {
        return node.bounds;
    }

    let mut bounds: Option<Bounds> = None;
    for child in &mut node.children {
        if let Some(child_bounds) = collect_bounds(child) {
            bounds = Some(match bounds {
                Some(bounds) => bounds.union(child_bounds),
                None => child_bounds,
            });
        }
    }

    node.bounds = bounds;
    bounds
}

// Second pass: anchor groups on their bounds, make positions parent relative.
fn anchor(node: &mut PlanNode, parent_anchor: Vec2, pivot: (f32, f32)) {
    if node.visual.is_none() {
        node.absolute = node
            .bounds
            .map_or(parent_anchor, |bounds| bounds.lerp(pivot));
    }
    node.local = node.absolute - parent_anchor;

    let own = node.absolute;
    for child in &mut node.children {
        anchor(child, own, pivot);
    }
}

/// Computes the node tree for `tree` without touching any host.
pub fn plan(
    tree: &LayerTree,
    settings: &ExportSettings,
    options: &BuildOptions,
    units: Units,
) -> Result<PlanNode> {
    let root_name = options
        .root_name
        .clone()
        .unwrap_or_else(|| settings.filename.clone());
    let root = PlanNode::container(&root_name);

    let rows = match options.group {
        Some(id) => {
            let group = tree.group(id).ok_or(ImportError::UnknownGroupId(id))?;
            mask::walk(tree, group.start, group.end)
        }
        None => mask::walk_document(tree),
    };

    let mut root = place_leaves(tree, settings, options, units, &rows, root)?;

    let pivot = settings.pivot_vector;
    for child in &mut root.children {
        collect_bounds(child);
        anchor(child, Vec2::ZERO, pivot);
    }
    root.bounds = root
        .children
        .iter()
        .filter_map(|child| child.bounds)
        .reduce(Bounds::union);

    debug!("planned {} sprites under '{}'", root.leaf_count(), root.name);

    Ok(root)
}

/// Creates one host node per plan node, returning the root.
pub fn materialize<B: SceneBackend>(
    plan: &PlanNode,
    backend: &mut B,
    parent: Option<&B::Node>,
) -> B::Node {
    let node = backend.create_node(parent, &plan.name, plan.local);
    if let Some(visual) = &plan.visual {
        backend.attach_visual(&node, visual);
    }

    for child in &plan.children {
        materialize(child, backend, Some(&node));
    }

    node
}

pub fn build<B: SceneBackend>(
    tree: &LayerTree,
    settings: &ExportSettings,
    options: &BuildOptions,
    backend: &mut B,
    parent: Option<&B::Node>,
) -> Result<B::Node> {
    let plan = plan(tree, settings, options, backend.units())?;

    Ok(materialize(&plan, backend, parent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::MemoryLabels;
    use crate::layer::{LayerRecord, Rect, StreamBuilder};

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5
    }

    fn load(records: Vec<LayerRecord>) -> (LayerTree, ExportSettings) {
        let tree = LayerTree::build(records).unwrap();
        let mut settings = ExportSettings::new("doc.psd");
        settings.load_layers(&tree, &MemoryLabels::default()).unwrap();
        export::refresh(&tree, &mut settings);

        (tree, settings)
    }

    #[test]
    fn leaf_position_follows_pivot_and_units() {
        let records = StreamBuilder::new()
            .layer("Sign", true, Rect::new(10, 20, 100, 50))
            .build();
        let (tree, mut settings) = load(records);
        settings.set_pivot(Alignment::TopLeft);

        let root = plan(&tree, &settings, &BuildOptions::new((200, 200)), Units::Sprite).unwrap();

        let sign = root.find("Sign").unwrap();
        assert!(close(sign.local, Vec2::new(0.1, -0.2)), "{:?}", sign.local);
        let visual = sign.visual.as_ref().unwrap();
        assert!(close(visual.size, Vec2::new(1.0, 0.5)));
        assert_eq!(visual.sprite, PathBuf::from("doc_Sign.png"));
    }

    #[test]
    fn ui_units_skip_pixels_per_unit_and_apply_scale() {
        let records = StreamBuilder::new()
            .layer("Panel", true, Rect::new(10, 20, 100, 50))
            .build();
        let (tree, mut settings) = load(records);
        settings.set_pivot(Alignment::Center);
        settings.layer_mut(0).unwrap().scale = crate::settings::ScaleDown::Half;

        let root = plan(&tree, &settings, &BuildOptions::new((200, 200)), Units::Ui).unwrap();

        let panel = root.find("Panel").unwrap();
        assert!(close(panel.local, Vec2::new(30.0, -22.5)), "{:?}", panel.local);
    }

    #[test]
    fn bounds_anchor_at_pivot() {
        let a = Bounds {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(10.0, 10.0),
        };
        let b = Bounds {
            min: Vec2::new(10.0, 10.0),
            max: Vec2::new(20.0, 20.0),
        };

        assert!(close(a.union(b).lerp((0.5, 0.5)), Vec2::new(10.0, 10.0)));
        assert!(close(a.union(b).lerp((0.0, 1.0)), Vec2::new(0.0, 20.0)));
    }

    #[test]
    fn group_anchor_is_centre_of_children() {
        // In UI units a rect at (x, y) spans y from -(y + h) to -y
        let records = StreamBuilder::new()
            .open_group("Pair", true, true)
            .layer("Low", true, Rect::new(0, -10, 10, 10))
            .layer("High", true, Rect::new(10, -20, 10, 10))
            .close_group()
            .build();
        let (tree, settings) = load(records);

        let root = plan(&tree, &settings, &BuildOptions::new((20, 20)), Units::Ui).unwrap();

        let pair = root.find("Pair").unwrap();
        assert!(close(pair.absolute, Vec2::new(10.0, 10.0)), "{:?}", pair.absolute);
        assert!(close(pair.local, Vec2::new(10.0, 10.0)));

        let low = pair.find("Low").unwrap();
        assert!(close(low.absolute, Vec2::new(5.0, 5.0)));
        assert!(close(low.local, Vec2::new(-5.0, -5.0)));
        let high = pair.find("High").unwrap();
        assert!(close(high.local, Vec2::new(5.0, 5.0)));
    }

    #[test]
    fn hidden_groups_and_layers_are_left_out() {
        let records = StreamBuilder::new()
            .open_group("Shown", true, true)
            .layer("A", true, Rect::new(0, 0, 4, 4))
            .layer("Off", false, Rect::new(0, 0, 4, 4))
            .open_group("Hidden", false, true)
            .layer("B", true, Rect::new(0, 0, 4, 4))
            .close_group()
            .close_group()
            .layer("C", true, Rect::new(0, 0, 4, 4))
            .build();
        let (tree, settings) = load(records);

        let root = plan(&tree, &settings, &BuildOptions::new((4, 4)), Units::Sprite).unwrap();

        let names: Vec<&str> = root.children.iter().map(|child| child.name.as_str()).collect();
        assert_eq!(names, ["Shown", "C"]);
        let shown = root.find("Shown").unwrap();
        assert_eq!(shown.children.len(), 1);
        assert_eq!(shown.children[0].name, "A");
        assert!(root.find("Hidden").is_none());
        assert!(root.find("Off").is_none());
    }

    #[test]
    fn collapsed_group_keeps_its_container_but_no_sprites() {
        let records = StreamBuilder::new()
            .open_group("Folded", true, false)
            .layer("A", true, Rect::new(0, 0, 4, 4))
            .close_group()
            .layer("C", true, Rect::new(0, 0, 4, 4))
            .build();
        let (tree, settings) = load(records);

        let root = plan(&tree, &settings, &BuildOptions::new((4, 4)), Units::Sprite).unwrap();

        let folded = root.find("Folded").unwrap();
        assert!(folded.children.is_empty());
        assert!(root.find("A").is_none());
        assert_eq!(root.leaf_count(), 1);
    }

    #[test]
    fn unbalanced_rows_are_fatal() {
        let records = StreamBuilder::new()
            .open_group("Menu", true, true)
            .layer("Button", true, Rect::new(0, 0, 2, 2))
            .close_group()
            .build();
        let (tree, settings) = load(records);
        // Header without its divider row
        let rows: Vec<Row> = mask::walk_document(&tree)
            .into_iter()
            .filter(|row| !matches!(row.kind, RowKind::GroupEnd(_)))
            .collect();
        let options = BuildOptions::new((2, 2));

        let result = place_leaves(
            &tree,
            &settings,
            &options,
            Units::Sprite,
            &rows,
            PlanNode::container("doc"),
        );

        assert!(matches!(result, Err(ImportError::NoContainer { index: 1 })));
    }

    #[test]
    fn unknown_group_is_an_error() {
        let records = StreamBuilder::new()
            .layer("Only", true, Rect::new(0, 0, 2, 2))
            .build();
        let (tree, settings) = load(records);
        let mut options = BuildOptions::new((2, 2));
        options.group = Some(3);

        let result = plan(&tree, &settings, &options, Units::Sprite);

        assert!(matches!(result, Err(ImportError::UnknownGroupId(3))));
    }

    #[test]
    fn sorting_order_counts_down_from_top() {
        let records = StreamBuilder::new()
            .layer("Top", true, Rect::new(0, 0, 2, 2))
            .layer("Bottom", true, Rect::new(0, 0, 2, 2))
            .build();
        let (tree, settings) = load(records);

        let root = plan(&tree, &settings, &BuildOptions::new((2, 2)), Units::Sprite).unwrap();

        let order = |name: &str| root.find(name).unwrap().visual.as_ref().unwrap().sorting_order;
        assert_eq!(order("Top"), 2);
        assert_eq!(order("Bottom"), 1);
    }

    #[test]
    fn document_pivot_offsets_leaves() {
        let records = StreamBuilder::new()
            .layer("Full", true, Rect::new(0, 0, 200, 100))
            .build();
        let (tree, settings) = load(records);
        let mut options = BuildOptions::new((200, 100));
        options.document_pivot = Alignment::Center;

        let root = plan(&tree, &settings, &options, Units::Sprite).unwrap();

        // Centre pivot layer covering the document lands on the origin
        assert!(close(root.find("Full").unwrap().local, Vec2::ZERO));
    }

    #[test]
    fn selected_group_only() {
        let records = StreamBuilder::new()
            .layer("Outside", true, Rect::new(0, 0, 2, 2))
            .open_group("Menu", true, true)
            .layer("Button", true, Rect::new(0, 0, 2, 2))
            .close_group()
            .build();
        let (tree, settings) = load(records);
        let mut options = BuildOptions::new((2, 2));
        options.group = tree.find_group("Menu");

        let root = plan(&tree, &settings, &options, Units::Sprite).unwrap();

        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "Menu");
        assert!(root.find("Button").is_some());
        assert!(root.find("Outside").is_none());
    }
}
