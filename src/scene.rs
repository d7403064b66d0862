//! In-memory scene graphs for sprite and UI builds.

use std::path::PathBuf;

use serde::Serialize;

use crate::spatial::{SceneBackend, Units, Vec2, Visual};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Component {
    SpriteRenderer {
        sprite: PathBuf,
        sorting_order: i32,
        sorting_layer: Option<String>,
    },
    Image {
        sprite: PathBuf,
        size: Vec2,
        pivot: (f32, f32),
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub local: Vec2,
    pub component: Option<Component>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    pub fn add(&mut self, parent: Option<usize>, name: &str, local: Vec2) -> usize {
        let id = self.nodes.len();
        self.nodes.push(SceneNode {
            name: name.to_string(),
            parent,
            children: vec![],
            local,
            component: None,
        });

        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.push(id);
        }

        id
    }

    pub fn node(&self, id: usize) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Position with every ancestor's offset applied.
    pub fn world_position(&self, id: usize) -> Vec2 {
        let mut position = Vec2::ZERO;
        let mut cursor = Some(id);

        while let Some(node) = cursor.and_then(|id| self.nodes.get(id)) {
            position = position + node.local;
            cursor = node.parent;
        }

        position
    }

    fn set_component(&mut self, id: usize, component: Component) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.component = Some(component);
        }
    }
}

/// World-space sprites with sorting order.
#[derive(Debug, Default)]
pub struct SpriteScene {
    pub graph: SceneGraph,
}

impl SceneBackend for SpriteScene {
    type Node = usize;

    fn units(&self) -> Units {
        Units::Sprite
    }

    fn create_node(&mut self, parent: Option<&usize>, name: &str, local: Vec2) -> usize {
        self.graph.add(parent.copied(), name, local)
    }

    fn attach_visual(&mut self, node: &usize, visual: &Visual) {
        self.graph.set_component(
            *node,
            Component::SpriteRenderer {
                sprite: visual.sprite.clone(),
                sorting_order: visual.sorting_order,
                sorting_layer: visual.sorting_layer.clone(),
            },
        );
    }
}

/// Canvas images in pixels, drawn in hierarchy order.
#[derive(Debug, Default)]
pub struct UiScene {
    pub graph: SceneGraph,
}

impl SceneBackend for UiScene {
    type Node = usize;

    fn units(&self) -> Units {
        Units::Ui
    }

    fn create_node(&mut self, parent: Option<&usize>, name: &str, local: Vec2) -> usize {
        self.graph.add(parent.copied(), name, local)
    }

    fn attach_visual(&mut self, node: &usize, visual: &Visual) {
        self.graph.set_component(
            *node,
            Component::Image {
                sprite: visual.sprite.clone(),
                size: visual.size,
                pivot: visual.pivot,
            },
        );
    }
}
