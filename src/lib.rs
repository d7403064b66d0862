//! Turns layered PSD documents into sprites and scene hierarchies.
//!
//! The layer list is read in storage order, folded into a group tree, and
//! walked with the visibility rules of the editor's layer panel. Visible
//! layers are written out as PNG sprites with their import settings kept as
//! labels next to them, and can be placed into a scene that mirrors the
//! document's groups.

pub mod error;
pub mod export;
pub mod labels;
pub mod layer;
pub mod mask;
pub mod psd;
pub mod scene;
pub mod session;
pub mod settings;
pub mod spatial;
pub mod tree;

#[cfg(feature = "godot")]
mod godot;

pub use crate::error::{ImportError, Result};
pub use crate::export::{ExportReport, ExportedSprite};
pub use crate::labels::{LabelStore, MemoryLabels, SidecarLabels};
pub use crate::layer::{LayerRecord, Rect, SectionKind};
pub use crate::psd::{PixelSource, PsdDocument};
pub use crate::session::ImportSession;
pub use crate::settings::{Alignment, ExportSettings, LayerSetting, ScaleDown};
pub use crate::spatial::{BuildOptions, PlanNode, SceneBackend, Units};
pub use crate::tree::{GroupInfo, LayerTree};
