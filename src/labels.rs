//! Import configuration persisted as asset labels.
//!
//! The label text is the storage format shared with existing projects, so
//! the spellings below must not change:
//!
//! | label | meaning |
//! |---|---|
//! | `ImportX1`, `ImportX2`, `ImportX4` | source scale |
//! | `ImportAnchor<Name>` | pivot alignment |
//! | `ImportAnchorCustom[x,y]` | custom pivot vector |
//! | `ImportPTU\|<float>` | pixels per unit |
//! | `ImportPackTag\|<tag>` | sprite packing tag |
//! | `ImportPath\|<dir>` | output directory |
//! | `ImportAutoReExport` | export again when the source changes |

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{ImportError, Result};
use crate::settings::{Alignment, ExportSettings, LayerSetting, ScaleDown};

const ANCHOR: &str = "ImportAnchor";
const CUSTOM: &str = "Custom";
const PTU: &str = "ImportPTU|";
const PACK_TAG: &str = "ImportPackTag|";
const PATH: &str = "ImportPath|";
const AUTO_REEXPORT: &str = "ImportAutoReExport";

fn scale_label(scale: ScaleDown) -> String {
    match scale {
        ScaleDown::Default => "ImportX1",
        ScaleDown::Half => "ImportX2",
        ScaleDown::Quarter => "ImportX4",
    }
    .to_string()
}

fn parse_scale(label: &str) -> Option<ScaleDown> {
    match label {
        "ImportX1" => Some(ScaleDown::Default),
        "ImportX2" => Some(ScaleDown::Half),
        "ImportX4" => Some(ScaleDown::Quarter),
        _ => None,
    }
}

/// `[x,y]` to a vector.
fn parse_custom_vector(text: &str) -> Option<(f32, f32)> {
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    let (x, y) = inner.split_once(',')?;

    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

pub fn document_labels(settings: &ExportSettings) -> Vec<String> {
    let anchor = match settings.pivot() {
        Alignment::Custom => {
            let (x, y) = settings.pivot_vector;
            format!("{ANCHOR}{CUSTOM}[{x},{y}]")
        }
        pivot => format!("{ANCHOR}{pivot}"),
    };

    let mut labels = vec![
        scale_label(settings.scale),
        anchor,
        format!("{PTU}{}", settings.pixels_per_unit),
        format!("{PACK_TAG}{}", settings.packing_tag),
    ];

    if let Some(path) = &settings.export_path {
        labels.push(format!("{PATH}{}", path.display()));
    }
    if settings.auto_reexport {
        labels.push(AUTO_REEXPORT.to_string());
    }

    labels
}

/// Overlays document labels on `settings`. Bad labels are logged and skipped.
pub fn apply_document_labels(settings: &mut ExportSettings, labels: &[String]) {
    for label in labels {
        if let Some(scale) = parse_scale(label) {
            settings.scale = scale;
        } else if let Some(anchor) = label.strip_prefix(ANCHOR) {
            match anchor.strip_prefix(CUSTOM) {
                Some("") => settings.set_pivot(Alignment::Custom),
                Some(vector) => match parse_custom_vector(vector) {
                    Some((x, y)) => settings.set_custom_pivot(x, y),
                    None => warn!("ignoring unreadable custom pivot label '{label}'"),
                },
                None => match Alignment::from_name(anchor) {
                    Some(pivot) => settings.set_pivot(pivot),
                    None => warn!("ignoring unknown pivot label '{label}'"),
                },
            }
        } else if let Some(value) = label.strip_prefix(PTU) {
            match value.parse::<f32>() {
                Ok(ppu) if ppu.is_finite() && ppu > 0.0 => settings.pixels_per_unit = ppu,
                _ => warn!("ignoring unreadable pixels per unit label '{label}'"),
            }
        } else if let Some(tag) = label.strip_prefix(PACK_TAG) {
            settings.packing_tag = tag.to_string();
        } else if let Some(path) = label.strip_prefix(PATH) {
            settings.export_path = (!path.is_empty()).then(|| PathBuf::from(path));
        } else if label == AUTO_REEXPORT {
            settings.auto_reexport = true;
        }
    }
}

pub fn layer_labels(setting: &LayerSetting) -> Vec<String> {
    vec![
        scale_label(setting.scale),
        format!("{ANCHOR}{}", setting.pivot),
    ]
}

pub fn apply_layer_labels(setting: &mut LayerSetting, labels: &[String]) {
    for label in labels {
        if let Some(scale) = parse_scale(label) {
            setting.scale = scale;
        } else if let Some(anchor) = label.strip_prefix(ANCHOR) {
            match Alignment::from_name(anchor) {
                Some(pivot) => setting.pivot = pivot,
                None => warn!("ignoring unknown layer pivot label '{label}'"),
            }
        }
    }
}

/// Where asset labels live.
pub trait LabelStore {
    /// Labels on `asset`, empty when it has none.
    fn labels(&self, asset: &Path) -> Result<Vec<String>>;

    fn set_labels(&mut self, asset: &Path, labels: &[String]) -> Result<()>;
}

/// Labels kept in a JSON file beside each asset, `<asset>.labels`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarLabels;

impl SidecarLabels {
    pub fn sidecar_path(asset: &Path) -> PathBuf {
        let mut name = asset.as_os_str().to_owned();
        name.push(".labels");

        PathBuf::from(name)
    }
}

impl LabelStore for SidecarLabels {
    fn labels(&self, asset: &Path) -> Result<Vec<String>> {
        let path = Self::sidecar_path(asset);
        if !path.exists() {
            return Ok(vec![]);
        }

        let text = fs::read_to_string(&path).map_err(|error| ImportError::io(&path, error))?;

        match serde_json::from_str(&text) {
            Ok(labels) => Ok(labels),
            Err(error) => {
                warn!("{} is unreadable, using defaults: {error}", path.display());
                Ok(vec![])
            }
        }
    }

    fn set_labels(&mut self, asset: &Path, labels: &[String]) -> Result<()> {
        let path = Self::sidecar_path(asset);
        let text = serde_json::to_string_pretty(labels).map_err(|source| ImportError::Labels {
            path: path.clone(),
            source,
        })?;

        fs::write(&path, text).map_err(|error| ImportError::io(&path, error))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryLabels(pub HashMap<PathBuf, Vec<String>>);

impl LabelStore for MemoryLabels {
    fn labels(&self, asset: &Path) -> Result<Vec<String>> {
        Ok(self.0.get(asset).cloned().unwrap_or_default())
    }

    fn set_labels(&mut self, asset: &Path, labels: &[String]) -> Result<()> {
        self.0.insert(asset.to_path_buf(), labels.to_vec());
        Ok(())
    }
}
