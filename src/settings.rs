use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::labels::{self, LabelStore};
use crate::tree::LayerTree;

/// Downscale applied to exported textures and to placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDown {
    #[default]
    Default,
    Half,
    Quarter,
}

impl ScaleDown {
    pub fn factor(self) -> f32 {
        match self {
            ScaleDown::Default => 1.0,
            ScaleDown::Half => 0.5,
            ScaleDown::Quarter => 0.25,
        }
    }

    /// Per-layer scale wins over the document scale unless left at default.
    pub fn effective(global: ScaleDown, layer: ScaleDown) -> ScaleDown {
        match layer {
            ScaleDown::Default => global,
            layer => layer,
        }
    }
}

impl FromStr for ScaleDown {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x1" | "1" | "default" => Ok(ScaleDown::Default),
            "x2" | "2" | "half" => Ok(ScaleDown::Half),
            "x4" | "4" | "quarter" => Ok(ScaleDown::Quarter),
            other => Err(format!("unknown scale '{other}', expected x1, x2 or x4")),
        }
    }
}

/// Sprite pivot, the nine fixed points of a rect plus a custom vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Center,
    TopLeft,
    TopCenter,
    TopRight,
    LeftCenter,
    RightCenter,
    BottomLeft,
    BottomCenter,
    BottomRight,
    Custom,
}

impl Alignment {
    pub const ALL: [Alignment; 10] = [
        Alignment::Center,
        Alignment::TopLeft,
        Alignment::TopCenter,
        Alignment::TopRight,
        Alignment::LeftCenter,
        Alignment::RightCenter,
        Alignment::BottomLeft,
        Alignment::BottomCenter,
        Alignment::BottomRight,
        Alignment::Custom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Alignment::Center => "Center",
            Alignment::TopLeft => "TopLeft",
            Alignment::TopCenter => "TopCenter",
            Alignment::TopRight => "TopRight",
            Alignment::LeftCenter => "LeftCenter",
            Alignment::RightCenter => "RightCenter",
            Alignment::BottomLeft => "BottomLeft",
            Alignment::BottomCenter => "BottomCenter",
            Alignment::BottomRight => "BottomRight",
            Alignment::Custom => "Custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Alignment> {
        Self::ALL.into_iter().find(|alignment| alignment.name() == name)
    }

    /// Normalized pivot, y = 1 at the top. `None` for [`Alignment::Custom`].
    pub fn vector(self) -> Option<(f32, f32)> {
        let x = match self {
            Alignment::TopLeft | Alignment::LeftCenter | Alignment::BottomLeft => 0.0,
            Alignment::TopRight | Alignment::RightCenter | Alignment::BottomRight => 1.0,
            Alignment::Custom => return None,
            _ => 0.5,
        };
        let y = match self {
            Alignment::TopLeft | Alignment::TopCenter | Alignment::TopRight => 1.0,
            Alignment::BottomLeft | Alignment::BottomCenter | Alignment::BottomRight => 0.0,
            _ => 0.5,
        };

        Some((x, y))
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Alignment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alignment| alignment.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown pivot '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSetting {
    pub index: usize,
    pub do_export: bool,
    pub scale: ScaleDown,
    pub pivot: Alignment,
}

impl LayerSetting {
    pub fn new(index: usize, do_export: bool, pivot: Alignment) -> Self {
        LayerSetting {
            index,
            do_export,
            scale: ScaleDown::Default,
            pivot,
        }
    }
}

/// Import configuration for one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    pub source: PathBuf,
    pub filename: String,
    pub layers: BTreeMap<usize, LayerSetting>,
    pub scale: ScaleDown,
    pivot: Alignment,
    pub pivot_vector: (f32, f32),
    pub pixels_per_unit: f32,
    pub packing_tag: String,
    /// Output directory, next to the source when unset.
    pub export_path: Option<PathBuf>,
    pub auto_reexport: bool,
    /// Labels were found on the source.
    pub has_metadata: bool,
}

impl ExportSettings {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let filename = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        ExportSettings {
            source,
            filename,
            layers: BTreeMap::new(),
            scale: ScaleDown::Default,
            pivot: Alignment::Center,
            pivot_vector: (0.5, 0.5),
            pixels_per_unit: 100.0,
            packing_tag: String::new(),
            export_path: None,
            auto_reexport: false,
            has_metadata: false,
        }
    }

    /// Defaults overlaid with whatever labels the source carries.
    pub fn load(source: impl Into<PathBuf>, store: &dyn LabelStore) -> Result<Self> {
        let mut settings = Self::new(source);
        let labels = store.labels(&settings.source)?;
        settings.has_metadata = !labels.is_empty();
        labels::apply_document_labels(&mut settings, &labels);

        debug!(
            "loaded settings for {}: {:?}, pivot {}, {} ppu",
            settings.source.display(),
            settings.scale,
            settings.pivot,
            settings.pixels_per_unit
        );

        Ok(settings)
    }

    pub fn pivot(&self) -> Alignment {
        self.pivot
    }

    /// Changes the default pivot, carrying along layers that used the old one.
    pub fn set_pivot(&mut self, pivot: Alignment) {
        let previous = self.pivot;
        if previous != pivot {
            for setting in self.layers.values_mut() {
                if setting.pivot == previous {
                    setting.pivot = pivot;
                }
            }
        }

        self.pivot = pivot;
        if let Some(vector) = pivot.vector() {
            self.pivot_vector = vector;
        }
    }

    /// Sets a custom pivot vector and switches the default pivot to it.
    pub fn set_custom_pivot(&mut self, x: f32, y: f32) {
        self.set_pivot(Alignment::Custom);
        self.pivot_vector = (x, y);
    }

    /// Resets the layer map from the tree, restoring saved sprite labels.
    pub fn load_layers(&mut self, tree: &LayerTree, store: &dyn LabelStore) -> Result<()> {
        self.layers = BTreeMap::new();

        for &index in tree.layer_indices() {
            let Some(record) = tree.record(index) else {
                continue;
            };
            let mut setting = LayerSetting::new(index, tree.is_layer_visible(index), self.pivot);

            let sprite_labels = store.labels(&self.layer_path(&record.name))?;
            labels::apply_layer_labels(&mut setting, &sprite_labels);

            self.layers.insert(index, setting);
        }

        info!(
            "{}: {} layers, {} groups",
            self.filename,
            self.layers.len(),
            tree.groups().len()
        );

        Ok(())
    }

    pub fn layer(&self, index: usize) -> Option<&LayerSetting> {
        self.layers.get(&index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut LayerSetting> {
        self.layers.get_mut(&index)
    }

    /// Pivot vector a layer is placed and imported with.
    pub fn pivot_for(&self, index: usize) -> (f32, f32) {
        let alignment = self.layer(index).map_or(self.pivot, |setting| setting.pivot);

        alignment.vector().unwrap_or(self.pivot_vector)
    }

    pub fn scale_for(&self, index: usize) -> ScaleDown {
        let layer = self.layer(index).map_or(ScaleDown::Default, |setting| setting.scale);

        ScaleDown::effective(self.scale, layer)
    }

    pub fn output_dir(&self) -> PathBuf {
        match &self.export_path {
            Some(path) => path.clone(),
            None => self
                .source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    /// `<dir>/<stem>_<layer>.png`
    pub fn layer_path(&self, layer_name: &str) -> PathBuf {
        let name = layer_name
            .trim_matches(char::from(0))
            .replace(['/', '\\'], "_");

        self.output_dir().join(format!("{}_{}.png", self.filename, name))
    }

    pub fn save_metadata(&self, store: &mut dyn LabelStore) -> Result<()> {
        store.set_labels(&self.source, &labels::document_labels(self))
    }

    /// Labels each exported sprite that exists on disk.
    pub fn save_layer_metadata(&self, tree: &LayerTree, store: &mut dyn LabelStore) -> Result<()> {
        for setting in self.layers.values() {
            if !setting.do_export {
                continue;
            }
            let Some(record) = tree.record(setting.index) else {
                continue;
            };

            let path = self.layer_path(&record.name);
            if !path.exists() {
                continue;
            }

            store.set_labels(&path, &labels::layer_labels(setting))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::MemoryLabels;
    use crate::layer::{Rect, StreamBuilder};

    #[test]
    fn fixed_alignments_map_to_unit_square() {
        assert_eq!(Alignment::TopLeft.vector(), Some((0.0, 1.0)));
        assert_eq!(Alignment::Center.vector(), Some((0.5, 0.5)));
        assert_eq!(Alignment::BottomRight.vector(), Some((1.0, 0.0)));
        assert_eq!(Alignment::RightCenter.vector(), Some((1.0, 0.5)));
        assert_eq!(Alignment::Custom.vector(), None);
        assert_eq!("bottomcenter".parse::<Alignment>(), Ok(Alignment::BottomCenter));
    }

    #[test]
    fn layer_scale_takes_precedence() {
        assert_eq!(
            ScaleDown::effective(ScaleDown::Half, ScaleDown::Default),
            ScaleDown::Half
        );
        assert_eq!(
            ScaleDown::effective(ScaleDown::Half, ScaleDown::Quarter),
            ScaleDown::Quarter
        );
        assert_eq!("x4".parse::<ScaleDown>(), Ok(ScaleDown::Quarter));
    }

    #[test]
    fn layer_path_sits_next_to_source() {
        let mut settings = ExportSettings::new("art/ui/menu.psd");
        assert_eq!(settings.layer_path("Button"), PathBuf::from("art/ui/menu_Button.png"));

        settings.export_path = Some(PathBuf::from("out"));
        assert_eq!(settings.layer_path("a/b"), PathBuf::from("out/menu_a_b.png"));
    }

    #[test]
    fn changing_default_pivot_moves_following_layers() {
        let records = StreamBuilder::new()
            .layer("A", true, Rect::new(0, 0, 2, 2))
            .layer("B", true, Rect::new(0, 0, 2, 2))
            .build();
        let tree = LayerTree::build(records).unwrap();
        let mut settings = ExportSettings::new("doc.psd");
        settings.load_layers(&tree, &MemoryLabels::default()).unwrap();
        settings.layer_mut(0).unwrap().pivot = Alignment::TopLeft;

        settings.set_pivot(Alignment::BottomCenter);

        assert_eq!(settings.layer(0).unwrap().pivot, Alignment::TopLeft);
        assert_eq!(settings.layer(1).unwrap().pivot, Alignment::BottomCenter);
        assert_eq!(settings.pivot_vector, (0.5, 0.0));
        assert_eq!(settings.pivot_for(0), (0.0, 1.0));
    }

    #[test]
    fn custom_pivot_uses_stored_vector() {
        let mut settings = ExportSettings::new("doc.psd");
        settings.layers.insert(3, LayerSetting::new(3, true, Alignment::Center));

        settings.set_custom_pivot(0.25, 0.75);

        assert_eq!(settings.pivot(), Alignment::Custom);
        assert_eq!(settings.pivot_for(3), (0.25, 0.75));
    }
}
