//! Picks the layers to export and writes them out as PNG sprites.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use log::{debug, info};
use serde::Serialize;

use crate::error::Result;
use crate::labels::LabelStore;
use crate::mask::{self, RowKind};
use crate::psd::{self, PixelSource, PsdDocument};
use crate::settings::{ExportSettings, LayerSetting, ScaleDown};
use crate::tree::LayerTree;

/// Recomputes `do_export` for every plain layer from the current tree state.
///
/// Layers without a settings entry get one with `do_export` off, which is
/// then set from the row below. Layers hidden by a collapsed group keep
/// their entry for later overrides but are not exported while collapsed.
/// Stored layer visibility is left alone.
pub fn refresh(tree: &LayerTree, settings: &mut ExportSettings) {
    let default_pivot = settings.pivot();

    for row in mask::walk_document(tree) {
        if row.kind != RowKind::Layer {
            continue;
        }

        let setting = settings
            .layers
            .entry(row.index)
            .or_insert_with(|| {
                debug!("layer {} had no settings, adding defaults", row.index);
                LayerSetting::new(row.index, false, default_pivot)
            });

        setting.do_export = tree.is_layer_visible(row.index) && !row.disabled && !row.skipped;
    }
}

/// Layers flagged for export whose nearest group is visible right now.
pub fn export_set(tree: &LayerTree, settings: &ExportSettings) -> BTreeSet<usize> {
    settings
        .layers
        .values()
        .filter(|setting| setting.do_export)
        .filter(|setting| {
            tree.group_by_layer_index(setting.index)
                .map_or(true, |group| group.visible)
        })
        .map(|setting| setting.index)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedSprite {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pivot: (f32, f32),
    pub pixels_per_unit: f32,
    pub packing_tag: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportReport {
    pub sprites: Vec<ExportedSprite>,
    /// Exported layers without pixels.
    pub skipped: Vec<usize>,
}

impl ExportReport {
    pub fn sprite(&self, index: usize) -> Option<&ExportedSprite> {
        self.sprites.iter().find(|sprite| sprite.index == index)
    }
}

/// Sprite pixels per unit. A layer that overrides the scale keeps its world
/// size by lowering its own pixels per unit.
fn sprite_pixels_per_unit(settings: &ExportSettings, setting: &LayerSetting) -> f32 {
    match setting.scale {
        ScaleDown::Default => settings.pixels_per_unit,
        scale => (settings.pixels_per_unit * scale.factor()).round(),
    }
}

fn downscale(image: image::RgbaImage, scale: ScaleDown) -> image::RgbaImage {
    if scale == ScaleDown::Default {
        return image;
    }

    let width = ((image.width() as f32 * scale.factor()).round() as u32).max(1);
    let height = ((image.height() as f32 * scale.factor()).round() as u32).max(1);

    imageops::resize(&image, width, height, FilterType::Triangle)
}

/// Writes every exported layer of `pixels` and saves the labels.
pub fn export(
    pixels: &dyn PixelSource,
    tree: &LayerTree,
    settings: &mut ExportSettings,
    store: &mut dyn LabelStore,
) -> Result<ExportReport> {
    refresh(tree, settings);

    let mut report = ExportReport::default();

    for index in export_set(tree, settings) {
        let (Some(record), Some(setting)) = (tree.record(index), settings.layer(index)) else {
            continue;
        };

        let Some(image) = pixels.layer_rgba(index).filter(|_| !record.rect.is_empty()) else {
            debug!("layer {index} '{}' has no pixels, skipping", record.name);
            report.skipped.push(index);
            continue;
        };

        let image = downscale(image, settings.scale_for(index));
        let path = settings.layer_path(&record.name);

        psd::write_to_png(&path, image.dimensions(), image.as_raw())?;
        info!("exported {}", path.display());

        report.sprites.push(ExportedSprite {
            index,
            name: record.name.clone(),
            path,
            width: image.width(),
            height: image.height(),
            pivot: settings.pivot_for(index),
            pixels_per_unit: sprite_pixels_per_unit(settings, setting),
            packing_tag: settings.packing_tag.clone(),
        });
    }

    settings.save_metadata(store)?;
    settings.save_layer_metadata(tree, store)?;

    Ok(report)
}

/// Re-runs the export of a changed source when its labels ask for it.
pub fn reimport(source: &Path, store: &mut dyn LabelStore) -> Result<Option<ExportReport>> {
    let mut settings = ExportSettings::load(source, store)?;
    if !settings.auto_reexport {
        debug!("{} does not re-export automatically", source.display());
        return Ok(None);
    }

    let document = PsdDocument::open(source)?;
    let tree = LayerTree::build(document.records().to_vec())?;
    settings.load_layers(&tree, store)?;

    export(&document, &tree, &mut settings, store).map(Some)
}
