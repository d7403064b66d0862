use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::RgbaImage;
use log::debug;
use psd::{ColorMode, Psd, PsdLayer};

use crate::error::{ImportError, Result};
use crate::layer::{LayerRecord, Rect};

/// Anything that can hand out a layer's pixels, cropped to its rect.
pub trait PixelSource {
    /// `None` for section markers and layers without pixels.
    fn layer_rgba(&self, index: usize) -> Option<RgbaImage>;
}

#[derive(Debug, Clone, Copy)]
enum Child {
    Layer(usize),
    Group(u32),
}

/// A decoded document and its layer list in storage order.
pub struct PsdDocument {
    psd: Psd,
    records: Vec<LayerRecord>,
    // Record index to index into `psd.layers()`, `None` for markers
    sources: Vec<Option<usize>>,
}

impl PsdDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let psd = Psd::from_bytes(bytes).map_err(|error| ImportError::Decode(error.to_string()))?;

        match psd.color_mode() {
            ColorMode::Rgb => Ok(Self::new(psd)),
            other_format => Err(ImportError::UnsupportedColorMode(format!("{other_format:?}"))),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|error| ImportError::io(path, error))?;

        Self::from_bytes(&bytes)
    }

    fn new(psd: Psd) -> Self {
        let mut document = PsdDocument {
            psd,
            records: vec![],
            sources: vec![],
        };

        document.emit(None);
        debug!("read {} layer records", document.records.len());

        document
    }

    pub fn width(&self) -> u32 {
        self.psd.width()
    }

    pub fn height(&self) -> u32 {
        self.psd.height()
    }

    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LayerRecord> {
        self.records
    }

    // The decoder keeps a group's layer range private, recover its start from
    // the sub-layer slice. For a group with layers that is its topmost layer,
    // for an empty one the layer just below it.
    fn group_start(&self, id: u32) -> Option<usize> {
        let layers = self.psd.layers();
        let sub_layers = self.psd.get_group_sub_layers(&id)?;
        let offset = (sub_layers.as_ptr() as usize).checked_sub(layers.as_ptr() as usize)?;

        Some(offset / std::mem::size_of::<PsdLayer>())
    }

    // Photoshop writes a group as a divider, its children, then the folder.
    // `layers()` runs top first, so siblings are emitted by descending position.
    fn emit(&mut self, parent: Option<u32>) {
        let mut children: Vec<(usize, Child)> = vec![];

        for &id in self.psd.group_ids_in_order() {
            let Some(group) = self.psd.groups().get(&id) else {
                continue;
            };
            if group.parent_id() == parent {
                let start = self.group_start(id).unwrap_or(0);
                children.push((2 * start, Child::Group(id)));
            }
        }

        for (position, layer) in self.psd.layers().iter().enumerate() {
            if layer.parent_id() == parent {
                // A layer sharing its position with an empty group sits below it
                children.push((2 * position + 1, Child::Layer(position)));
            }
        }

        // Bottom first
        children.sort_by_key(|(position, _)| std::cmp::Reverse(*position));

        for (_, child) in children {
            match child {
                Child::Layer(position) => {
                    let layer = &self.psd.layers()[position];
                    let rect = layer_rect(layer);
                    // The decoder reports the hidden bit as `visible`
                    let record = LayerRecord::layer(
                        self.records.len(),
                        clean_name(layer.name()),
                        !layer.visible(),
                        rect,
                    );
                    self.push(record, Some(position));
                }
                Child::Group(id) => {
                    self.push(LayerRecord::divider(self.records.len()), None);
                    self.emit(Some(id));

                    let Some(group) = self.psd.groups().get(&id) else {
                        continue;
                    };
                    // The expanded state is not exposed by the decoder
                    let record = LayerRecord::folder(
                        self.records.len(),
                        clean_name(group.name()),
                        !group.visible(),
                        true,
                    );
                    self.push(record, None);
                }
            }
        }
    }

    fn push(&mut self, record: LayerRecord, source: Option<usize>) {
        self.records.push(record);
        self.sources.push(source);
    }
}

impl PixelSource for PsdDocument {
    fn layer_rgba(&self, index: usize) -> Option<RgbaImage> {
        let record = self.records.get(index)?;
        let position = (*self.sources.get(index)?)?;
        if record.rect.is_empty() {
            return None;
        }

        let layer = &self.psd.layers()[position];
        let canvas = RgbaImage::from_raw(self.width(), self.height(), layer.rgba())?;

        // Layers may hang off the canvas, keep the part that is on it
        let left = record.rect.x.max(0) as u32;
        let top = record.rect.y.max(0) as u32;
        let right = (i64::from(record.rect.x) + i64::from(record.rect.width))
            .clamp(0, i64::from(self.width())) as u32;
        let bottom = (i64::from(record.rect.y) + i64::from(record.rect.height))
            .clamp(0, i64::from(self.height())) as u32;
        if right <= left || bottom <= top {
            return None;
        }

        let mut image =
            image::imageops::crop_imm(&canvas, left, top, right - left, bottom - top).to_image();

        let opacity = u16::from(layer.opacity());
        if opacity < 255 {
            for pixel in image.pixels_mut() {
                pixel[3] = (u16::from(pixel[3]) * opacity / 255) as u8;
            }
        }

        Some(image)
    }
}

// A fully transparent layer is stored with an all-zero rect, which the
// decoder reports as one pixel at the origin.
fn layer_rect(layer: &PsdLayer) -> Rect {
    let rect = Rect::new(
        layer.layer_left(),
        layer.layer_top(),
        u32::from(layer.width()),
        u32::from(layer.height()),
    );

    let single_origin_pixel = rect == Rect::new(0, 0, 1, 1);
    if single_origin_pixel && layer.rgba().get(3).map_or(true, |&alpha| alpha == 0) {
        return Rect::default();
    }

    rect
}

fn clean_name(name: &str) -> String {
    name.trim_matches(char::from(0)).to_string()
}

pub fn write_to_png(path: &Path, size: (u32, u32), bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .create(parent)
            .map_err(|error| ImportError::io(parent, error))?;
    }

    let file = File::create(path).map_err(|error| ImportError::io(path, error))?;

    let w = BufWriter::new(file);

    let mut encoder = png::Encoder::new(w, size.0, size.1);

    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_source_gamma(png::ScaledFloat::new(1.0 / 2.2));
    let source_chromaticities = png::SourceChromaticities::new(
        (0.31270, 0.32900),
        (0.64000, 0.33000),
        (0.30000, 0.60000),
        (0.15000, 0.06000),
    );
    encoder.set_source_chromaticities(source_chromaticities);

    let png_error = |source: png::EncodingError| ImportError::Png {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = encoder.write_header().map_err(png_error)?;
    writer.write_image_data(bytes).map_err(png_error)?;

    Ok(())
}
