use image::Rgba;

use psd_sprites::export;
use psd_sprites::mask;
use psd_sprites::spatial;
use psd_sprites::{
    BuildOptions, ExportSettings, LayerTree, MemoryLabels, PixelSource, PsdDocument, Rect,
    SectionKind, Units,
};

// 8x4 RGB document, top of the panel first:
//   UI/            Button (1,1 2x2 red)
//     Icons/       Star (4,1 2x1 blue)
//     Ghost        hidden, 6,2 2x2 green
//   Empty          no pixels
//   Background     white, full canvas
const FIXTURE: &[u8] = include_bytes!("fixtures/layered-groups-8x4.psd");

fn document() -> PsdDocument {
    PsdDocument::from_bytes(FIXTURE).unwrap()
}

#[test]
fn records_come_out_bottom_first() {
    let document = document();
    assert_eq!((document.width(), document.height()), (8, 4));

    let names: Vec<_> = document
        .records()
        .iter()
        .map(|record| (record.index, record.name.as_str(), record.section))
        .collect();

    assert_eq!(
        names,
        [
            (0, "Background", None),
            (1, "Empty", None),
            (2, "</Layer group>", Some(SectionKind::Divider)),
            (3, "Ghost", None),
            (4, "</Layer group>", Some(SectionKind::Divider)),
            (5, "Star", None),
            (6, "Icons", Some(SectionKind::OpenFolder)),
            (7, "Button", None),
            (8, "UI", Some(SectionKind::OpenFolder)),
        ]
    );
}

#[test]
fn hidden_bit_and_rects_are_read_as_stored() {
    let document = document();
    let records = document.records();

    let visible: Vec<_> = records.iter().map(|record| record.visible).collect();
    assert_eq!(
        visible,
        [true, true, true, false, true, true, true, true, true]
    );

    assert_eq!(records[0].rect, Rect::new(0, 0, 8, 4));
    assert_eq!(records[3].rect, Rect::new(6, 2, 2, 2));
    assert_eq!(records[5].rect, Rect::new(4, 1, 2, 1));
    assert_eq!(records[7].rect, Rect::new(1, 1, 2, 2));
}

#[test]
fn transparent_layer_has_no_bounds() {
    let document = document();

    assert_eq!(document.records()[1].rect, Rect::default());
    assert!(document.layer_rgba(1).is_none());
}

#[test]
fn layer_pixels_are_cropped_to_the_layer() {
    let document = document();

    let button = document.layer_rgba(7).unwrap();
    assert_eq!(button.dimensions(), (2, 2));
    assert!(button.pixels().all(|pixel| *pixel == Rgba([255, 0, 0, 255])));

    let star = document.layer_rgba(5).unwrap();
    assert_eq!(star.dimensions(), (2, 1));
    assert!(star.pixels().all(|pixel| *pixel == Rgba([0, 0, 255, 255])));
}

#[test]
fn group_ranges_nest() {
    let tree = LayerTree::build(document().into_records()).unwrap();

    let icons = tree.group(tree.find_group("Icons").unwrap()).unwrap();
    assert_eq!((icons.start, icons.end), (4, 6));

    let ui = tree.group(tree.find_group("UI").unwrap()).unwrap();
    assert_eq!((ui.start, ui.end), (2, 8));

    assert_eq!(tree.group_by_layer_index(5).unwrap().name, "Icons");
    assert_eq!(tree.group_by_layer_index(3).unwrap().name, "UI");
    assert!(tree.group_by_layer_index(1).is_none());
}

#[test]
fn listing_matches_the_layer_panel() {
    let tree = LayerTree::build(document().into_records()).unwrap();

    assert_eq!(
        mask::list(&tree),
        [
            "[G-] UI",
            "\t[L] #7 Button",
            "\t[G-] Icons",
            "\t\t[L] #5 Star",
            "\t[L] #3 Ghost (hidden)",
            "[L] #1 Empty",
            "[L] #0 Background",
        ]
    );
}

#[test]
fn export_skips_hidden_and_empty_layers() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("ui.psd");
    let document = document();
    let tree = LayerTree::build(document.records().to_vec()).unwrap();
    let mut store = MemoryLabels::default();
    let mut settings = ExportSettings::load(&source, &store).unwrap();
    settings.load_layers(&tree, &store).unwrap();

    let report = export::export(&document, &tree, &mut settings, &mut store).unwrap();

    let exported: Vec<_> = report.sprites.iter().map(|sprite| sprite.index).collect();
    assert_eq!(exported, [0, 5, 7]);
    assert_eq!(report.skipped, [1]);
    assert!(!settings.layer(3).unwrap().do_export);

    let button = report.sprite(7).unwrap();
    assert_eq!((button.width, button.height), (2, 2));
    assert!(button.path.exists());
    assert!(!dir.path().join("ui_Ghost.png").exists());

    let plan = spatial::plan(&tree, &settings, &BuildOptions::new((8, 4)), Units::Sprite).unwrap();
    let order = |name: &str| plan.find(name).unwrap().visual.as_ref().unwrap().sorting_order;
    assert!(order("Button") > order("Star"));
    assert!(order("Star") > order("Background"));
    assert!(plan.find("Ghost").is_none());
}
