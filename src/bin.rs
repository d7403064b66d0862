use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use log::{debug, info};

use psd_sprites::export::{self, ExportReport};
use psd_sprites::settings::{Alignment, ScaleDown};
use psd_sprites::spatial::Units;
use psd_sprites::{ImportSession, SidecarLabels};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BuildKind {
    /// World-space sprites with sorting order
    Sprites,
    /// Canvas images measured in pixels
    Ui,
}

impl BuildKind {
    fn units(self) -> Units {
        match self {
            BuildKind::Sprites => Units::Sprite,
            BuildKind::Ui => Units::Ui,
        }
    }
}

/// Export PSD layers as sprites and lay them out like the document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PSD document to import
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print the layer tree
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Write the visible layers as PNG sprites
    #[arg(short = 'e', long = "export")]
    export: bool,

    /// Print the hierarchy a scene build would create
    #[arg(short = 'b', long = "build", value_name = "KIND")]
    build: Option<BuildKind>,

    /// Build only this group
    #[arg(short = 'g', long = "group", value_name = "NAME")]
    group: Option<String>,

    /// Hide a group before exporting (can be specified multiple times)
    #[arg(long = "hide-group", value_name = "NAME")]
    hide_groups: Vec<String>,

    /// Collapse a group before exporting (can be specified multiple times)
    #[arg(long = "collapse-group", value_name = "NAME")]
    collapse_groups: Vec<String>,

    /// Texture downscale: x1, x2 or x4
    #[arg(short = 's', long = "scale", value_name = "SCALE")]
    scale: Option<ScaleDown>,

    /// Default sprite pivot, e.g. Center or BottomLeft
    #[arg(short = 'p', long = "pivot", value_name = "NAME")]
    pivot: Option<Alignment>,

    /// Source pixels per world unit
    #[arg(long = "ppu", value_name = "F")]
    pixels_per_unit: Option<f32>,

    /// Packing tag stored on exported sprites
    #[arg(long = "tag", value_name = "TAG")]
    packing_tag: Option<String>,

    /// Output directory, next to the document by default
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    out: Option<PathBuf>,

    /// Document point placed on the root's origin
    #[arg(long = "document-pivot", value_name = "NAME", default_value = "TopLeft")]
    document_pivot: Alignment,

    /// Sorting layer for sprite builds
    #[arg(long = "sorting-layer", value_name = "NAME")]
    sorting_layer: Option<String>,

    /// Print the build as JSON instead of a tree
    #[arg(long = "json")]
    json: bool,

    /// Store the import settings as labels next to the document
    #[arg(long = "save")]
    save: bool,

    /// Re-export if the document's labels ask for it, then exit
    #[arg(long = "reimport")]
    reimport: bool,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

fn print_report(report: &ExportReport) {
    for sprite in &report.sprites {
        println!(
            "#{} {} -> {} ({}x{}, pivot {:?}, {} ppu)",
            sprite.index,
            sprite.name,
            sprite.path.display(),
            sprite.width,
            sprite.height,
            sprite.pivot,
            sprite.pixels_per_unit
        );
    }

    println!(
        "{} sprites exported, {} empty layers skipped",
        report.sprites.len(),
        report.skipped.len()
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
    debug!("Command-line args: {:?}", args);

    let mut store = SidecarLabels;

    if args.reimport {
        match export::reimport(&args.file, &mut store)
            .with_context(|| format!("re-importing {}", args.file.display()))?
        {
            Some(report) => print_report(&report),
            None => println!("{} is not set to re-export", args.file.display()),
        }

        return Ok(());
    }

    let mut session = ImportSession::open(&args.file, &store)
        .with_context(|| format!("loading {}", args.file.display()))?;

    if let Some(scale) = args.scale {
        session.settings.scale = scale;
    }
    if let Some(pivot) = args.pivot {
        session.settings.set_pivot(pivot);
    }
    if let Some(pixels_per_unit) = args.pixels_per_unit {
        if pixels_per_unit <= 0.0 {
            bail!("pixels per unit must be positive, got {pixels_per_unit}");
        }
        session.settings.pixels_per_unit = pixels_per_unit;
    }
    if let Some(tag) = args.packing_tag {
        session.settings.packing_tag = tag;
    }
    if let Some(out) = args.out {
        session.settings.export_path = Some(out);
    }

    for name in &args.hide_groups {
        session
            .set_group_visible(name, false)
            .with_context(|| format!("hiding group '{name}'"))?;
    }
    for name in &args.collapse_groups {
        session
            .set_group_opened(name, false)
            .with_context(|| format!("collapsing group '{name}'"))?;
    }

    if args.list {
        println!("{}", session.list().join("\n"));
    }

    if args.export {
        let report = session.export(&mut store).context("exporting sprites")?;
        print_report(&report);
    } else if args.save {
        session
            .settings
            .save_metadata(&mut store)
            .context("saving import settings")?;
        info!("saved import settings for {}", args.file.display());
    }

    if let Some(kind) = args.build {
        let mut options = session.build_options();
        options.document_pivot = args.document_pivot;
        options.sorting_layer = args.sorting_layer;
        if let Some(name) = &args.group {
            options.group = Some(session.group_id(name)?);
        }

        let plan = session
            .plan(&options, kind.units())
            .context("planning the scene")?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!("{}", plan.list().join("\n"));
        }
        info!("{} sprites placed", plan.leaf_count());
    }

    Ok(())
}
