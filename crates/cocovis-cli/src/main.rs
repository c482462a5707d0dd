use std::borrow::Cow;
use std::path::{Path, PathBuf};

use clap::Parser;
use cocovis::composite::load_font;
use cocovis::mask;
use cocovis::{
    AnnotationIndex, AnnotationQuery, ColorMode, Compositor, Error, FsImageSource, ImageSource,
    MaskInput, RenderParams, Rle, COCO,
};
use log::{debug, info, warn};
use rayon::prelude::*;

#[derive(Parser)]
#[command(name = "cocovis")]
#[command(about = "Render COCO annotations (boxes, tags and masks) onto their images")]
struct Cli {
    /// Path to the annotations JSON file
    #[arg(long)]
    file: PathBuf,

    /// Render only these image IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    imids: Option<Vec<u64>>,

    /// Keep only annotations with these type IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    types: Option<Vec<u64>>,

    /// Keep only annotations with these category IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    cats: Option<Vec<u64>>,

    /// Directory image file names are resolved against
    #[arg(long)]
    image_root: Option<PathBuf>,

    /// Output directory for rendered PNGs
    #[arg(long, default_value = "vis")]
    out: PathBuf,

    /// Render parameters JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Font used for tag text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Mask opacity, overrides the config file
    #[arg(long)]
    alpha: Option<f32>,

    /// Green boxes and gray masks instead of one color per object
    #[arg(long)]
    fixed_color: bool,

    /// Do not outline masks
    #[arg(long)]
    no_border: bool,

    /// Print the dataset summary and exit
    #[arg(long)]
    summary_only: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("Loading annotations from {:?}...", cli.file);
    let coco = COCO::new(&cli.file)?;
    let summary = coco.summary();
    info!(
        "images={} annotations={} categories={:?}",
        summary.images, summary.annotations, summary.categories
    );
    if cli.summary_only {
        return Ok(());
    }

    let mut params = match &cli.config {
        Some(path) => RenderParams::from_file(path)?,
        None => RenderParams::default(),
    };
    if let Some(alpha) = cli.alpha {
        params.alpha = alpha.clamp(0.0, 1.0);
    }
    if cli.fixed_color {
        params.colors = ColorMode::fixed_default();
    }
    if cli.no_border {
        params.show_border = false;
    }

    let mut compositor = Compositor::new(params);
    if let Some(path) = &cli.font {
        compositor = compositor.with_font(load_font(path)?);
    }

    let requested = cli.imids.unwrap_or_default();
    let cat_ids = cli.cats.unwrap_or_default();
    let img_ids = coco.get_img_ids(&requested, &cat_ids);
    for id in &requested {
        if coco.lookup_image(*id).is_none() {
            warn!("image {id} is not in the dataset");
        }
    }

    let query = AnnotationQuery::new()
        .cat_ids(&cat_ids)
        .type_ids(&cli.types.unwrap_or_default());
    let source = FsImageSource::new(cli.image_root);
    std::fs::create_dir_all(&cli.out)?;

    info!("Rendering {} image(s)...", img_ids.len());
    let written = img_ids
        .par_iter()
        .map(|&id| render_image(&coco, &source, &compositor, &query, id, &cli.out))
        .collect::<cocovis::Result<Vec<_>>>()?;
    let count = written.iter().flatten().count();
    info!("Wrote {} image(s) to {:?}", count, cli.out);

    Ok(())
}

/// Render one image's annotations to `{out}/{img_id}.png`.
///
/// Returns `None` when the image has no matching annotations.
fn render_image(
    index: &COCO,
    source: &impl ImageSource,
    compositor: &Compositor,
    query: &AnnotationQuery,
    img_id: u64,
    out: &Path,
) -> cocovis::Result<Option<PathBuf>> {
    let Some(img) = index.lookup_image(img_id) else {
        return Ok(None);
    };
    let query = AnnotationQuery {
        img_ids: vec![img_id],
        ..query.clone()
    };
    let anns = index.query_annotations(&query);
    if anns.is_empty() {
        debug!("image {img_id}: no matching annotations");
        return Ok(None);
    }

    // polygons and empty masks take their size from the pixels, not the
    // record, which may leave height and width out
    let pixels = source.load_image(&img.file_name)?;
    let (width, height) = pixels.dimensions();

    let mut masks: Vec<MaskInput<'_>> = Vec::with_capacity(anns.len());
    let mut boxes = Vec::with_capacity(anns.len());
    let mut tags = Vec::with_capacity(anns.len());
    for ann in &anns {
        let input = match &ann.segmentation {
            Some(seg) => MaskInput::try_from(seg)?,
            None => MaskInput::Rle(Cow::Owned(Rle::empty(height, width))),
        };
        boxes.push(match ann.bbox {
            Some(bbox) => bbox,
            None => extent(&input, height, width),
        });
        tags.push(tag_text(ann.type_id, ann.category_id, ann.iscrowd));
        masks.push(input);
    }

    let canvas = compositor.composite(
        &pixels,
        &boxes,
        Some(masks.as_slice()),
        Some(tags.as_slice()),
    )?;
    let path = out.join(format!("{img_id}.png"));
    canvas.save(&path).map_err(|source| Error::Image {
        path: path.clone(),
        source,
    })?;
    debug!("image {img_id}: {} object(s) -> {}", anns.len(), path.display());
    Ok(Some(path))
}

/// Bounding box of a mask input rendered at `height` x `width`.
fn extent(input: &MaskInput<'_>, height: u32, width: u32) -> [f64; 4] {
    match input {
        MaskInput::Dense(m) => mask::to_bbox(&mask::encode(m)),
        MaskInput::Rle(rle) => mask::to_bbox(rle),
        MaskInput::Polygon(polys) => mask::to_bbox(&mask::from_polygons(polys, height, width)),
    }
}

fn tag_text(type_id: Option<u64>, category_id: u64, iscrowd: bool) -> String {
    let type_id = type_id.map_or_else(|| "-".to_string(), |t| t.to_string());
    format!(
        "type: {type_id}, cat: {category_id}, iscrowd: {}",
        u8::from(iscrowd)
    )
}
