use serde::{Deserialize, Deserializer, Serialize};

/// Top-level COCO annotation file.
///
/// Only the sections the inspector reads are modelled; `info` and `licenses`
/// are ignored on load.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// `[x, y, w, h]` in pixels.
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default, deserialize_with = "deserialize_iscrowd")]
    pub iscrowd: bool,
    /// Dataset-specific sub-type, absent from plain COCO files.
    #[serde(default)]
    pub type_id: Option<u64>,
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// Polygon format: list of contours, each a flat `[x, y, x, y, ...]` list.
    Polygon(Vec<Vec<f64>>),
    /// Compressed RLE (`counts` in the pycocotools string format).
    CompressedRle { size: [u32; 2], counts: String },
    /// Uncompressed RLE (`counts` as plain run lengths).
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}

/// Run-length encoding of a binary mask.
///
/// Runs alternate background/foreground starting with background and walk the
/// pixels in column-major order. A well-formed RLE sums to `h * w`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    pub counts: Vec<u32>,
}

impl Rle {
    /// An all-background RLE.
    ///
    /// Images with more than `u32::MAX` pixels get several background runs
    /// joined by zero-length foreground runs.
    pub fn empty(h: u32, w: u32) -> Self {
        let mut left = h as u64 * w as u64;
        let mut counts = Vec::with_capacity(1);
        loop {
            let run = left.min(u32::MAX as u64);
            counts.push(run as u32);
            left -= run;
            if left == 0 {
                break;
            }
            counts.push(0);
        }
        Rle { h, w, counts }
    }

    /// Total number of pixels covered by the runs.
    pub fn run_sum(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}
