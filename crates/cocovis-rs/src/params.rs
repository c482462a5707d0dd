use std::path::Path;

use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::color::{self, GRAY, GREEN, WHITE};
use crate::error::{Error, Result};

/// How boxes, masks and tag backgrounds are colored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ColorMode {
    /// One distinct color per object, shared by its box, mask and tag.
    #[default]
    Auto,
    /// The same colors for every object.
    Fixed {
        box_color: [u8; 3],
        mask_color: [u8; 3],
        tag_background: [u8; 3],
    },
}

impl ColorMode {
    /// Fixed green boxes and tags over gray masks.
    pub fn fixed_default() -> Self {
        ColorMode::Fixed {
            box_color: GREEN.0,
            mask_color: GRAY.0,
            tag_background: GREEN.0,
        }
    }

    /// `(box, mask, tag background)` colors for each of `count` objects.
    pub fn assign(&self, count: usize) -> Vec<ObjectColors> {
        match *self {
            ColorMode::Auto => color::distinct_colors(count)
                .into_iter()
                .map(|c| ObjectColors {
                    outline: c,
                    fill: c,
                    tag_background: c,
                })
                .collect(),
            ColorMode::Fixed {
                box_color,
                mask_color,
                tag_background,
            } => vec![
                ObjectColors {
                    outline: Rgb(box_color),
                    fill: Rgb(mask_color),
                    tag_background: Rgb(tag_background),
                };
                count
            ],
        }
    }
}

/// Colors used to draw one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectColors {
    pub outline: Rgb<u8>,
    pub fill: Rgb<u8>,
    pub tag_background: Rgb<u8>,
}

/// Rendering parameters for the compositor.
///
/// Defaults: masks blended at 40% opacity, 2 px boxes, 1 px white mask
/// outlines, 16 px tag text, one color per object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderParams {
    /// Mask opacity in `[0, 1]`.
    pub alpha: f32,
    /// Box outline width in pixels, drawn inwards.
    pub box_thickness: u32,
    /// Whether mask outlines are drawn over the blended masks.
    pub show_border: bool,
    /// Mask outline width in pixels.
    pub border_thickness: u32,
    pub border_color: [u8; 3],
    /// Tag text height in pixels.
    pub tag_scale: f32,
    pub colors: ColorMode,
    /// Douglas-Peucker tolerance for outlines of RLE and dense masks.
    pub contour_epsilon: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        RenderParams {
            alpha: 0.4,
            box_thickness: 2,
            show_border: true,
            border_thickness: 1,
            border_color: WHITE.0,
            tag_scale: 16.0,
            colors: ColorMode::Auto,
            contour_epsilon: 0.5,
        }
    }
}

impl RenderParams {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = RenderParams::default();
        assert_eq!(p.alpha, 0.4);
        assert_eq!(p.box_thickness, 2);
        assert!(p.show_border);
        assert_eq!(p.colors, ColorMode::Auto);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let p: RenderParams = serde_json::from_str(
            r#"{"alpha": 0.5, "colors": {"mode": "fixed", "box_color": [1, 2, 3],
                "mask_color": [4, 5, 6], "tag_background": [7, 8, 9]}}"#,
        )
        .unwrap();
        assert_eq!(p.alpha, 0.5);
        assert_eq!(p.box_thickness, 2);
        let colors = p.colors.assign(2);
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[1].outline, Rgb([1, 2, 3]));
        assert_eq!(colors[1].fill, Rgb([4, 5, 6]));
    }

    #[test]
    fn test_auto_colors_shared_per_object() {
        let colors = ColorMode::Auto.assign(3);
        assert_eq!(colors[0].outline, colors[0].fill);
        assert_ne!(colors[0].outline, colors[1].outline);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.json");
        std::fs::write(&path, r#"{"show_border": false, "colors": {"mode": "auto"}}"#).unwrap();
        let p = RenderParams::from_file(&path).unwrap();
        assert!(!p.show_border);
        assert!(RenderParams::from_file(&dir.path().join("missing.json")).is_err());
    }
}
