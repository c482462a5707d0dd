//! Draw boxes, tags and alpha-blended masks onto a copy of an image.

use std::borrow::Cow;
use std::path::Path;

use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use log::warn;

use crate::color;
use crate::contour::{extract_contours_with, ContourOptions};
use crate::error::{Error, Result};
use crate::mask;
use crate::params::{ObjectColors, RenderParams};
use crate::raster::{self, Contour, Mask};
use crate::types::{Rle, Segmentation};

/// One object's segmentation in any of the supported representations.
#[derive(Debug, Clone)]
pub enum MaskInput<'a> {
    Dense(&'a Mask),
    Rle(Cow<'a, Rle>),
    Polygon(&'a [Vec<f64>]),
}

impl<'a> From<&'a Mask> for MaskInput<'a> {
    fn from(mask: &'a Mask) -> Self {
        MaskInput::Dense(mask)
    }
}

impl<'a> From<&'a Rle> for MaskInput<'a> {
    fn from(rle: &'a Rle) -> Self {
        MaskInput::Rle(Cow::Borrowed(rle))
    }
}

impl<'a> TryFrom<&'a Segmentation> for MaskInput<'a> {
    type Error = Error;

    fn try_from(seg: &'a Segmentation) -> Result<Self> {
        Ok(match seg {
            Segmentation::Polygon(polys) => MaskInput::Polygon(polys),
            Segmentation::CompressedRle { size, counts } => {
                MaskInput::Rle(Cow::Owned(mask::rle_from_string(counts, size[0], size[1])?))
            }
            Segmentation::UncompressedRle { size, counts } => MaskInput::Rle(Cow::Owned(Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            })),
        })
    }
}

/// A mask resolved to image resolution, plus the outline to draw for it.
struct Resolved {
    mask: Mask,
    outline: Vec<Vec<f64>>,
}

/// Read a TrueType/OpenType font for tag text.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let data = std::fs::read(path)?;
    Ok(FontArc::try_from_vec(data)?)
}

/// Renders annotation overlays with fixed parameters.
///
/// Holds no per-image state; one compositor can render many images, from
/// several threads at once.
#[derive(Clone, Default)]
pub struct Compositor {
    params: RenderParams,
    font: Option<FontArc>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("params", &self.params)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Compositor {
    pub fn new(params: RenderParams) -> Self {
        Compositor { params, font: None }
    }

    /// Font for tag text. Without one, tags get only their background box.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    /// Draw `boxes` (`[x, y, w, h]`), optional `tags` and optional `masks` onto
    /// a copy of `image`.
    ///
    /// `masks` and `tags`, when given, must have one entry per box. Inputs are
    /// validated before anything is drawn, so an error never leaves a partial
    /// render behind. Objects are drawn in input order: later masks blend over
    /// earlier ones where they overlap.
    pub fn composite(
        &self,
        image: &RgbImage,
        boxes: &[[f64; 4]],
        masks: Option<&[MaskInput<'_>]>,
        tags: Option<&[String]>,
    ) -> Result<RgbImage> {
        if let Some(masks) = masks {
            check_len("masks", boxes.len(), masks.len())?;
        }
        if let Some(tags) = tags {
            check_len("tags", boxes.len(), tags.len())?;
        }
        let resolved = match masks {
            Some(masks) => masks
                .iter()
                .map(|m| self.resolve(m, image))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let colors = self.params.colors.assign(boxes.len());
        let mut canvas = image.clone();

        if tags.is_some() && self.font.is_none() {
            warn!("no font configured; tags are drawn without text");
        }
        for (i, (bbox, c)) in boxes.iter().zip(&colors).enumerate() {
            draw_box(&mut canvas, bbox, c.outline, self.params.box_thickness);
            if let Some(tags) = tags {
                self.draw_tag(&mut canvas, bbox, &tags[i], c);
            }
        }

        if resolved.is_empty() {
            return Ok(canvas);
        }
        let mut canvas = blend(&canvas, &resolved, &colors, self.params.alpha);

        if self.params.show_border {
            let border = Rgb(self.params.border_color);
            for r in &resolved {
                for ring in &r.outline {
                    draw_ring(&mut canvas, ring, border, self.params.border_thickness);
                }
            }
        }
        Ok(canvas)
    }

    fn resolve(&self, input: &MaskInput<'_>, image: &RgbImage) -> Result<Resolved> {
        let dims = (image.height(), image.width());
        let opts = ContourOptions {
            epsilon: self.params.contour_epsilon,
        };
        let outline_of = |mask: &Mask| {
            if self.params.show_border {
                extract_contours_with(mask, &opts)
            } else {
                Vec::new()
            }
        };
        match input {
            MaskInput::Dense(mask) => {
                check_dims(dims, mask.dims())?;
                Ok(Resolved {
                    outline: outline_of(*mask),
                    mask: (*mask).clone(),
                })
            }
            MaskInput::Rle(rle) => {
                check_dims(dims, (rle.h, rle.w))?;
                let mask = mask::decode(rle)?;
                Ok(Resolved {
                    outline: outline_of(&mask),
                    mask,
                })
            }
            MaskInput::Polygon(polys) => Ok(Resolved {
                mask: raster::rasterize(polys, dims.0, dims.1),
                outline: polys
                    .iter()
                    .filter(|xy| Contour::new(xy).is_ok())
                    .cloned()
                    .collect(),
            }),
        }
    }

    fn draw_tag(&self, canvas: &mut RgbImage, bbox: &[f64; 4], text: &str, c: &ObjectColors) {
        let scale = self.params.tag_scale;
        let (tw, th) = match &self.font {
            Some(font) => text_size(scale, font, text),
            // rough advance of 0.6 em per character
            None => (
                (scale * 3.0 * text.chars().count() as f32 / 5.0).ceil() as u32,
                scale.ceil() as u32,
            ),
        };
        if tw == 0 || th == 0 {
            return;
        }
        let back_h = th * 13 / 10;
        let (w, h) = canvas.dimensions();
        let x0 = clamp_coord(bbox[0] as i64, w, tw as i64 + 1);
        let top = clamp_coord(bbox[1] as i64 - back_h as i64, h, back_h as i64 + 1);
        draw_filled_rect_mut(
            canvas,
            Rect::at(x0, top).of_size(tw, back_h.max(1)),
            c.tag_background,
        );
        if let Some(font) = &self.font {
            let fg = color::contrasting(c.tag_background);
            draw_text_mut(canvas, fg, x0, top, scale, font, text);
        }
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_dims(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Pull a pixel coordinate into `-margin..=limit + margin`.
///
/// Anything drawn within `margin` of the clamped value stays off the canvas
/// exactly when it would have at the original position.
fn clamp_coord(v: i64, limit: u32, margin: i64) -> i32 {
    let hi = (limit as i64 + margin).min(i32::MAX as i64);
    v.clamp(-margin, hi) as i32
}

/// Outline covering columns `x..x+w-1` and rows `y..y+h-1`, `thickness` rings
/// drawn inwards.
fn draw_box(canvas: &mut RgbImage, bbox: &[f64; 4], color: Rgb<u8>, thickness: u32) {
    let (cw, ch) = canvas.dimensions();
    let margin = thickness as i64 + 1;
    let x0 = clamp_coord(bbox[0] as i64, cw, margin);
    let y0 = clamp_coord(bbox[1] as i64, ch, margin);
    let w = clamp_coord((bbox[0] + bbox[2]) as i64, cw, margin) - x0;
    let h = clamp_coord((bbox[1] + bbox[3]) as i64, ch, margin) - y0;
    for i in 0..thickness as i32 {
        let (rw, rh) = (w - 2 * i, h - 2 * i);
        if rw <= 0 || rh <= 0 {
            break;
        }
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x0 + i, y0 + i).of_size(rw as u32, rh as u32),
            color,
        );
    }
}

/// `out = img * (1 - alpha) + color * alpha` over each mask in order,
/// accumulated in floats and truncated once at the end.
fn blend(canvas: &RgbImage, resolved: &[Resolved], colors: &[ObjectColors], alpha: f32) -> RgbImage {
    let (w, h) = canvas.dimensions();
    let mut acc: Vec<f32> = canvas.as_raw().iter().map(|&v| v as f32).collect();
    for (r, c) in resolved.iter().zip(colors) {
        let fill = c.fill.0.map(|v| v as f32 * alpha);
        for x in 0..w {
            for y in 0..h {
                if !r.mask.get(x, y) {
                    continue;
                }
                let i = 3 * (y as usize * w as usize + x as usize);
                for ch in 0..3 {
                    acc[i + ch] = acc[i + ch] * (1.0 - alpha) + fill[ch];
                }
            }
        }
    }
    RgbImage::from_fn(w, h, |x, y| {
        let i = 3 * (y as usize * w as usize + x as usize);
        Rgb([0, 1, 2].map(|ch| acc[i + ch].clamp(0.0, 255.0) as u8))
    })
}

/// Closed polyline through a flat `[x0, y0, ...]` ring.
fn draw_ring(canvas: &mut RgbImage, ring: &[f64], color: Rgb<u8>, thickness: u32) {
    let n = ring.len() / 2;
    if n < 2 {
        return;
    }
    let t = thickness.max(1) as i32;
    let (lo, hi) = (-(t - 1) / 2, t / 2);
    for i in 0..n {
        let j = (i + 1) % n;
        let a = (ring[2 * i] as f32, ring[2 * i + 1] as f32);
        let b = (ring[2 * j] as f32, ring[2 * j + 1] as f32);
        for dx in lo..=hi {
            for dy in lo..=hi {
                let (dx, dy) = (dx as f32, dy as f32);
                draw_line_segment_mut(canvas, (a.0 + dx, a.1 + dy), (b.0 + dx, b.1 + dy), color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ColorMode;

    fn fixed(color: [u8; 3]) -> ColorMode {
        ColorMode::Fixed {
            box_color: color,
            mask_color: color,
            tag_background: color,
        }
    }

    fn params(colors: ColorMode) -> RenderParams {
        RenderParams {
            alpha: 0.5,
            box_thickness: 0,
            show_border: false,
            colors,
            ..RenderParams::default()
        }
    }

    #[test]
    fn test_box_outline_on_black() {
        let image = RgbImage::new(100, 100);
        let compositor = Compositor::new(RenderParams {
            box_thickness: 1,
            colors: fixed([0, 255, 0]),
            ..RenderParams::default()
        });
        let out = compositor
            .composite(&image, &[[10.0, 10.0, 20.0, 20.0]], None, None)
            .unwrap();

        let green = Rgb([0, 255, 0]);
        for i in 10..30 {
            assert_eq!(*out.get_pixel(i, 10), green);
            assert_eq!(*out.get_pixel(i, 29), green);
            assert_eq!(*out.get_pixel(10, i), green);
            assert_eq!(*out.get_pixel(29, i), green);
        }
        for y in 11..29 {
            for x in 11..29 {
                assert_eq!(*out.get_pixel(x, y), Rgb([0, 0, 0]));
            }
        }
        let lit = out.pixels().filter(|p| **p == green).count();
        assert_eq!(lit, 76);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_thick_box_draws_inwards() {
        let image = RgbImage::new(50, 50);
        let compositor = Compositor::new(RenderParams {
            box_thickness: 2,
            colors: fixed([255, 0, 0]),
            ..RenderParams::default()
        });
        let out = compositor
            .composite(&image, &[[5.0, 5.0, 10.0, 10.0]], None, None)
            .unwrap();
        assert_eq!(out.get_pixel(6, 6).0, [255, 0, 0]);
        assert_eq!(out.get_pixel(4, 4).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(7, 7).0, [0, 0, 0]);
    }

    #[test]
    fn test_length_mismatch_aborts() {
        let image = RgbImage::new(20, 20);
        let boxes = [[0.0, 0.0, 5.0, 5.0]; 3];
        let tags = vec!["a".to_string(), "b".to_string()];
        let err = Compositor::default()
            .composite(&image, &boxes, None, Some(&tags[..]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                what: "tags",
                expected: 3,
                actual: 2
            }
        ));

        let poly = vec![vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0]];
        let masks = [MaskInput::Polygon(&poly)];
        assert!(Compositor::default()
            .composite(&image, &boxes, Some(&masks[..]), None)
            .is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let image = RgbImage::new(8, 6);
        let wrong = Mask::new(8, 6);
        let masks = [MaskInput::Dense(&wrong)];
        let err = Compositor::default()
            .composite(&image, &[[0.0, 0.0, 1.0, 1.0]], Some(&masks[..]), None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: (6, 8),
                actual: (8, 6)
            }
        ));
    }

    #[test]
    fn test_malformed_rle_surfaces() {
        let image = RgbImage::new(3, 3);
        let rle = Rle {
            h: 3,
            w: 3,
            counts: vec![1, 1],
        };
        let masks = [MaskInput::from(&rle)];
        assert!(matches!(
            Compositor::default().composite(&image, &[[0.0; 4]], Some(&masks[..]), None),
            Err(Error::MalformedRle { .. })
        ));
    }

    #[test]
    fn test_alpha_blend_inside_mask_only() {
        let image = RgbImage::from_pixel(10, 10, Rgb([100, 100, 100]));
        let poly = vec![vec![2.0, 2.0, 6.0, 2.0, 6.0, 6.0, 2.0, 6.0]];
        let masks = [MaskInput::Polygon(&poly)];
        let out = Compositor::new(params(fixed([200, 0, 0])))
            .composite(&image, &[[2.0, 2.0, 4.0, 4.0]], Some(&masks[..]), None)
            .unwrap();
        assert_eq!(out.get_pixel(3, 3).0, [150, 50, 50]);
        assert_eq!(out.get_pixel(6, 6).0, [100, 100, 100]);
        assert_eq!(out.get_pixel(1, 3).0, [100, 100, 100]);
    }

    #[test]
    fn test_later_masks_blend_over_earlier() {
        let image = RgbImage::new(10, 10);
        let mut a = Mask::new(10, 10);
        let mut b = Mask::new(10, 10);
        for x in 0..6 {
            for y in 0..6 {
                a.set(x, y, true);
                b.set(x + 3, y + 3, true);
            }
        }
        let rle_b = mask::encode(&b);
        let masks = [MaskInput::Dense(&a), MaskInput::from(&rle_b)];
        let compositor = Compositor::new(params(ColorMode::Auto));
        let colors = ColorMode::Auto.assign(2);
        let out = compositor
            .composite(&image, &[[0.0; 4], [0.0; 4]], Some(&masks[..]), None)
            .unwrap();

        let expect = |prev: [f32; 3], c: Rgb<u8>| -> [f32; 3] {
            [0, 1, 2].map(|i| prev[i] * 0.5 + c.0[i] as f32 * 0.5)
        };
        let only_a = expect([0.0; 3], colors[0].fill);
        let both = expect(only_a, colors[1].fill);
        assert_eq!(out.get_pixel(1, 1).0, only_a.map(|v| v as u8));
        assert_eq!(out.get_pixel(4, 4).0, both.map(|v| v as u8));
        assert_ne!(out.get_pixel(4, 4), out.get_pixel(1, 1));
    }

    #[test]
    fn test_border_drawn_for_polygon() {
        let image = RgbImage::new(20, 20);
        let poly = vec![vec![5.0, 5.0, 15.0, 5.0, 15.0, 15.0, 5.0, 15.0]];
        let masks = [MaskInput::Polygon(&poly)];
        let compositor = Compositor::new(RenderParams {
            show_border: true,
            ..params(fixed([0, 0, 200]))
        });
        let out = compositor
            .composite(&image, &[[0.0; 4]], Some(&masks[..]), None)
            .unwrap();
        assert_eq!(out.get_pixel(10, 5).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(10, 10).0, [0, 0, 100]);
    }

    #[test]
    fn test_border_drawn_for_rle() {
        let image = RgbImage::new(20, 20);
        let poly = vec![vec![5.0, 5.0, 15.0, 5.0, 15.0, 15.0, 5.0, 15.0]];
        let rle = mask::from_polygons(&poly, 20, 20);
        let masks = [MaskInput::from(&rle)];
        let compositor = Compositor::new(RenderParams {
            show_border: true,
            ..params(fixed([0, 0, 200]))
        });
        let out = compositor
            .composite(&image, &[[0.0; 4]], Some(&masks[..]), None)
            .unwrap();
        assert_eq!(out.get_pixel(10, 5).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(10, 10).0, [0, 0, 100]);
    }

    #[test]
    fn test_border_drawn_for_rle_on_left_edge() {
        let image = RgbImage::new(20, 20);
        let poly = vec![vec![0.0, 5.0, 10.0, 5.0, 10.0, 15.0, 0.0, 15.0]];
        let rle = mask::from_polygons(&poly, 20, 20);
        let masks = [MaskInput::from(&rle)];
        let compositor = Compositor::new(RenderParams {
            show_border: true,
            ..params(fixed([0, 0, 200]))
        });
        let out = compositor
            .composite(&image, &[[0.0; 4]], Some(&masks[..]), None)
            .unwrap();
        assert_eq!(out.get_pixel(5, 5).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(5, 10).0, [0, 0, 100]);
    }

    #[test]
    fn test_tag_background_without_font() {
        let image = RgbImage::new(60, 60);
        let compositor = Compositor::new(RenderParams {
            box_thickness: 1,
            tag_scale: 10.0,
            colors: fixed([0, 200, 0]),
            ..RenderParams::default()
        });
        let tags = vec!["ab".to_string()];
        let out = compositor
            .composite(&image, &[[10.0, 30.0, 20.0, 20.0]], None, Some(&tags[..]))
            .unwrap();
        // 2 chars * 6 px wide, 13 px tall, ending just above the box
        assert_eq!(out.get_pixel(10, 17).0, [0, 200, 0]);
        assert_eq!(out.get_pixel(21, 29).0, [0, 200, 0]);
        assert_eq!(out.get_pixel(22, 29).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(10, 16).0, [0, 0, 0]);
    }

    #[test]
    fn test_huge_boxes_are_clipped() {
        let image = RgbImage::new(10, 10);
        let compositor = Compositor::new(RenderParams {
            box_thickness: 1,
            tag_scale: 4.0,
            colors: fixed([0, 255, 0]),
            ..RenderParams::default()
        });
        let boxes = [[-1e10, 0.0, 2e10, 5.0], [5e9, -3e9, 1e9, f64::NAN]];
        let tags = vec!["a".to_string(), "b".to_string()];
        let out = compositor
            .composite(&image, &boxes, None, Some(&tags[..]))
            .unwrap();
        for x in 0..10 {
            assert_eq!(out.get_pixel(x, 4).0, [0, 255, 0]);
            assert_eq!(out.get_pixel(x, 2).0, [0, 0, 0]);
        }
    }

    #[test]
    fn test_blend_keeps_pixels_outside_masks() {
        let mut image = RgbImage::new(4, 3);
        image.put_pixel(3, 2, Rgb([7, 8, 9]));
        let mut mask = Mask::new(3, 4);
        mask.set(0, 0, true);
        let compositor = Compositor::new(params(fixed([200, 100, 0])));
        let masks = [MaskInput::Dense(&mask)];
        let out = compositor
            .composite(&image, &[[0.0; 4]], Some(&masks[..]), None)
            .unwrap();
        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.get_pixel(0, 0).0, [100, 50, 0]);
        assert_eq!(out.get_pixel(3, 2).0, [7, 8, 9]);
    }

    #[test]
    fn test_segmentation_conversion() {
        let seg = Segmentation::CompressedRle {
            size: [10, 10],
            counts: "53l2".into(),
        };
        match MaskInput::try_from(&seg).unwrap() {
            MaskInput::Rle(rle) => assert_eq!(rle.counts, vec![5, 3, 92]),
            other => panic!("unexpected {other:?}"),
        }
        let bad = Segmentation::CompressedRle {
            size: [1, 1],
            counts: "~~".into(),
        };
        assert!(MaskInput::try_from(&bad).is_err());
    }
}
