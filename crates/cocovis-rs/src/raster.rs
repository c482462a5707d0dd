//! Polygon rasterization into dense binary masks.
//!
//! Pixels are sampled at their centers: pixel `(x, y)` covers the unit square
//! `[x, x+1) x [y, y+1)` and is foreground iff `(x + 0.5, y + 0.5)` lies inside
//! the polygon under the even-odd rule, or exactly on one of its edges.

use image::{GrayImage, Luma};
use log::debug;

use crate::error::{Error, Result};

/// Dense binary mask of fixed size.
///
/// Stored column-major (pixel `(x, y)` at index `y + h * x`), one byte per pixel
/// holding 0 or 1, so it walks in the same order as an [`Rle`](crate::Rle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    h: u32,
    w: u32,
    data: Vec<u8>,
}

impl Mask {
    /// All-background mask of `h` rows and `w` columns.
    pub fn new(h: u32, w: u32) -> Self {
        Mask {
            h,
            w,
            data: vec![0; (h as usize) * (w as usize)],
        }
    }

    /// Wrap column-major pixel data. Any non-zero byte counts as foreground.
    pub fn from_col_major(h: u32, w: u32, data: Vec<u8>) -> Result<Self> {
        let n = (h as usize) * (w as usize);
        if data.len() != n {
            return Err(Error::LengthMismatch {
                what: "mask data",
                expected: n,
                actual: data.len(),
            });
        }
        let data = data.into_iter().map(|v| u8::from(v != 0)).collect();
        Ok(Mask { h, w, data })
    }

    /// Build from a grayscale image; pixels above zero are foreground.
    pub fn from_gray(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        let mut mask = Mask::new(h, w);
        for (x, y, p) in img.enumerate_pixels() {
            if p.0[0] > 0 {
                mask.set(x, y, true);
            }
        }
        mask
    }

    /// Render as a 0/255 grayscale image.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.w, self.h, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    pub fn height(&self) -> u32 {
        self.h
    }

    pub fn width(&self) -> u32 {
        self.w
    }

    /// `(height, width)`.
    pub fn dims(&self) -> (u32, u32) {
        (self.h, self.w)
    }

    /// Column-major pixel bytes (0 or 1).
    pub fn as_col_major(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) + (self.h as usize) * (x as usize)
    }

    /// Pixel value at column `x`, row `y`. Out-of-range reads are background.
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.w && y < self.h && self.data[self.index(x, y)] != 0
    }

    /// Set pixel at column `x`, row `y`. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.w && y < self.h {
            let i = self.index(x, y);
            self.data[i] = u8::from(value);
        }
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.data.iter().filter(|&&v| v != 0).count() as u64
    }

    /// Logical OR of `other` into `self`.
    pub fn union_with(&mut self, other: &Mask) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(Error::DimensionMismatch {
                expected: self.dims(),
                actual: other.dims(),
            });
        }
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a |= b;
        }
        Ok(())
    }

    pub(crate) fn set_col_major(&mut self, start: usize, end: usize) {
        self.data[start..end].fill(1);
    }
}

/// One closed polygon ring given as a flat `[x0, y0, x1, y1, ...]` list.
#[derive(Debug, Clone, Copy)]
pub struct Contour<'a> {
    xy: &'a [f64],
}

impl<'a> Contour<'a> {
    /// Validate a flat coordinate list: even length, at least 3 points.
    pub fn new(xy: &'a [f64]) -> Result<Self> {
        if xy.len() < 6 || xy.len() % 2 != 0 {
            return Err(Error::DegenerateContour { values: xy.len() });
        }
        Ok(Contour { xy })
    }

    /// Number of points, never fewer than 3.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.xy.len() / 2
    }

    pub fn point(&self, i: usize) -> (f64, f64) {
        (self.xy[2 * i], self.xy[2 * i + 1])
    }

    /// Edges as `(start, end)` pairs, closing back to the first point.
    pub fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.len();
        (0..n).map(move |i| (self.point(i), self.point((i + 1) % n)))
    }
}

/// Rasterize every contour of a polygon and union the results.
///
/// Degenerate contours are skipped; an empty polygon yields an empty mask.
pub fn rasterize(polygon: &[Vec<f64>], h: u32, w: u32) -> Mask {
    let mut mask = Mask::new(h, w);
    for (i, xy) in polygon.iter().enumerate() {
        match Contour::new(xy) {
            Ok(contour) => fill_contour(&mut mask, contour),
            Err(err) => debug!("skipping contour {i}: {err}"),
        }
    }
    mask
}

/// Rasterize a single contour.
pub fn rasterize_contour(contour: Contour<'_>, h: u32, w: u32) -> Mask {
    let mut mask = Mask::new(h, w);
    fill_contour(&mut mask, contour);
    mask
}

/// First and last column whose center lies in `[xa, xb]`, clipped to the canvas.
fn center_span(xa: f64, xb: f64, w: u32) -> Option<(u32, u32)> {
    let first = (xa - 0.5).ceil().max(0.0);
    let last = (xb - 0.5).floor().min(w as f64 - 1.0);
    if first > last {
        return None;
    }
    Some((first as u32, last as u32))
}

/// Rows whose center lies in `[y0, y1]`, clipped to the canvas.
fn center_rows(y0: f64, y1: f64, h: u32) -> Option<(u32, u32)> {
    center_span(y0, y1, h)
}

fn fill_contour(mask: &mut Mask, contour: Contour<'_>) {
    let (h, w) = mask.dims();
    if h == 0 || w == 0 {
        return;
    }
    let (ymin, ymax) = contour
        .edges()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), ((_, y), _)| {
            (lo.min(y), hi.max(y))
        });

    // Interior: even-odd spans per scanline, half-open in y per edge so shared
    // vertices are counted once.
    let mut xs: Vec<f64> = Vec::new();
    if let Some((r0, r1)) = center_rows(ymin, ymax, h) {
        for r in r0..=r1 {
            let yc = r as f64 + 0.5;
            xs.clear();
            for ((x0, y0), (x1, y1)) in contour.edges() {
                let (lo, hi) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
                if yc < lo || yc >= hi {
                    continue;
                }
                xs.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
            }
            xs.sort_by(f64::total_cmp);
            for pair in xs.chunks_exact(2) {
                if let Some((c0, c1)) = center_span(pair[0], pair[1], w) {
                    mask.fill_row(r, c0, c1);
                }
            }
        }
    }

    // Boundary: centers lying exactly on an edge are inside too.
    for ((x0, y0), (x1, y1)) in contour.edges() {
        let (lo, hi) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
        let Some((r0, r1)) = center_rows(lo, hi, h) else {
            continue;
        };
        for r in r0..=r1 {
            let yc = r as f64 + 0.5;
            if y0 == y1 {
                let (xa, xb) = if x0 < x1 { (x0, x1) } else { (x1, x0) };
                if let Some((c0, c1)) = center_span(xa, xb, w) {
                    mask.fill_row(r, c0, c1);
                }
            } else {
                let x = x0 + (yc - y0) * (x1 - x0) / (y1 - y0);
                let c = x - 0.5;
                if c == c.floor() && c >= 0.0 && c < w as f64 {
                    mask.set(c as u32, r, true);
                }
            }
        }
    }
}

impl Mask {
    fn fill_row(&mut self, y: u32, x0: u32, x1: u32) {
        for x in x0..=x1 {
            let i = self.index(x, y);
            self.data[i] = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(mask: &Mask) -> Vec<String> {
        (0..mask.height())
            .map(|y| {
                (0..mask.width())
                    .map(|x| if mask.get(x, y) { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_square_on_5x5() {
        let mask = rasterize(&[vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0, 0.0, 4.0]], 5, 5);
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(mask.get(x, y), x < 4 && y < 4, "pixel ({x}, {y})");
            }
        }
        assert_eq!(mask.area(), 16);
    }

    #[test]
    fn test_empty_polygon_is_background() {
        let mask = rasterize(&[], 4, 6);
        assert_eq!(mask.dims(), (4, 6));
        assert_eq!(mask.area(), 0);
    }

    #[test]
    fn test_degenerate_contours_are_skipped() {
        let polygon = vec![
            vec![1.0, 1.0, 3.0, 3.0],
            vec![0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0],
            vec![1.0, 1.0, 2.0, 2.0, 3.0],
        ];
        let mask = rasterize(&polygon, 4, 4);
        assert_eq!(mask.area(), 4);
        assert!(matches!(
            Contour::new(&polygon[0]),
            Err(Error::DegenerateContour { values: 4 })
        ));
        assert!(Contour::new(&polygon[2]).is_err());
    }

    #[test]
    fn test_contour_points_and_edges() {
        let xy = [0.0, 0.0, 4.0, 0.0, 4.0, 3.0];
        let contour = Contour::new(&xy).unwrap();
        assert_eq!(contour.len(), 3);
        assert_eq!(contour.point(2), (4.0, 3.0));
        let last = contour.edges().last().unwrap();
        assert_eq!(last, ((4.0, 3.0), (0.0, 0.0)));
    }

    #[test]
    fn test_center_on_edge_is_inside() {
        // Right edge at x = 2.5 passes through the centers of column 2; bottom
        // edge at y = 1.5 passes through the centers of row 1.
        let mask = rasterize(&[vec![0.0, 0.0, 2.5, 0.0, 2.5, 1.5, 0.0, 1.5]], 3, 4);
        assert_eq!(rows(&mask), vec!["###.", "###.", "...."]);
    }

    #[test]
    fn test_triangle_even_odd() {
        let mask = rasterize(&[vec![0.0, 0.0, 6.0, 0.0, 0.0, 6.0]], 6, 6);
        assert_eq!(
            rows(&mask),
            vec!["######", "#####.", "####..", "###...", "##....", "#....."]
        );
    }

    #[test]
    fn test_self_overlapping_contours_union() {
        let polygon = vec![
            vec![0.0, 0.0, 3.0, 0.0, 3.0, 3.0, 0.0, 3.0],
            vec![2.0, 2.0, 5.0, 2.0, 5.0, 5.0, 2.0, 5.0],
        ];
        let mask = rasterize(&polygon, 5, 5);
        assert_eq!(mask.area(), 9 + 9 - 1);
        assert!(mask.get(2, 2));
        assert!(!mask.get(4, 0));
    }

    #[test]
    fn test_out_of_canvas_is_clipped() {
        let mask = rasterize(&[vec![-5.0, -5.0, 2.0, -5.0, 2.0, 2.0, -5.0, 2.0]], 4, 4);
        assert_eq!(rows(&mask), vec!["##..", "##..", "....", "...."]);
    }

    #[test]
    fn test_gray_roundtrip() {
        let mask = rasterize(&[vec![1.0, 0.0, 3.0, 0.0, 3.0, 2.0, 1.0, 2.0]], 3, 4);
        let gray = mask.to_gray();
        assert_eq!(gray.get_pixel(1, 0).0[0], 255);
        assert_eq!(gray.get_pixel(0, 0).0[0], 0);
        assert_eq!(Mask::from_gray(&gray), mask);
    }

    #[test]
    fn test_from_col_major_checks_length() {
        assert!(Mask::from_col_major(2, 2, vec![0, 1, 0]).is_err());
        let mask = Mask::from_col_major(2, 2, vec![0, 7, 0, 0]).unwrap();
        assert!(mask.get(0, 1));
        assert_eq!(mask.as_col_major(), &[0, 1, 0, 0]);
    }
}
