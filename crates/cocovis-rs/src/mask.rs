//! RLE mask codec: encode/decode dense masks, union-merge, area, bbox, and the
//! compact string format used by pycocotools annotation files.
//!
//! Runs walk pixels in column-major order (pixel `(x, y)` at offset
//! `y + h * x`) and alternate background/foreground, starting with background.

use crate::error::{Error, Result};
use crate::raster::{self, Contour, Mask};
use crate::types::{Rle, Segmentation};

/// Encode a dense mask into RLE.
///
/// A mask whose first pixel is foreground gets a leading zero-length
/// background run.
pub fn encode(mask: &Mask) -> Rle {
    let (h, w) = mask.dims();
    let mut counts = Vec::new();
    let mut p: u8 = 0;
    let mut c: u32 = 0;

    for &v in mask.as_col_major() {
        if v != p {
            counts.push(c);
            c = 0;
            p = v;
        }
        c += 1;
    }
    counts.push(c);

    Rle { h, w, counts }
}

/// Check that the runs cover exactly `h * w` pixels.
pub fn validate(rle: &Rle) -> Result<()> {
    let expected = (rle.h as u64) * (rle.w as u64);
    let actual = rle.run_sum();
    if actual != expected {
        return Err(Error::MalformedRle { expected, actual });
    }
    Ok(())
}

/// Decode an RLE into a dense mask.
pub fn decode(rle: &Rle) -> Result<Mask> {
    validate(rle)?;
    let mut mask = Mask::new(rle.h, rle.w);
    let mut idx = 0usize;
    for (i, &c) in rle.counts.iter().enumerate() {
        let end = idx + c as usize;
        if i % 2 == 1 {
            mask.set_col_major(idx, end);
        }
        idx = end;
    }
    Ok(mask)
}

/// Number of foreground pixels: the sum of the odd-indexed runs.
pub fn area(rle: &Rle) -> u64 {
    rle.counts
        .iter()
        .skip(1)
        .step_by(2)
        .map(|&c| c as u64)
        .sum()
}

/// Bounding box `[x, y, w, h]` of the foreground, all zeros when empty.
pub fn to_bbox(rle: &Rle) -> [f64; 4] {
    let h = rle.h as usize;
    if h == 0 || rle.w == 0 {
        return [0.0; 4];
    }

    let mut xs = usize::MAX;
    let mut xe = 0usize;
    let mut ys = usize::MAX;
    let mut ye = 0usize;
    let mut has_any = false;

    let mut offset = 0usize;
    for (i, &c) in rle.counts.iter().enumerate() {
        let c = c as usize;
        if i % 2 == 1 && c > 0 {
            has_any = true;
            let (x1, y1) = (offset / h, offset % h);
            let end = offset + c - 1;
            let (x2, y2) = (end / h, end % h);

            xs = xs.min(x1);
            xe = xe.max(x2 + 1);
            if x1 != x2 {
                // the run wraps a column, so it touches every row in between
                ys = 0;
                ye = h;
            } else {
                ys = ys.min(y1);
                ye = ye.max(y2 + 1);
            }
        }
        offset += c;
    }

    if !has_any {
        return [0.0; 4];
    }
    [xs as f64, ys as f64, (xe - xs) as f64, (ye - ys) as f64]
}

/// Union of several same-sized RLEs.
///
/// Equivalent to decoding each input, OR-ing the masks and re-encoding, but
/// walks the runs directly. An empty input yields a `0x0` RLE.
pub fn merge(rles: &[Rle]) -> Result<Rle> {
    let Some(first) = rles.first() else {
        return Ok(Rle {
            h: 0,
            w: 0,
            counts: vec![0],
        });
    };
    for rle in rles {
        if (rle.h, rle.w) != (first.h, first.w) {
            return Err(Error::DimensionMismatch {
                expected: (first.h, first.w),
                actual: (rle.h, rle.w),
            });
        }
        validate(rle)?;
    }

    let mut result = normalize(first);
    for rle in &rles[1..] {
        result = union_two(&result, rle);
    }
    Ok(result)
}

/// Re-encode through the run walk, dropping interior zero-length runs.
fn normalize(rle: &Rle) -> Rle {
    union_two(rle, &Rle::empty(rle.h, rle.w))
}

/// Cursor over the runs of one RLE, skipping zero-length runs.
struct Runs<'a> {
    counts: &'a [u32],
    next: usize,
    remaining: u64,
    value: bool,
}

impl<'a> Runs<'a> {
    fn new(rle: &'a Rle) -> Self {
        Runs {
            counts: &rle.counts,
            next: 0,
            remaining: 0,
            value: false,
        }
    }

    /// Load the next non-empty run; false once exhausted.
    fn refill(&mut self) -> bool {
        while self.remaining == 0 && self.next < self.counts.len() {
            self.remaining = self.counts[self.next] as u64;
            self.value = self.next % 2 == 1;
            self.next += 1;
        }
        self.remaining > 0
    }
}

fn union_two(a: &Rle, b: &Rle) -> Rle {
    let (h, w) = (a.h, a.w);
    let n = (h as u64) * (w as u64);

    let mut counts: Vec<u32> = Vec::new();
    let mut ra = Runs::new(a);
    let mut rb = Runs::new(b);
    let mut current = false;
    let mut total = 0u64;

    while total < n {
        let step = match (ra.refill(), rb.refill()) {
            (true, true) => ra.remaining.min(rb.remaining),
            (true, false) => ra.remaining,
            (false, true) => rb.remaining,
            (false, false) => break,
        };
        let v = (ra.remaining > 0 && ra.value) || (rb.remaining > 0 && rb.value);

        if counts.is_empty() {
            if v {
                counts.push(0);
            }
            counts.push(step as u32);
        } else if v == current {
            if let Some(last) = counts.last_mut() {
                *last += step as u32;
            }
        } else {
            counts.push(step as u32);
        }
        current = v;

        ra.remaining = ra.remaining.saturating_sub(step);
        rb.remaining = rb.remaining.saturating_sub(step);
        total += step;
    }

    if counts.is_empty() {
        counts.push(n as u32);
    }
    Rle { h, w, counts }
}

/// Rasterize each contour separately and union the per-contour RLEs.
///
/// Degenerate contours are skipped, as in [`raster::rasterize`].
pub fn from_polygons(polygon: &[Vec<f64>], h: u32, w: u32) -> Rle {
    let rles: Vec<Rle> = polygon
        .iter()
        .filter_map(|xy| Contour::new(xy).ok())
        .map(|contour| encode(&raster::rasterize_contour(contour, h, w)))
        .collect();
    if rles.is_empty() {
        return Rle::empty(h, w);
    }
    // all inputs come from `encode` at the same size, so the merge cannot fail
    merge(&rles).unwrap_or_else(|_| Rle::empty(h, w))
}

impl Segmentation {
    /// Resolve to an RLE; polygons are rasterized at `h x w`, RLE variants
    /// carry their own size.
    pub fn to_rle(&self, h: u32, w: u32) -> Result<Rle> {
        match self {
            Segmentation::Polygon(polys) => Ok(from_polygons(polys, h, w)),
            Segmentation::CompressedRle { size, counts } => {
                rle_from_string(counts, size[0], size[1])
            }
            Segmentation::UncompressedRle { size, counts } => Ok(Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            }),
        }
    }
}

/// Compress an RLE into the pycocotools string format.
///
/// Each count (from the fourth on, as a difference to the count two positions
/// back) is written as little-endian 5-bit groups with a continuation bit,
/// offset into printable ASCII by 48.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &cnt) in rle.counts.iter().enumerate() {
        let mut x = cnt as i64;
        if i > 2 {
            x -= rle.counts[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    s
}

/// Parse a pycocotools RLE string of an `h x w` mask.
///
/// The result is not checked against `h * w`; [`decode`] and [`merge`] do that.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut p = 0;

    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k = 0;
        loop {
            let Some(&byte) = bytes.get(p) else {
                return Err(Error::InvalidRleString { position: p });
            };
            if !(48..48 + 64).contains(&byte) || k >= 12 {
                return Err(Error::InvalidRleString { position: p });
            }
            let c = (byte - 48) as i64;
            x |= (c & 0x1f) << (5 * k);
            p += 1;
            k += 1;
            if c & 0x20 == 0 {
                if c & 0x10 != 0 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
        }
        let m = counts.len();
        if m > 2 {
            x += counts[m - 2] as i64;
        }
        let count = u32::try_from(x).map_err(|_| Error::InvalidRleString { position: p - 1 })?;
        counts.push(count);
    }

    Ok(Rle { h, w, counts })
}
