//! Mask to polygon conversion via border following.
//!
//! Only outermost borders are reported: holes, and anything nested inside a
//! hole, are ignored. Traced borders run through the centers of the outermost
//! foreground pixels. After simplification each edge is pushed outwards to
//! the line that best separates the foreground pixels it was traced from and
//! the background pixels next to them, so the polygon rasterizes back to
//! (nearly) the same mask.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use log::debug;

use crate::raster::Mask;

/// Tuning for [`extract_contours_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourOptions {
    /// Douglas-Peucker tolerance in pixels. Zero keeps every border pixel.
    pub epsilon: f64,
}

impl Default for ContourOptions {
    fn default() -> Self {
        ContourOptions { epsilon: 0.5 }
    }
}

type Pt = (f64, f64);
type Px = (i32, i32);

/// Longest distance a vertex may move away from its border pixel center.
const MITER_LIMIT: f64 = 1.0;

/// Depths closer than this are treated as equal.
const DEPTH_TOLERANCE: f64 = 1e-9;

/// External contours of `mask` as flat `[x0, y0, x1, y1, ...]` lists.
pub fn extract_contours(mask: &Mask) -> Vec<Vec<f64>> {
    extract_contours_with(mask, &ContourOptions::default())
}

pub fn extract_contours_with(mask: &Mask, opts: &ContourOptions) -> Vec<Vec<f64>> {
    let (h, w) = mask.dims();
    if h == 0 || w == 0 {
        return Vec::new();
    }
    // border following only starts outer borders right of a background
    // pixel, so regions touching column 0 need a background frame
    let mut padded = GrayImage::new(w + 2, h + 2);
    image::imageops::replace(&mut padded, &mask.to_gray(), 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let mut chain: Vec<Px> = c.points.iter().map(|p| (p.x - 1, p.y - 1)).collect();
            chain.dedup();
            if chain.len() > 1 && chain.first() == chain.last() {
                chain.pop();
            }
            let points: Vec<Pt> = chain
                .iter()
                .map(|&(x, y)| (f64::from(x), f64::from(y)))
                .collect();
            let kept = simplify_closed(&points, opts.epsilon);
            if kept.len() < 3 {
                debug!(
                    "dropping contour with {} point(s) after simplification",
                    kept.len()
                );
                return None;
            }
            let flat = fit_edges(mask, &chain, &kept)
                .into_iter()
                .flat_map(|(x, y)| [x.clamp(0.0, w as f64), y.clamp(0.0, h as f64)])
                .collect();
            Some(flat)
        })
        .collect()
}

/// Douglas-Peucker on a closed ring: split at the point farthest from the
/// first one and simplify both halves. Returns ascending indices of the
/// kept points.
fn simplify_closed(points: &[Pt], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let start = points[0];
    let far = points
        .iter()
        .enumerate()
        .fold((0, 0.0f64), |(best, best_d), (i, &p)| {
            let d = (p.0 - start.0).powi(2) + (p.1 - start.1).powi(2);
            if d > best_d {
                (i, d)
            } else {
                (best, best_d)
            }
        })
        .0;
    if far == 0 {
        return vec![0];
    }

    let mut out = Vec::new();
    douglas_peucker(points, 0, far, epsilon, &mut out);
    douglas_peucker(points, far, n, epsilon, &mut out);
    out
}

/// Simplify the ring section `first..=last` (indices wrap around), pushing
/// every kept index except `last`.
fn douglas_peucker(
    points: &[Pt],
    first: usize,
    last: usize,
    epsilon: f64,
    out: &mut Vec<usize>,
) {
    let at = |i: usize| points[i % points.len()];
    if last - first <= 1 {
        out.push(first);
        return;
    }

    let (a, b) = (at(first), at(last));
    let mut max_dist = 0.0;
    let mut max_idx = first;
    for i in first + 1..last {
        let d = perpendicular_distance(at(i), a, b);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        douglas_peucker(points, first, max_idx, epsilon, out);
        douglas_peucker(points, max_idx, last, epsilon, out);
    } else {
        out.push(first);
    }
}

/// Distance from `p` to the line through `a` and `b`.
fn perpendicular_distance(p: Pt, a: Pt, b: Pt) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let norm = dx.hypot(dy);
    if norm < 1e-12 {
        return (p.0 - a.0).hypot(p.1 - a.1);
    }
    ((p.0 - a.0) * dy - (p.1 - a.1) * dx).abs() / norm
}

fn signed_area(points: &[Pt]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum::<f64>()
        / 2.0
}

/// Unit normal of the edge `a -> b` pointing away from the interior.
fn outward_normal(a: Pt, b: Pt, ccw: bool) -> Pt {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = dx.hypot(dy).max(1e-12);
    let (dx, dy) = (dx / len, dy / len);
    if ccw {
        (dy, -dx)
    } else {
        (-dy, dx)
    }
}

/// An edge line `normal . p = origin . normal + offset`.
struct Edge {
    normal: Pt,
    level: f64,
    offset: f64,
}

/// Turn the kept border pixels into polygon vertices in continuous
/// coordinates: offset every simplified edge outwards, then join neighbouring
/// edges at their intersection.
fn fit_edges(mask: &Mask, chain: &[Px], kept: &[usize]) -> Vec<Pt> {
    let n = chain.len();
    let center = |i: usize| {
        let (x, y) = chain[i % n];
        (f64::from(x), f64::from(y))
    };
    let vertices: Vec<Pt> = kept.iter().map(|&i| center(i)).collect();
    let ccw = signed_area(&vertices) >= 0.0;

    let edges: Vec<Edge> = kept
        .iter()
        .enumerate()
        .map(|(k, &first)| {
            let last = kept.get(k + 1).copied().unwrap_or(kept[0] + n);
            let origin = center(first);
            let normal = outward_normal(origin, center(last), ccw);
            let depth = |(x, y): Px| {
                normal.0 * (f64::from(x) - origin.0) + normal.1 * (f64::from(y) - origin.1)
            };
            let section: Vec<Px> = (first..=last).map(|i| chain[i % n]).collect();
            let offset = separating_offset(mask, &section, normal, depth);
            Edge {
                normal,
                level: normal.0 * origin.0 + normal.1 * origin.1 + offset,
                offset,
            }
        })
        .collect();

    vertices
        .iter()
        .enumerate()
        .map(|(k, &cur)| {
            let prev = &edges[(k + edges.len() - 1) % edges.len()];
            let next = &edges[k];
            let det = prev.normal.0 * next.normal.1 - prev.normal.1 * next.normal.0;
            let (px, py) = if det.abs() < 1e-6 {
                (
                    cur.0 + next.normal.0 * next.offset,
                    cur.1 + next.normal.1 * next.offset,
                )
            } else {
                (
                    (prev.level * next.normal.1 - next.level * prev.normal.1) / det,
                    (prev.normal.0 * next.level - next.normal.0 * prev.level) / det,
                )
            };
            let (mut ox, mut oy) = (px - cur.0, py - cur.1);
            let len = ox.hypot(oy);
            if len > MITER_LIMIT {
                ox *= MITER_LIMIT / len;
                oy *= MITER_LIMIT / len;
            }
            (cur.0 + 0.5 + ox, cur.1 + 0.5 + oy)
        })
        .collect()
}

/// Offset along `normal` that misplaces the fewest pixels: foreground pixels
/// of `section` should fall inside the edge, their background 4-neighbours
/// on the outward side outside it. Ties resolve to the middle candidate.
fn separating_offset(mask: &Mask, section: &[Px], normal: Pt, depth: impl Fn(Px) -> f64) -> f64 {
    let outward: Vec<Px> = [(1, 0), (-1, 0), (0, 1), (0, -1)]
        .into_iter()
        .filter(|&(dx, dy)| normal.0 * f64::from(dx) + normal.1 * f64::from(dy) > 1e-9)
        .collect();
    let mut outside: Vec<Px> = section
        .iter()
        .flat_map(|&(x, y)| outward.iter().map(move |&(dx, dy)| (x + dx, y + dy)))
        .filter(|&(x, y)| x < 0 || y < 0 || !mask.get(x as u32, y as u32))
        .collect();
    outside.sort_unstable();
    outside.dedup();

    // (depth, is foreground)
    let mut events: Vec<(f64, bool)> = section
        .iter()
        .map(|&p| (depth(p), true))
        .chain(outside.iter().map(|&p| (depth(p), false)))
        .collect();
    events.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut misplaced = section.len();
    let mut best = misplaced;
    let mut ties = vec![events[0].0 - 0.5];
    let mut i = 0;
    while i < events.len() {
        let group = events[i].0;
        while i < events.len() && events[i].0 - group < DEPTH_TOLERANCE {
            if events[i].1 {
                misplaced -= 1;
            } else {
                misplaced += 1;
            }
            i += 1;
        }
        let candidate = match events.get(i) {
            Some(&(next, _)) => (group + next) / 2.0,
            None => group + 0.5,
        };
        if misplaced < best {
            best = misplaced;
            ties.clear();
            ties.push(candidate);
        } else if misplaced == best {
            ties.push(candidate);
        }
    }
    ties[ties.len() / 2]
}
