use image::Rgb;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
/// Default box and tag background color.
pub const GREEN: Rgb<u8> = Rgb([15, 127, 18]);
/// Default mask fill color.
pub const GRAY: Rgb<u8> = Rgb([218, 227, 218]);

/// `count` visually distinct colors, one per object.
///
/// Hues are evenly spaced around the color wheel, so the result depends only
/// on `count` and renders identically across runs.
pub fn distinct_colors(count: usize) -> Vec<Rgb<u8>> {
    (0..count).map(|i| distinct_color(i, count)).collect()
}

/// The `index`-th of `count` distinct colors.
pub fn distinct_color(index: usize, count: usize) -> Rgb<u8> {
    let hue = if count == 0 {
        0.0
    } else {
        360.0 * (index % count) as f64 / count as f64
    };
    hsv_to_rgb(hue, 0.85, 0.95)
}

/// `hue` in degrees, `saturation` and `value` in `[0, 1]`.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> Rgb<u8> {
    let c = value * saturation;
    let h = hue.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    let to_u8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// Black or white, whichever reads better on `background`.
pub fn contrasting(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    if luma > 140.0 {
        BLACK
    } else {
        WHITE
    }
}
