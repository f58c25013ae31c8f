//! Recolouring and watermarking of rendered QR bitmaps.
//!
//! Passes run recolour first, then watermark: the white backdrop painted by
//! the watermark pass must never be touched by recolouring.

use image::{imageops, ImageFormat, Rgba, RgbaImage};
use std::{fmt, io::Cursor};

/// A pixel counts as a dark module when every channel is below this.
pub const DEFAULT_DARK_THRESHOLD: u8 = 50;

/// Logo box side as a fraction of the QR width.
const LOGO_FRACTION: f64 = 0.20;
/// White backdrop side relative to the logo box.
const BACKDROP_FACTOR: f64 = 1.10;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Six-digit RGB colour as accepted by the `color` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexColor([u8; 3]);

impl HexColor {
    pub const BLACK: HexColor = HexColor([0, 0, 0]);

    /// Parse `RRGGBB` (an optional leading `#` is ignored).
    pub fn parse(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    /// Parse, silently falling back to black on anything malformed.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    pub fn is_default(&self) -> bool {
        *self == Self::BLACK
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.0
    }
}

impl Default for HexColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "{r:02x}{g:02x}{b:02x}")
    }
}

pub fn is_dark(pixel: &Rgba<u8>, threshold: u8) -> bool {
    pixel[0] < threshold && pixel[1] < threshold && pixel[2] < threshold
}

/// Replace every dark pixel's colour with `target`, leaving alpha and all
/// other pixels untouched.
pub fn recolor(img: &mut RgbaImage, target: HexColor, threshold: u8) {
    let [r, g, b] = target.rgb();
    for pixel in img.pixels_mut() {
        if is_dark(pixel, threshold) {
            pixel[0] = r;
            pixel[1] = g;
            pixel[2] = b;
        }
    }
}

/// Placement of the watermark on a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkGeometry {
    /// Side of the square the logo is fitted into.
    pub logo_box: u32,
    /// Side of the opaque white backdrop.
    pub backdrop: u32,
    /// Top-left corner of the backdrop.
    pub backdrop_x: u32,
    pub backdrop_y: u32,
    /// Canvas centre.
    pub center_x: u32,
    pub center_y: u32,
}

impl WatermarkGeometry {
    pub fn for_canvas(width: u32, height: u32) -> Self {
        let logo_box = (width as f64 * LOGO_FRACTION) as u32;
        let backdrop = (logo_box as f64 * BACKDROP_FACTOR) as u32;
        let (center_x, center_y) = (width / 2, height / 2);
        Self {
            logo_box,
            backdrop,
            backdrop_x: center_x.saturating_sub(backdrop / 2),
            backdrop_y: center_y.saturating_sub(backdrop / 2),
            center_x,
            center_y,
        }
    }

    /// Logo dimensions after fitting `(w, h)` into the logo box, aspect preserved.
    pub fn fit(&self, w: u32, h: u32) -> (u32, u32) {
        if w == 0 || h == 0 {
            return (0, 0);
        }
        let target = self.logo_box as f64;
        let scale = (target / w as f64).min(target / h as f64);
        (
            ((w as f64 * scale) as u32).max(1),
            ((h as f64 * scale) as u32).max(1),
        )
    }
}

/// Paint a white backdrop at the centre of `img` and alpha-blend the scaled
/// `logo` on top of it.
pub fn overlay_watermark(img: &mut RgbaImage, logo: &RgbaImage) {
    let (width, height) = img.dimensions();
    let geometry = WatermarkGeometry::for_canvas(width, height);
    if geometry.logo_box == 0 {
        return;
    }

    let x_end = (geometry.backdrop_x + geometry.backdrop).min(width);
    let y_end = (geometry.backdrop_y + geometry.backdrop).min(height);
    for y in geometry.backdrop_y..y_end {
        for x in geometry.backdrop_x..x_end {
            img.put_pixel(x, y, WHITE);
        }
    }

    let (logo_w, logo_h) = geometry.fit(logo.width(), logo.height());
    if logo_w == 0 || logo_h == 0 {
        return;
    }
    let scaled = imageops::resize(logo, logo_w, logo_h, imageops::FilterType::Triangle);
    let x = geometry.center_x as i64 - (logo_w / 2) as i64;
    let y = geometry.center_y as i64 - (logo_h / 2) as i64;
    imageops::overlay(img, &scaled, x, y);
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
