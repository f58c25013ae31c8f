use crate::{
    compositor::{self, HexColor},
    error::RenderError,
    qr::QrEncoder,
};
use image::{DynamicImage, RgbaImage};

/// Inputs of one QR render. The output is a pure function of these.
#[derive(Debug, Clone, Copy)]
pub struct RenderSpec<'a> {
    pub text: &'a str,
    pub color: HexColor,
    pub dark_threshold: u8,
    pub logo: Option<&'a RgbaImage>,
}

/// Encode, recolour, watermark and PNG-encode.
///
/// If the composited image cannot be encoded, the plain black-on-white code
/// is served instead so the caller still gets a scannable image.
pub fn render_png(encoder: &dyn QrEncoder, spec: &RenderSpec<'_>) -> Result<Vec<u8>, RenderError> {
    let base = DynamicImage::ImageLuma8(encoder.encode(spec.text)?).into_rgba8();

    if spec.color.is_default() && spec.logo.is_none() {
        return Ok(compositor::encode_png(&base)?);
    }

    let mut canvas = base.clone();
    if !spec.color.is_default() {
        compositor::recolor(&mut canvas, spec.color, spec.dark_threshold);
    }
    if let Some(logo) = spec.logo {
        compositor::overlay_watermark(&mut canvas, logo);
    }

    match compositor::encode_png(&canvas) {
        Ok(png) => Ok(png),
        Err(e) => {
            tracing::warn!(error = %e, "Composited QR failed to encode; serving the base code");
            Ok(compositor::encode_png(&base)?)
        }
    }
}
