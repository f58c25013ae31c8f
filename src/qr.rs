use crate::error::RenderError;
use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

pub const DARK: Luma<u8> = Luma([0]);
pub const LIGHT: Luma<u8> = Luma([255]);

/// Turns text into a binary (pure black / pure white) QR bitmap.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<GrayImage, RenderError>;
}

/// `qrcode`-backed encoder at error-correction level H (~30% of modules
/// recoverable, which leaves room for the centre watermark).
#[derive(Debug, Clone, Copy)]
pub struct QrCodeEncoder {
    /// Pixels per module side.
    module_scale: u32,
    /// Light border, in modules.
    quiet_zone: u32,
}

impl QrCodeEncoder {
    pub fn new(module_scale: u32, quiet_zone: u32) -> Self {
        Self {
            module_scale: module_scale.max(1),
            quiet_zone,
        }
    }
}

impl QrEncoder for QrCodeEncoder {
    fn encode(&self, text: &str) -> Result<GrayImage, RenderError> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::H)
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        let modules = code.width() as u32;
        let colors = code.to_colors();
        let scale = self.module_scale;
        let border = self.quiet_zone;
        let side = (modules + 2 * border) * scale;

        Ok(GrayImage::from_fn(side, side, |x, y| {
            let (mx, my) = (x / scale, y / scale);
            if mx < border || my < border {
                return LIGHT;
            }
            let (mx, my) = (mx - border, my - border);
            if mx >= modules || my >= modules {
                return LIGHT;
            }
            match colors[(my * modules + mx) as usize] {
                Color::Dark => DARK,
                Color::Light => LIGHT,
            }
        }))
    }
}
