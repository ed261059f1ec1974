//! QR codes for sharing generated image links.

use std::fmt;
use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

/// Errors returned when rendering a QR code.
#[derive(Debug)]
pub enum QrError {
    /// The data doesn't fit in a QR code
    Encode(qrcode::types::QrError),
    /// PNG encoding failed
    Image(image::ImageError),
}

impl fmt::Display for QrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "QR encode error: {err}"),
            Self::Image(err) => write!(f, "QR image error: {err}"),
        }
    }
}

impl std::error::Error for QrError {}

/// Renders `data` as a black on white QR code.
///
/// Each module is `box_size` pixels square and the code is surrounded by a
/// quiet zone `border` modules wide.
pub fn render_qr(data: &str, box_size: u32, border: u32) -> Result<GrayImage, QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(QrError::Encode)?;
    let module_count = code.width() as u32;
    let box_size = box_size.max(1);
    let img_size = (module_count + border * 2) * box_size;

    let mut img = GrayImage::from_pixel(img_size, img_size, Luma([255u8]));
    for (i, color) in code.to_colors().iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let x = (i as u32 % module_count + border) * box_size;
        let y = (i as u32 / module_count + border) * box_size;
        for dx in 0..box_size {
            for dy in 0..box_size {
                img.put_pixel(x + dx, y + dy, Luma([0u8]));
            }
        }
    }
    Ok(img)
}

/// Renders `data` as a QR code and encodes it as PNG.
pub fn render_qr_png(data: &str, box_size: u32, border: u32) -> Result<Vec<u8>, QrError> {
    let img = render_qr(data, box_size, border)?;
    let mut out = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(QrError::Image)?;
    Ok(out)
}
