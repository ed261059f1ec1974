//! Logo overlay for generated images.
//!
//! The logo is pasted flush against the bottom-right corner of the base
//! image, blended over it by its alpha channel. Logos bigger than the
//! base stay aligned to that corner and lose whatever falls off the top/left.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

/// How the logo is sized before it is pasted
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogoMode {
    /// Paste the logo at its native resolution
    #[default]
    FixedSize,
    /// Shrink the logo to fit within a fifth of the base width and height
    ScaledToFifth,
}

impl FromStr for LogoMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed-size" | "fixed" => Ok(Self::FixedSize),
            "scaled-to-fifth" | "scaled" => Ok(Self::ScaledToFifth),
            other => Err(format!(
                "Unknown logo mode '{other}', expected fixed-size or scaled-to-fifth"
            )),
        }
    }
}

impl fmt::Display for LogoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedSize => write!(f, "fixed-size"),
            Self::ScaledToFifth => write!(f, "scaled-to-fifth"),
        }
    }
}

/// Errors from decoding, compositing or encoding images.
#[derive(Debug)]
pub enum CompositeError {
    /// An input could not be parsed as an image
    Decode(String),
    /// The logo has no alpha channel to use as a paste mask
    MissingAlpha,
    /// The result could not be encoded
    Encode(String),
    /// An input could not be read
    Io(String),
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "Failed to decode image: {err}"),
            Self::MissingAlpha => write!(f, "Logo image has no alpha channel"),
            Self::Encode(err) => write!(f, "Failed to encode image: {err}"),
            Self::Io(err) => write!(f, "Failed to read image: {err}"),
        }
    }
}

impl std::error::Error for CompositeError {}

fn decode(bytes: &[u8], what: &str) -> Result<DynamicImage, CompositeError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| CompositeError::Decode(format!("{what}: {err}")))?;
    reader
        .decode()
        .map_err(|err| CompositeError::Decode(format!("{what}: {err}")))
}

/// Top-left corner of a logo placed flush against the base's bottom-right
/// corner. Negative when the logo is larger than the base on that axis.
pub fn logo_anchor(base: (u32, u32), logo: (u32, u32)) -> (i64, i64) {
    (
        i64::from(base.0) - i64::from(logo.0),
        i64::from(base.1) - i64::from(logo.1),
    )
}

/// Applies the sizing policy for `mode`. Scaling only ever shrinks.
pub fn fit_logo(logo: DynamicImage, base_width: u32, base_height: u32, mode: LogoMode) -> DynamicImage {
    match mode {
        LogoMode::FixedSize => logo,
        LogoMode::ScaledToFifth => {
            let max_width = (base_width / 5).max(1);
            let max_height = (base_height / 5).max(1);
            if logo.width() <= max_width && logo.height() <= max_height {
                logo
            } else {
                logo.resize(max_width, max_height, FilterType::Lanczos3)
            }
        }
    }
}

/// Source-over blend of one logo pixel onto one base pixel. Opaque logo
/// pixels replace the base exactly.
fn blend_over(target: &mut Rgba<u8>, source: Rgba<u8>) {
    let alpha = u32::from(source[3]);
    let inverse = 255 - alpha;
    let mix = |top: u8, bottom: u8| {
        let mixed = (u32::from(top) * alpha + u32::from(bottom) * inverse + 127) / 255;
        u8::try_from(mixed).unwrap_or(u8::MAX)
    };
    let out_alpha = alpha + (u32::from(target[3]) * inverse + 127) / 255;
    *target = Rgba([
        mix(source[0], target[0]),
        mix(source[1], target[1]),
        mix(source[2], target[2]),
        u8::try_from(out_alpha).unwrap_or(u8::MAX),
    ]);
}

/// Pastes `logo` onto `base` in place, blending partly transparent logo
/// pixels over what is underneath. Fully transparent pixels leave the base
/// alone, and anything landing outside the base is dropped.
pub fn paste_logo(base: &mut RgbaImage, logo: &RgbaImage) {
    let (anchor_x, anchor_y) = logo_anchor(base.dimensions(), logo.dimensions());
    for (logo_x, logo_y, pixel) in logo.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        let (Ok(x), Ok(y)) = (
            u32::try_from(anchor_x + i64::from(logo_x)),
            u32::try_from(anchor_y + i64::from(logo_y)),
        ) else {
            continue;
        };
        if let Some(target) = base.get_pixel_mut_checked(x, y) {
            blend_over(target, *pixel);
        }
    }
}

/// Composites already-decoded images.
pub fn composite_images(
    base: &DynamicImage,
    logo: &DynamicImage,
    mode: LogoMode,
) -> Result<RgbaImage, CompositeError> {
    if !logo.color().has_alpha() {
        return Err(CompositeError::MissingAlpha);
    }
    let mut result = base.to_rgba8();
    let logo = fit_logo(logo.clone(), base.width(), base.height(), mode).to_rgba8();
    debug!(
        "Compositing {}x{} logo onto {}x{} image ({mode})",
        logo.width(),
        logo.height(),
        result.width(),
        result.height()
    );
    paste_logo(&mut result, &logo);
    Ok(result)
}

/// Decodes both inputs, pastes the logo and re-encodes the result as PNG.
pub fn composite(
    base_bytes: &[u8],
    logo_bytes: &[u8],
    mode: LogoMode,
) -> Result<Vec<u8>, CompositeError> {
    let base = decode(base_bytes, "base image")?;
    let logo = decode(logo_bytes, "logo")?;
    let result = composite_images(&base, &logo, mode)?;

    let mut output = Vec::new();
    DynamicImage::ImageRgba8(result)
        .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|err| CompositeError::Encode(err.to_string()))?;
    Ok(output)
}

/// The logo file, read once and shared read-only between requests.
///
/// Only the encoded bytes are kept; every composite decodes its own copy.
#[derive(Clone, Debug)]
pub struct LogoAsset {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl LogoAsset {
    /// Validates that `bytes` is an image with an alpha channel.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CompositeError> {
        let logo = decode(&bytes, "logo")?;
        if !logo.color().has_alpha() {
            return Err(CompositeError::MissingAlpha);
        }
        Ok(Self {
            bytes: Arc::from(bytes),
            width: logo.width(),
            height: logo.height(),
        })
    }

    /// Reads and validates the logo file at `path`.
    pub async fn load(path: &Path) -> Result<Self, CompositeError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| CompositeError::Io(format!("{}: {err}", path.display())))?;
        Self::from_bytes(bytes)
    }

    /// The encoded logo
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Native (width, height) of the logo
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A logo plus the sizing policy it is applied with.
#[derive(Clone, Debug)]
pub struct LogoOverlay {
    logo: LogoAsset,
    mode: LogoMode,
}

impl LogoOverlay {
    /// Creates a new overlay
    pub fn new(logo: LogoAsset, mode: LogoMode) -> Self {
        Self { logo, mode }
    }

    /// The sizing policy
    pub fn mode(&self) -> LogoMode {
        self.mode
    }

    /// Composites the logo onto the encoded `base` image, returning PNG bytes.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>, CompositeError> {
        composite(base, self.logo.bytes(), self.mode)
    }
}
