use appearance_common::TextureQuality;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("static image not found: {0}")]
    ImageNotFound(String),
    #[error("pixel data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// One 8-bit RGBA pixel, laid out exactly as in an RGBA8 byte buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Rgba8 = Rgba8::new(0, 0, 0, 0);
    pub const WHITE: Rgba8 = Rgba8::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Quantize a `[0, 1]` color, rounding to nearest.
    pub fn from_vec4(c: Vec4) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(q(c.x), q(c.y), q(c.z), q(c.w))
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(
            self.r as f32,
            self.g as f32,
            self.b as f32,
            self.a as f32,
        ) / 255.0
    }
}

/// SHA-256 over a raster's dimensions and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelDigest(pub [u8; 32]);

impl fmt::Display for PixelDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Row-major RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba8::TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(TextureError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: bytemuck::cast_slice(bytes).to_vec(),
        })
    }

    /// Callers guarantee `pixels.len() == width * height`.
    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<Rgba8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decode any supported image file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let image = image::ImageReader::open(path.as_ref())?
            .with_guessed_format()?
            .decode()?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_rgba_bytes(width, height, image.as_raw())
    }

    /// Encode as an image file; the format follows the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TextureError> {
        let bytes = self.as_bytes().to_vec();
        let actual = bytes.len();
        let image = image::RgbaImage::from_raw(self.width, self.height, bytes).ok_or(
            TextureError::SizeMismatch {
                expected: self.width as usize * self.height as usize * 4,
                actual,
            },
        )?;
        image.save(path.as_ref())?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba8) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = color;
        }
    }

    /// Nearest-neighbour sample for destination pixel `(x, y)` of a
    /// `dst_width` x `dst_height` target.
    pub fn sample_nearest(&self, x: u32, y: u32, dst_width: u32, dst_height: u32) -> Rgba8 {
        if self.width == 0 || self.height == 0 || dst_width == 0 || dst_height == 0 {
            return Rgba8::TRANSPARENT;
        }
        let sx = (x as u64 * self.width as u64 / dst_width as u64) as u32;
        let sy = (y as u64 * self.height as u64 / dst_height as u64) as u32;
        self.pixel(sx.min(self.width - 1), sy.min(self.height - 1))
            .unwrap_or(Rgba8::TRANSPARENT)
    }

    pub fn digest(&self) -> PixelDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.as_bytes());
        PixelDigest(hasher.finalize().into())
    }
}

/// Wearable-supplied texture data for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTexture {
    pub raster: Raster,
    pub quality: TextureQuality,
}

impl LocalTexture {
    pub fn new(raster: Raster, quality: TextureQuality) -> Self {
        Self { raster, quality }
    }
}
