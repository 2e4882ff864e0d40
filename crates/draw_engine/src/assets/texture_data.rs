//! Decoded RGBA8 pixels ready for texture upload

use std::path::Path;
use crate::assets::AssetError;

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Tightly packed RGBA8 pixels with their dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Row-major RGBA8 pixels, `width * 4` bytes per row
    pub pixels: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl TextureData {
    /// Wrap already decoded pixels, checking the byte count against the dimensions
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, AssetError> {
        let expected = expected_byte_count(width, height);
        if width == 0 || height == 0 {
            return Err(AssetError::InvalidData(format!("empty texture {width}x{height}")));
        }
        if pixels.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "{width}x{height} texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self { pixels, width, height })
    }

    /// Decode an image file and convert it to RGBA8
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();
        log::debug!("Loading texture from: {:?}", path_ref);

        let bytes = std::fs::read(path_ref)?;
        let texture = Self::from_bytes(&bytes)?;

        log::info!("Loaded texture {}x{} from {:?}", texture.width, texture.height, path_ref);
        Ok(texture)
    }

    /// Decode an in-memory encoded image (PNG) and convert it to RGBA8
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to decode texture: {}", e)))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();
        Self::new(width, height, rgba_img.into_raw())
    }

    /// Single-color texture, handy for defaults and tests
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            pixels: color.repeat(pixel_count),
            width,
            height,
        }
    }

    /// Size of the pixel payload in bytes
    pub fn byte_count(&self) -> usize {
        self.pixels.len()
    }

    /// Bytes in one tightly packed row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Whether the payload length matches the dimensions
    pub fn is_consistent(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == expected_byte_count(self.width, self.height)
    }
}

fn expected_byte_count(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
        let img = image::RgbaImage::from_raw(width, height, pixels.to_vec()).unwrap();
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_solid_color_texture() {
        let tex = TextureData::solid_color(4, 2, [255, 0, 0, 255]);
        assert_eq!(tex.byte_count(), 4 * 2 * 4);
        assert_eq!(tex.row_bytes(), 16);
        assert_eq!(&tex.pixels[0..4], &[255, 0, 0, 255]);
        assert!(tex.is_consistent());
    }

    #[test]
    fn test_new_rejects_mismatched_byte_count() {
        assert!(matches!(
            TextureData::new(2, 2, vec![0; 15]),
            Err(AssetError::InvalidData(_))
        ));
        assert!(matches!(TextureData::new(0, 4, Vec::new()), Err(AssetError::InvalidData(_))));
        assert!(TextureData::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_decodes_png_to_rgba8() {
        let pixels: Vec<u8> = (0..2 * 3 * 4).map(|i| i as u8 * 10).collect();
        let png = encode_png(2, 3, &pixels);

        let tex = TextureData::from_bytes(&png).unwrap();
        assert_eq!((tex.width, tex.height), (2, 3));
        assert_eq!(tex.pixels, pixels);
    }

    #[test]
    fn test_decode_failure_is_an_error() {
        assert!(matches!(
            TextureData::from_bytes(b"not an image"),
            Err(AssetError::LoadFailed(_))
        ));
        assert!(matches!(
            TextureData::from_file("definitely/missing/texture.png"),
            Err(AssetError::IoError(_))
        ));
    }
}
