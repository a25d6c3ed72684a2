// SPDX-License-Identifier: MIT OR Apache-2.0
//! CPU-side pixel data held by texture and cubemap nodes.
//!
//! Pixels are packed R8G8B8A8, one `u32` per texel with red in the lowest
//! byte, rows stored bottom-up the way the backend uploads them.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

/// Number of faces in a cubemap
pub const CUBE_FACE_COUNT: usize = 6;

/// Errors raised while decoding or validating pixel data
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// Image codec failure
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// Pixel buffer length does not match the declared size
    #[error("Pixel buffer holds {actual} texels, expected {expected}")]
    SizeMismatch {
        /// Texels implied by width and height
        expected: usize,
        /// Texels actually supplied
        actual: usize,
    },

    /// Cubemap faces are not all square images of one size
    #[error("Cubemap faces must be {CUBE_FACE_COUNT} square images of equal size")]
    InvalidCubeMap,
}

/// A 2D RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Packed R8G8B8A8 texels
    pub pixels: Vec<u32>,
}

impl ImageData {
    /// Create an image, validating the buffer length
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(TextureError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create an image filled with a single packed color
    pub fn solid(width: u32, height: u32, rgba: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![rgba; width as usize * height as usize],
        }
    }

    /// Decode any format the `image` crate understands
    pub fn decode(bytes: &[u8]) -> Result<Self, TextureError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self::from_rgba(&rgba))
    }

    /// Encode as PNG
    pub fn encode_png(&self) -> Result<Vec<u8>, TextureError> {
        let expected = self.width as usize * self.height as usize;
        let image = RgbaImage::from_raw(self.width, self.height, self.to_rgba_bytes()).ok_or(
            TextureError::SizeMismatch {
                expected,
                actual: self.pixels.len(),
            },
        )?;
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Mirror the rows in place
    pub fn flip_vertical(&mut self) {
        if self.width == 0 {
            return;
        }
        self.pixels = self
            .pixels
            .rchunks_exact(self.width as usize)
            .flatten()
            .copied()
            .collect();
    }

    /// Size as `[width, height]`
    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    /// Raw bytes in R, G, B, A order
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_le_bytes()).collect()
    }

    fn from_rgba(image: &RgbaImage) -> Self {
        let pixels = image
            .as_raw()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }
}

/// Six square faces of a cubemap, ordered +X, -X, +Y, -Y, +Z, -Z
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeMapData {
    faces: Vec<ImageData>,
}

impl CubeMapData {
    /// Create a cubemap, validating face count and dimensions
    pub fn new(faces: Vec<ImageData>) -> Result<Self, TextureError> {
        let Some(first) = faces.first() else {
            return Err(TextureError::InvalidCubeMap);
        };
        let size = first.width;
        let valid = faces.len() == CUBE_FACE_COUNT
            && faces.iter().all(|f| f.width == size && f.height == size);
        if !valid {
            return Err(TextureError::InvalidCubeMap);
        }
        Ok(Self { faces })
    }

    /// Create a cubemap with every face filled with one color
    pub fn solid(size: u32, rgba: u32) -> Self {
        Self {
            faces: vec![ImageData::solid(size, size, rgba); CUBE_FACE_COUNT],
        }
    }

    /// Edge length of every face
    pub fn size(&self) -> u32 {
        self.faces[0].width
    }

    /// The faces in +X, -X, +Y, -Y, +Z, -Z order
    pub fn faces(&self) -> &[ImageData] {
        &self.faces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_encoding_preserves_texels() {
        let image = ImageData::new(2, 2, vec![0xff00_00ff, 0xff00_ff00, 0xffff_0000, 0x8012_3456])
            .unwrap();
        let png = image.encode_png().unwrap();
        let decoded = ImageData::decode(&png).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_flip_vertical_swaps_rows() {
        let mut image = ImageData::new(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        image.flip_vertical();
        assert_eq!(image.pixels, vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn test_rejects_mismatched_buffers() {
        assert!(matches!(
            ImageData::new(4, 4, vec![0; 3]),
            Err(TextureError::SizeMismatch { expected: 16, actual: 3 })
        ));
        let faces = vec![ImageData::solid(2, 2, 0); 5];
        assert!(matches!(CubeMapData::new(faces), Err(TextureError::InvalidCubeMap)));
        let mut faces = vec![ImageData::solid(2, 2, 0); 6];
        faces[3] = ImageData::solid(2, 1, 0);
        assert!(CubeMapData::new(faces).is_err());
    }

    #[test]
    fn test_cube_map_keeps_faces_in_order() {
        let faces = (0..6).map(|i| ImageData::solid(1, 1, i)).collect();
        let cube = CubeMapData::new(faces).unwrap();
        assert_eq!(cube.size(), 1);
        let first_texels: Vec<u32> = cube.faces().iter().map(|f| f.pixels[0]).collect();
        assert_eq!(first_texels, vec![0, 1, 2, 3, 4, 5]);
    }
}
