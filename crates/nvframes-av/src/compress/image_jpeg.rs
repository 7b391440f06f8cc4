//! Pure Rust JPEG compression through the `image` crate.
//!
//! Used when libturbojpeg is not installed. Frames are converted from planar
//! full-range YUV 4:2:0 to RGB with the JFIF (BT.601) matrix, then encoded.

use super::{CompressedImage, CompressorFactory, FrameCompressor, JpegQuality};
use crate::frame::FrameGeometry;
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Creates [`ImageJpegCompressor`]s.
pub struct ImageJpegFactory {
    quality: JpegQuality,
}

impl ImageJpegFactory {
    pub fn new(quality: JpegQuality) -> Self {
        Self { quality }
    }
}

impl CompressorFactory for ImageJpegFactory {
    fn name(&self) -> &'static str {
        "image"
    }

    fn create(&self) -> Result<Box<dyn FrameCompressor>> {
        Ok(Box::new(ImageJpegCompressor::new(self.quality)))
    }
}

/// Compressor keeping a reusable RGB scratch buffer.
pub struct ImageJpegCompressor {
    quality: JpegQuality,
    rgb: Vec<u8>,
}

impl ImageJpegCompressor {
    pub fn new(quality: JpegQuality) -> Self {
        Self {
            quality,
            rgb: Vec::new(),
        }
    }
}

impl FrameCompressor for ImageJpegCompressor {
    fn compress(&mut self, frame: &[u8], width: u32, height: u32) -> Result<CompressedImage> {
        let geometry = FrameGeometry::new(width, height)?;
        if frame.len() < geometry.frame_len() {
            return Err(Error::InvalidInput(format!(
                "frame is {} bytes, expected {}",
                frame.len(),
                geometry.frame_len()
            )));
        }

        yuv420_to_rgb(frame, &geometry, &mut self.rgb);

        let mut out = Vec::with_capacity(geometry.luma_len() / 4);
        JpegEncoder::new_with_quality(&mut out, self.quality.get())
            .encode(&self.rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| Error::Compress(e.to_string()))?;
        Ok(CompressedImage::from_vec(out))
    }
}

fn yuv420_to_rgb(frame: &[u8], geometry: &FrameGeometry, rgb: &mut Vec<u8>) {
    let width = geometry.width as usize;
    let height = geometry.height as usize;
    let (chroma_width, _) = geometry.chroma_dims();
    let (luma, chroma) = frame.split_at(geometry.luma_len());
    let (cb_plane, cr_plane) = chroma.split_at(geometry.chroma_len());

    rgb.clear();
    rgb.reserve(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            let y = i32::from(luma[row * width + col]) << 16;
            let c = (row / 2) * chroma_width + col / 2;
            let cb = i32::from(cb_plane[c]) - 128;
            let cr = i32::from(cr_plane[c]) - 128;
            // 16.16 fixed point JFIF coefficients
            let r = (y + 91_881 * cr + 32_768) >> 16;
            let g = (y - 22_554 * cb - 46_802 * cr + 32_768) >> 16;
            let b = (y + 116_130 * cb + 32_768) >> 16;
            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }
}
