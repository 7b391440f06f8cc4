//! Planar 4:2:0 frame geometry.

use crate::{Error, Result};

/// Dimensions of a decoded frame in planar YUV 4:2:0 layout.
///
/// The luma plane is `width x height`; each chroma plane is half that size in
/// both directions, rounded up for odd dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// Create a geometry, rejecting empty frames.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Bytes in the luma plane.
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Width and height of one chroma plane.
    pub fn chroma_dims(&self) -> (usize, usize) {
        (
            (self.width as usize).div_ceil(2),
            (self.height as usize).div_ceil(2),
        )
    }

    /// Bytes in one chroma plane.
    pub fn chroma_len(&self) -> usize {
        let (w, h) = self.chroma_dims();
        w * h
    }

    /// Bytes in a full frame: `width * height * 3 / 2` for even dimensions.
    pub fn frame_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_even() {
        let g = FrameGeometry::new(1920, 1080).unwrap();
        assert_eq!(g.frame_len(), 1920 * 1080 * 3 / 2);
    }

    #[test]
    fn test_frame_len_odd_rounds_chroma_up() {
        let g = FrameGeometry::new(5, 3).unwrap();
        assert_eq!(g.chroma_dims(), (3, 2));
        assert_eq!(g.frame_len(), 15 + 2 * 6);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(FrameGeometry::new(0, 10).is_err());
        assert!(FrameGeometry::new(10, 0).is_err());
    }
}
