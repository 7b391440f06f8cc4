//! Stream colour metadata and range conversion.
//!
//! Streams frequently leave colour matrix and range unspecified. Those fall
//! back to BT.601 and limited ("MPEG") range, the most widespread broadcast
//! values. JPEG stores full-range samples, so limited-range frames are
//! expanded before compression.

use serde::{Deserialize, Serialize};

/// Colour matrix of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    #[default]
    Unspecified,
    Bt601,
    Bt709,
}

/// Sample range of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    #[default]
    Unspecified,
    /// 16-235 luma, 16-240 chroma.
    Limited,
    /// 0-255.
    Full,
}

/// Colour metadata as reported by a stream, possibly unspecified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorParams {
    pub space: ColorSpace,
    pub range: ColorRange,
}

impl ColorParams {
    pub fn new(space: ColorSpace, range: ColorRange) -> Self {
        Self { space, range }
    }

    /// Replace unspecified values with BT.601 and limited range.
    #[must_use]
    pub fn resolve(self) -> Self {
        Self {
            space: match self.space {
                ColorSpace::Unspecified => ColorSpace::Bt601,
                other => other,
            },
            range: match self.range {
                ColorRange::Unspecified => ColorRange::Limited,
                other => other,
            },
        }
    }

    /// Whether samples must be expanded to full range before compression.
    pub fn needs_range_expansion(&self) -> bool {
        self.resolve().range == ColorRange::Limited
    }
}

/// Lookup tables mapping limited-range samples to full range.
pub struct RangeExpander {
    luma: [u8; 256],
    chroma: [u8; 256],
}

impl RangeExpander {
    pub fn new() -> Self {
        let mut luma = [0u8; 256];
        let mut chroma = [0u8; 256];
        for v in 0..256usize {
            let y = (v as f32 - 16.0) * 255.0 / 219.0;
            luma[v] = y.round().clamp(0.0, 255.0) as u8;
            let c = (v as f32 - 128.0) * 255.0 / 224.0 + 128.0;
            chroma[v] = c.round().clamp(0.0, 255.0) as u8;
        }
        Self { luma, chroma }
    }

    /// Expand a planar 4:2:0 frame in place given its luma plane length.
    pub fn expand_frame(&self, frame: &mut [u8], luma_len: usize) {
        let (luma, chroma) = frame.split_at_mut(luma_len.min(frame.len()));
        for sample in luma.iter_mut() {
            *sample = self.luma[*sample as usize];
        }
        for sample in chroma.iter_mut() {
            *sample = self.chroma[*sample as usize];
        }
    }
}

impl Default for RangeExpander {
    fn default() -> Self {
        Self::new()
    }
}
