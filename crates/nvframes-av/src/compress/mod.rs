//! JPEG compression of planar 4:2:0 frames.
//!
//! A [`CompressorFactory`] is shared by every encode worker; each worker
//! creates its own stateful [`FrameCompressor`] at start and drops it when it
//! stops. Compressed output is returned as a [`CompressedImage`], which owns
//! its buffer and releases it exactly once when dropped.

mod image_jpeg;
mod turbojpeg;

pub use image_jpeg::{ImageJpegCompressor, ImageJpegFactory};
pub use turbojpeg::{TurboJpegCompressor, TurboJpegFactory, TurboJpegLibrary};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;
use std::str::FromStr;
use std::sync::Arc;

/// JPEG quality between 1 (worst) and 100 (best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct JpegQuality(u8);

impl JpegQuality {
    pub fn new(quality: u8) -> Result<Self> {
        if (1..=100).contains(&quality) {
            Ok(Self(quality))
        } else {
            Err(Error::InvalidInput(format!(
                "JPEG quality must be between 1 and 100, got {quality}"
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for JpegQuality {
    fn default() -> Self {
        Self(85)
    }
}

impl TryFrom<u8> for JpegQuality {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<JpegQuality> for u8 {
    fn from(value: JpegQuality) -> Self {
        value.0
    }
}

/// Frees buffers handed out by a native library.
///
/// # Safety
///
/// Implementors must accept exactly the pointers their library allocated.
pub unsafe trait NativeAllocator: Send + Sync {
    /// Release a buffer previously allocated by this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, len: usize);
}

enum Buffer {
    Owned(Vec<u8>),
    Native {
        ptr: NonNull<u8>,
        len: usize,
        allocator: Arc<dyn NativeAllocator>,
    },
}

/// A compressed JPEG image that owns its bytes.
///
/// The buffer is released exactly once, when the image is dropped. Moving the
/// image between pipeline stages moves ownership; it can never be aliased.
pub struct CompressedImage {
    buffer: Buffer,
}

// SAFETY: a native buffer is uniquely owned by this value and the allocator is
// Send + Sync.
unsafe impl Send for CompressedImage {}

impl CompressedImage {
    /// Wrap bytes allocated by Rust.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            buffer: Buffer::Owned(bytes),
        }
    }

    /// Take ownership of a natively allocated buffer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialised bytes allocated by `allocator`,
    /// and no other owner may release or access it.
    pub unsafe fn from_native(
        ptr: NonNull<u8>,
        len: usize,
        allocator: Arc<dyn NativeAllocator>,
    ) -> Self {
        Self {
            buffer: Buffer::Native {
                ptr,
                len,
                allocator,
            },
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.buffer {
            Buffer::Owned(bytes) => bytes,
            // SAFETY: guaranteed by the `from_native` contract.
            Buffer::Native { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for CompressedImage {
    fn drop(&mut self) {
        if let Buffer::Native {
            ptr,
            len,
            allocator,
        } = &self.buffer
        {
            // SAFETY: the buffer is released once, here, and never read again.
            unsafe { allocator.release(*ptr, *len) }
        }
    }
}

impl fmt::Debug for CompressedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.buffer {
            Buffer::Owned(_) => "owned",
            Buffer::Native { .. } => "native",
        };
        f.debug_struct("CompressedImage")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// A stateful JPEG compressor owned by a single encode worker.
pub trait FrameCompressor: Send {
    /// Compress one planar 4:2:0 frame.
    fn compress(&mut self, frame: &[u8], width: u32, height: u32) -> Result<CompressedImage>;
}

/// Creates one compressor per encode worker.
pub trait CompressorFactory: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn create(&self) -> Result<Box<dyn FrameCompressor>>;
}

/// Which compressor implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressorKind {
    /// libturbojpeg when it can be loaded, otherwise the pure Rust encoder.
    #[default]
    Auto,
    TurboJpeg,
    Image,
}

impl FromStr for CompressorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "turbojpeg" => Ok(Self::TurboJpeg),
            "image" => Ok(Self::Image),
            other => Err(Error::InvalidInput(format!("unknown compressor: {other}"))),
        }
    }
}

/// Build the compressor factory for a run.
///
/// An explicit `turbojpeg_path` must load; with `Auto` and no path the pure
/// Rust encoder is used when libturbojpeg is not installed.
pub fn open_compressor(
    kind: CompressorKind,
    quality: JpegQuality,
    turbojpeg_path: Option<&Path>,
) -> Result<Arc<dyn CompressorFactory>> {
    match kind {
        CompressorKind::TurboJpeg => {
            let library = TurboJpegLibrary::load(turbojpeg_path)?;
            Ok(Arc::new(TurboJpegFactory::new(Arc::new(library), quality)))
        }
        CompressorKind::Image => Ok(Arc::new(ImageJpegFactory::new(quality))),
        CompressorKind::Auto => match TurboJpegLibrary::load(turbojpeg_path) {
            Ok(library) => Ok(Arc::new(TurboJpegFactory::new(Arc::new(library), quality))),
            Err(_e) if turbojpeg_path.is_none() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("libturbojpeg unavailable, using pure Rust encoder: {}", _e);
                Ok(Arc::new(ImageJpegFactory::new(quality)))
            }
            Err(e) => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BoxAllocator {
        released: AtomicUsize,
    }

    unsafe impl NativeAllocator for BoxAllocator {
        unsafe fn release(&self, ptr: NonNull<u8>, len: usize) {
            let slice = std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len);
            drop(Box::from_raw(slice));
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_quality_bounds() {
        assert!(JpegQuality::new(0).is_err());
        assert!(JpegQuality::new(101).is_err());
        assert_eq!(JpegQuality::new(1).unwrap().get(), 1);
        assert_eq!(JpegQuality::new(100).unwrap().get(), 100);
        assert_eq!(JpegQuality::default().get(), 85);
    }

    #[test]
    fn test_native_buffer_released_once_on_drop() {
        let allocator = Arc::new(BoxAllocator {
            released: AtomicUsize::new(0),
        });
        let bytes: Box<[u8]> = vec![1u8, 2, 3].into_boxed_slice();
        let len = bytes.len();
        let ptr = NonNull::new(Box::into_raw(bytes) as *mut u8).unwrap();

        let image = unsafe { CompressedImage::from_native(ptr, len, allocator.clone()) };
        assert_eq!(image.as_bytes(), &[1, 2, 3]);

        // Moving transfers ownership without releasing
        let moved = image;
        assert_eq!(allocator.released.load(Ordering::SeqCst), 0);
        drop(moved);
        assert_eq!(allocator.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_owned_buffer() {
        let image = CompressedImage::from_vec(vec![0xFF, 0xD8]);
        assert_eq!(image.len(), 2);
        assert!(!image.is_empty());
        assert!(format!("{image:?}").contains("owned"));
    }

    #[test]
    fn test_explicit_bad_turbojpeg_path_fails() {
        let result = open_compressor(
            CompressorKind::Auto,
            JpegQuality::default(),
            Some(Path::new("/nonexistent/libturbojpeg.so")),
        );
        assert!(matches!(result, Err(Error::LibraryUnavailable { .. })));
    }

    #[test]
    fn test_image_compressor_selected_explicitly() {
        let factory = open_compressor(CompressorKind::Image, JpegQuality::default(), None).unwrap();
        assert_eq!(factory.name(), "image");
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("TurboJPEG".parse::<CompressorKind>().unwrap(), CompressorKind::TurboJpeg);
        assert!("nvjpeg".parse::<CompressorKind>().is_err());
    }
}
