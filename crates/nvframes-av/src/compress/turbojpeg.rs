//! libturbojpeg bindings loaded at runtime.
//!
//! The library is opened with `libloading` so a user-supplied path can
//! override the system copy. Frames are compressed straight from planar YUV
//! with `tjCompressFromYUV`; the output buffer is allocated by the library
//! and handed to a [`CompressedImage`] that frees it with `tjFree`.

use super::{CompressedImage, CompressorFactory, FrameCompressor, JpegQuality, NativeAllocator};
use crate::{Error, Result};
use libloading::Library;
use std::ffi::{c_char, c_int, c_uchar, c_ulong, c_void, CStr};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

const TJSAMP_420: c_int = 2;
const TJERR_WARNING: c_int = 0;
const ROW_PADDING: c_int = 1;

#[cfg(target_os = "windows")]
const DEFAULT_NAMES: &[&str] = &["turbojpeg.dll"];
#[cfg(target_os = "macos")]
const DEFAULT_NAMES: &[&str] = &["libturbojpeg.dylib", "libturbojpeg.0.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_NAMES: &[&str] = &["libturbojpeg.so.0", "libturbojpeg.so"];

type InitCompressFn = unsafe extern "C" fn() -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type CompressFromYuvFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_uchar,
    c_int,
    c_int,
    c_int,
    c_int,
    *mut *mut c_uchar,
    *mut c_ulong,
    c_int,
    c_int,
) -> c_int;
type FreeFn = unsafe extern "C" fn(*mut c_uchar);
type GetErrorStrFn = unsafe extern "C" fn(*mut c_void) -> *mut c_char;
type GetErrorCodeFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// A loaded libturbojpeg with the entry points nvframes needs.
pub struct TurboJpegLibrary {
    init_compress: InitCompressFn,
    destroy: DestroyFn,
    compress_from_yuv: CompressFromYuvFn,
    free: FreeFn,
    get_error_str: GetErrorStrFn,
    get_error_code: GetErrorCodeFn,
    // Keeps the function pointers above valid.
    _library: Library,
}

impl TurboJpegLibrary {
    /// Load from `path`, or from the platform's default library names.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let library = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::library_unavailable(
                        "turbojpeg",
                        format!("{} is not a file", path.display()),
                    ));
                }
                // SAFETY: loading libturbojpeg runs no untrusted initialisers.
                unsafe { Library::new(path) }
                    .map_err(|e| Error::library_unavailable("turbojpeg", e.to_string()))?
            }
            None => load_default()?,
        };

        // SAFETY: the symbol types match the libturbojpeg 2.x C API.
        unsafe {
            Ok(Self {
                init_compress: symbol(&library, b"tjInitCompress\0")?,
                destroy: symbol(&library, b"tjDestroy\0")?,
                compress_from_yuv: symbol(&library, b"tjCompressFromYUV\0")?,
                free: symbol(&library, b"tjFree\0")?,
                get_error_str: symbol(&library, b"tjGetErrorStr2\0")?,
                get_error_code: symbol(&library, b"tjGetErrorCode\0")?,
                _library: library,
            })
        }
    }

    fn error_message(&self, handle: *mut c_void) -> String {
        // SAFETY: tjGetErrorStr2 returns a NUL-terminated static or
        // per-handle string.
        unsafe {
            let msg = (self.get_error_str)(handle);
            if msg.is_null() {
                "unknown turbojpeg error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }
}

fn load_default() -> Result<Library> {
    let mut last_error = String::from("no candidate names");
    for name in DEFAULT_NAMES {
        // SAFETY: as in `TurboJpegLibrary::load`.
        match unsafe { Library::new(name) } {
            Ok(library) => return Ok(library),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(Error::library_unavailable("turbojpeg", last_error))
}

unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    library.get::<T>(name).map(|s| *s).map_err(|e| {
        Error::library_unavailable(
            "turbojpeg",
            format!("missing symbol {}: {e}", String::from_utf8_lossy(name)),
        )
    })
}

// SAFETY: buffers handed to `release` come from tjCompressFromYUV on this
// library.
unsafe impl NativeAllocator for TurboJpegLibrary {
    unsafe fn release(&self, ptr: NonNull<u8>, _len: usize) {
        (self.free)(ptr.as_ptr());
    }
}

/// Creates one turbojpeg compressor handle per encode worker.
pub struct TurboJpegFactory {
    library: Arc<TurboJpegLibrary>,
    quality: JpegQuality,
}

impl TurboJpegFactory {
    pub fn new(library: Arc<TurboJpegLibrary>, quality: JpegQuality) -> Self {
        Self { library, quality }
    }
}

impl CompressorFactory for TurboJpegFactory {
    fn name(&self) -> &'static str {
        "turbojpeg"
    }

    fn create(&self) -> Result<Box<dyn FrameCompressor>> {
        Ok(Box::new(TurboJpegCompressor::new(
            Arc::clone(&self.library),
            self.quality,
        )?))
    }
}

/// A `tjhandle` owned by one encode worker; destroyed on drop.
pub struct TurboJpegCompressor {
    library: Arc<TurboJpegLibrary>,
    handle: NonNull<c_void>,
    quality: JpegQuality,
}

// SAFETY: a tjhandle may move between threads as long as it is used by one
// thread at a time, which `&mut self` guarantees.
unsafe impl Send for TurboJpegCompressor {}

impl TurboJpegCompressor {
    pub fn new(library: Arc<TurboJpegLibrary>, quality: JpegQuality) -> Result<Self> {
        // SAFETY: tjInitCompress has no preconditions.
        let handle = unsafe { (library.init_compress)() };
        let handle = NonNull::new(handle).ok_or_else(|| {
            Error::Compress(format!(
                "tjInitCompress failed: {}",
                library.error_message(ptr::null_mut())
            ))
        })?;
        Ok(Self {
            library,
            handle,
            quality,
        })
    }
}

impl FrameCompressor for TurboJpegCompressor {
    fn compress(&mut self, frame: &[u8], width: u32, height: u32) -> Result<CompressedImage> {
        let width_c = c_int::try_from(width)
            .map_err(|_| Error::InvalidInput(format!("width {width} too large")))?;
        let height_c = c_int::try_from(height)
            .map_err(|_| Error::InvalidInput(format!("height {height} too large")))?;
        let expected = crate::FrameGeometry::new(width, height)?.frame_len();
        if frame.len() < expected {
            return Err(Error::InvalidInput(format!(
                "frame is {} bytes, expected {expected}",
                frame.len()
            )));
        }

        let mut jpeg: *mut c_uchar = ptr::null_mut();
        let mut size: c_ulong = 0;
        // SAFETY: `frame` holds a full 4:2:0 image for these dimensions and
        // the output pointers are valid for writes.
        let status = unsafe {
            (self.library.compress_from_yuv)(
                self.handle.as_ptr(),
                frame.as_ptr(),
                width_c,
                ROW_PADDING,
                height_c,
                TJSAMP_420,
                &mut jpeg,
                &mut size,
                c_int::from(self.quality.get()),
                0,
            )
        };

        if status != 0 {
            // SAFETY: the handle is valid.
            let code = unsafe { (self.library.get_error_code)(self.handle.as_ptr()) };
            let message = self.library.error_message(self.handle.as_ptr());
            if code == TJERR_WARNING && !jpeg.is_null() && size > 0 {
                #[cfg(feature = "tracing")]
                tracing::warn!("turbojpeg warning: {}", message);
            } else {
                if let Some(buf) = NonNull::new(jpeg) {
                    // SAFETY: allocated by this library and not yet owned.
                    unsafe { self.library.release(buf, 0) };
                }
                return Err(Error::Compress(message));
            }
        }

        let buf = NonNull::new(jpeg)
            .ok_or_else(|| Error::Compress("turbojpeg returned no buffer".to_string()))?;
        let allocator: Arc<dyn NativeAllocator> = self.library.clone();
        // SAFETY: `buf` holds `size` bytes allocated by the library and is
        // owned by nothing else.
        Ok(unsafe { CompressedImage::from_native(buf, size as usize, allocator) })
    }
}

impl Drop for TurboJpegCompressor {
    fn drop(&mut self) {
        // SAFETY: the handle came from tjInitCompress and is destroyed once.
        unsafe {
            (self.library.destroy)(self.handle.as_ptr());
        }
    }
}
