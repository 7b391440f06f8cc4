//! Hardware decoding through FFmpeg with a CUDA device context.
//!
//! Packets are demuxed with libavformat and decoded on the selected GPU.
//! Decoded surfaces stay in device memory until a frame survives sampling;
//! only then is it transferred to the host and converted to planar
//! full-range YUV 4:2:0 with swscale.

use super::{Decoded, FrameSource};
use crate::color::{ColorParams, ColorRange, ColorSpace};
use crate::frame::FrameGeometry;
use crate::{Error, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::ffi;
use ffmpeg::format::Pixel;
use ffmpeg::frame::Video as VideoFrame;
use ffmpeg::software::scaling::{Context as Scaler, Flags as ScalerFlags};
use std::ffi::CString;
use std::path::Path;
use std::ptr;
use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() -> Result<()> {
    let mut result = Ok(());
    FFMPEG_INIT.call_once(|| {
        result = ffmpeg::init().map_err(Error::from);
    });
    result
}

/// CUDA-accelerated decoder for any container FFmpeg can demux.
pub struct FfmpegSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    geometry: FrameGeometry,
    color: ColorParams,
    scaler: Option<(Pixel, Scaler)>,
    eof_sent: bool,
}

impl FfmpegSource {
    /// Open `path` and bind its best video stream to CUDA device `device`.
    pub fn open(path: &Path, device: usize) -> Result<Self> {
        init_ffmpeg()?;

        if !path.exists() {
            return Err(Error::file_not_found(path));
        }
        let input = ffmpeg::format::input(path)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| Error::Decode(format!("no video stream in {}", path.display())))?;
        let stream_index = stream.index();

        let mut context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        attach_cuda_device(&mut context, device)?;
        let decoder = context.decoder().video()?;

        let geometry = FrameGeometry::new(decoder.width(), decoder.height())
            .map_err(|e| Error::Decode(e.to_string()))?;
        let color = ColorParams::new(
            map_space(decoder.color_space()),
            map_range(decoder.color_range()),
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Opened {:?} on cuda:{}: {}x{}, {:?}",
            path,
            device,
            geometry.width,
            geometry.height,
            color
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            geometry,
            color,
            scaler: None,
            eof_sent: false,
        })
    }

    fn receive(&mut self) -> Result<Option<VideoFrame>> {
        let mut frame = VideoFrame::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(ffmpeg::Error::Other { errno }) if errno == libc::EAGAIN => Ok(None),
            Err(e) => Err(Error::Decode(e.to_string())),
        }
    }

    fn scaler_for(&mut self, format: Pixel, color: &ColorParams) -> Result<&mut Scaler> {
        let stale = !matches!(&self.scaler, Some((f, _)) if *f == format);
        if stale {
            let mut scaler = Scaler::get(
                format,
                self.geometry.width,
                self.geometry.height,
                Pixel::YUV420P,
                self.geometry.width,
                self.geometry.height,
                ScalerFlags::BILINEAR,
            )
            .map_err(|e| Error::Conversion(e.to_string()))?;
            set_colorspace_details(&mut scaler, color);
            self.scaler = Some((format, scaler));
        }
        match self.scaler.as_mut() {
            Some((_, scaler)) => Ok(scaler),
            None => Err(Error::Conversion("scaler unavailable".to_string())),
        }
    }
}

fn attach_cuda_device(context: &mut ffmpeg::codec::context::Context, device: usize) -> Result<()> {
    let name = CString::new(device.to_string())
        .map_err(|e| Error::InvalidInput(e.to_string()))?;
    // SAFETY: `hw` is written by av_hwdevice_ctx_create on success and the
    // codec context takes its own reference before ours is released.
    unsafe {
        let mut hw: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = ffi::av_hwdevice_ctx_create(
            &mut hw,
            ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
            name.as_ptr(),
            ptr::null_mut(),
            0,
        );
        if ret < 0 || hw.is_null() {
            return Err(Error::library_unavailable(
                "cuda",
                format!("cannot open CUDA device {device} (error {ret})"),
            ));
        }
        (*context.as_mut_ptr()).hw_device_ctx = ffi::av_buffer_ref(hw);
        ffi::av_buffer_unref(&mut hw);
    }
    Ok(())
}

fn set_colorspace_details(scaler: &mut Scaler, color: &ColorParams) {
    let resolved = color.resolve();
    let src_matrix = match resolved.space {
        ColorSpace::Bt709 => ffi::SWS_CS_ITU709,
        _ => ffi::SWS_CS_ITU601,
    };
    let src_full = i32::from(resolved.range == ColorRange::Full);
    // SAFETY: the scaler pointer is valid for the lifetime of `scaler` and
    // sws_getCoefficients returns static tables.
    unsafe {
        ffi::sws_setColorspaceDetails(
            scaler.as_mut_ptr(),
            ffi::sws_getCoefficients(src_matrix as i32),
            src_full,
            ffi::sws_getCoefficients(ffi::SWS_CS_ITU601 as i32),
            1,
            0,
            1 << 16,
            1 << 16,
        );
    }
}

fn map_space(space: ffmpeg::color::Space) -> ColorSpace {
    use ffmpeg::color::Space;
    match space {
        Space::BT709 => ColorSpace::Bt709,
        Space::BT470BG | Space::SMPTE170M => ColorSpace::Bt601,
        _ => ColorSpace::Unspecified,
    }
}

fn map_range(range: ffmpeg::color::Range) -> ColorRange {
    use ffmpeg::color::Range;
    match range {
        Range::MPEG => ColorRange::Limited,
        Range::JPEG => ColorRange::Full,
        _ => ColorRange::Unspecified,
    }
}

impl FrameSource for FfmpegSource {
    type Surface = VideoFrame;

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn color(&self) -> ColorParams {
        self.color
    }

    fn decode_next(&mut self) -> Result<Decoded<VideoFrame>> {
        if let Some(frame) = self.receive()? {
            return Ok(Decoded::Frame(frame));
        }
        if self.eof_sent {
            return Ok(Decoded::EndOfStream);
        }

        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                self.decoder.send_eof()?;
                self.eof_sent = true;
                return Ok(Decoded::EndOfStream);
            }
            Err(e) => return Err(Error::Decode(e.to_string())),
        }
        if packet.stream() != self.stream_index {
            return Ok(Decoded::Pending);
        }

        self.decoder
            .send_packet(&packet)
            .map_err(|e| Error::Decode(e.to_string()))?;
        Ok(match self.receive()? {
            Some(frame) => Decoded::Frame(frame),
            None => Decoded::Pending,
        })
    }

    fn flush_next(&mut self) -> Result<Option<VideoFrame>> {
        if !self.eof_sent {
            self.decoder.send_eof()?;
            self.eof_sent = true;
        }
        self.receive()
    }

    fn convert(&mut self, surface: VideoFrame, color: &ColorParams) -> Result<VideoFrame> {
        let host = if surface.format() == Pixel::CUDA {
            let mut host = VideoFrame::empty();
            // SAFETY: both frames are valid; the destination is allocated by
            // av_hwframe_transfer_data.
            let ret = unsafe {
                ffi::av_hwframe_transfer_data(host.as_mut_ptr(), surface.as_ptr(), 0)
            };
            if ret < 0 {
                return Err(Error::Conversion(format!(
                    "device to host transfer failed (error {ret})"
                )));
            }
            host
        } else {
            surface
        };

        let mut converted = VideoFrame::empty();
        self.scaler_for(host.format(), color)?
            .run(&host, &mut converted)
            .map_err(|e| Error::Conversion(e.to_string()))?;
        Ok(converted)
    }

    fn download(&mut self, surface: &VideoFrame, dst: &mut [u8]) -> Result<()> {
        if dst.len() != self.geometry.frame_len() {
            return Err(Error::Download(format!(
                "destination is {} bytes, expected {}",
                dst.len(),
                self.geometry.frame_len()
            )));
        }

        let luma = (self.geometry.width as usize, self.geometry.height as usize);
        let chroma = self.geometry.chroma_dims();
        let mut offset = 0;
        for (plane, (width, height)) in [luma, chroma, chroma].into_iter().enumerate() {
            let stride = surface.stride(plane);
            let data = surface.data(plane);
            for row in 0..height {
                let start = row * stride;
                let src = data
                    .get(start..start + width)
                    .ok_or_else(|| Error::Download(format!("plane {plane} is short")))?;
                dst[offset..offset + width].copy_from_slice(src);
                offset += width;
            }
        }
        Ok(())
    }
}
