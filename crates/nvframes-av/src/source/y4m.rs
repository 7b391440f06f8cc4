//! YUV4MPEG2 (`.y4m`) reader and writer.
//!
//! Y4M carries raw planar frames, so "decoding" is a read of one frame worth
//! of bytes and nothing is ever buffered for the flush phase. Only 4:2:0
//! chroma layouts are accepted. The `XCOLORRANGE` extension written by FFmpeg
//! is honoured; the colour matrix is never signalled.

use super::{Decoded, FrameSource};
use crate::color::{ColorParams, ColorRange, ColorSpace, RangeExpander};
use crate::frame::FrameGeometry;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;

const STREAM_MAGIC: &str = "YUV4MPEG2";
const FRAME_MAGIC: &[u8] = b"FRAME";
const MAX_HEADER_LEN: usize = 4096;
const SUPPORTED_CHROMA: &[&str] = &["420", "420jpeg", "420paldv", "420mpeg2"];

/// Parsed stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Y4mHeader {
    pub geometry: FrameGeometry,
    pub range: ColorRange,
}

impl Y4mHeader {
    /// Parse the header line (without the trailing newline).
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some(STREAM_MAGIC) {
            return Err(Error::Decode("not a YUV4MPEG2 stream".to_string()));
        }

        let mut width = None;
        let mut height = None;
        let mut range = ColorRange::Unspecified;

        for token in tokens {
            let mut chars = token.chars();
            let tag = chars.next();
            let value = chars.as_str();
            match tag {
                Some('W') => width = Some(parse_dimension(value, "width")?),
                Some('H') => height = Some(parse_dimension(value, "height")?),
                Some('C') => {
                    if !SUPPORTED_CHROMA.contains(&value) {
                        return Err(Error::Unsupported(format!(
                            "Y4M chroma layout C{value} (only 4:2:0 is supported)"
                        )));
                    }
                }
                Some('X') => {
                    if let Some(r) = value.strip_prefix("COLORRANGE=") {
                        range = match r.to_ascii_uppercase().as_str() {
                            "FULL" => ColorRange::Full,
                            "LIMITED" => ColorRange::Limited,
                            _ => ColorRange::Unspecified,
                        };
                    }
                }
                // Frame rate, interlacing and aspect do not affect extraction
                _ => {}
            }
        }

        let width = width.ok_or_else(|| Error::Decode("Y4M header has no width".to_string()))?;
        let height = height.ok_or_else(|| Error::Decode("Y4M header has no height".to_string()))?;

        Ok(Self {
            geometry: FrameGeometry::new(width, height)?,
            range,
        })
    }
}

fn parse_dimension(value: &str, what: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::Decode(format!("invalid Y4M {what}: {value:?}")))
}

/// Frame source reading a `.y4m` file.
pub struct Y4mSource {
    reader: BufReader<File>,
    header: Y4mHeader,
    expander: RangeExpander,
    frames_read: u64,
}

impl Y4mSource {
    /// Open a file and parse its stream header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::file_not_found(path)
            } else {
                Error::Io(e)
            }
        })?;
        let mut reader = BufReader::new(file);

        let line = read_line(&mut reader)?
            .ok_or_else(|| Error::Decode("empty Y4M file".to_string()))?;
        let line = String::from_utf8(line)
            .map_err(|_| Error::Decode("Y4M header is not ASCII".to_string()))?;
        let header = Y4mHeader::parse(&line)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Opened Y4M stream {:?}: {}x{}, range {:?}",
            path,
            header.geometry.width,
            header.geometry.height,
            header.range
        );

        Ok(Self {
            reader,
            header,
            expander: RangeExpander::new(),
            frames_read: 0,
        })
    }

    pub fn header(&self) -> &Y4mHeader {
        &self.header
    }
}

fn read_line(reader: &mut impl BufRead) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_HEADER_LEN as u64)
        .read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(Error::Decode("unterminated Y4M header line".to_string()));
    }
    line.pop();
    Ok(Some(line))
}

impl FrameSource for Y4mSource {
    type Surface = Vec<u8>;

    fn geometry(&self) -> FrameGeometry {
        self.header.geometry
    }

    fn color(&self) -> ColorParams {
        ColorParams::new(ColorSpace::Unspecified, self.header.range)
    }

    fn decode_next(&mut self) -> Result<Decoded<Vec<u8>>> {
        let Some(line) = read_line(&mut self.reader)? else {
            return Ok(Decoded::EndOfStream);
        };
        if !line.starts_with(FRAME_MAGIC) {
            return Err(Error::Decode(format!(
                "expected FRAME marker after frame {}",
                self.frames_read
            )));
        }

        let mut frame = vec![0u8; self.header.geometry.frame_len()];
        self.reader.read_exact(&mut frame).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::Decode(format!("truncated frame {}", self.frames_read + 1))
            } else {
                Error::Io(e)
            }
        })?;
        self.frames_read += 1;
        Ok(Decoded::Frame(frame))
    }

    fn flush_next(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn convert(&mut self, mut surface: Vec<u8>, color: &ColorParams) -> Result<Vec<u8>> {
        if surface.len() != self.header.geometry.frame_len() {
            return Err(Error::Conversion(format!(
                "surface is {} bytes, expected {}",
                surface.len(),
                self.header.geometry.frame_len()
            )));
        }
        if color.needs_range_expansion() {
            self.expander
                .expand_frame(&mut surface, self.header.geometry.luma_len());
        }
        Ok(surface)
    }

    fn download(&mut self, surface: &Vec<u8>, dst: &mut [u8]) -> Result<()> {
        if dst.len() != surface.len() {
            return Err(Error::Download(format!(
                "destination is {} bytes, surface is {}",
                dst.len(),
                surface.len()
            )));
        }
        dst.copy_from_slice(surface);
        Ok(())
    }
}

/// Writer for synthetic `.y4m` clips.
pub struct Y4mWriter<W: Write> {
    inner: W,
    geometry: FrameGeometry,
}

impl<W: Write> Y4mWriter<W> {
    /// Write the stream header.
    pub fn new(mut inner: W, geometry: FrameGeometry, range: ColorRange) -> Result<Self> {
        write!(
            inner,
            "{} W{} H{} F25:1 Ip A1:1 C420jpeg",
            STREAM_MAGIC, geometry.width, geometry.height
        )?;
        match range {
            ColorRange::Full => write!(inner, " XCOLORRANGE=FULL")?,
            ColorRange::Limited => write!(inner, " XCOLORRANGE=LIMITED")?,
            ColorRange::Unspecified => {}
        }
        inner.write_all(b"\n")?;
        Ok(Self { inner, geometry })
    }

    /// Append one planar 4:2:0 frame.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() != self.geometry.frame_len() {
            return Err(Error::InvalidInput(format!(
                "frame is {} bytes, expected {}",
                frame.len(),
                self.geometry.frame_len()
            )));
        }
        self.inner.write_all(FRAME_MAGIC)?;
        self.inner.write_all(b"\n")?;
        self.inner.write_all(frame)?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl Y4mWriter<std::io::BufWriter<File>> {
    /// Create a file containing `frames` frames filled by `fill(index, frame)`.
    pub fn write_file(
        path: &Path,
        geometry: FrameGeometry,
        frames: u64,
        mut fill: impl FnMut(u64, &mut [u8]),
    ) -> Result<()> {
        let file = std::io::BufWriter::new(File::create(path)?);
        let mut writer = Self::new(file, geometry, ColorRange::Full)?;
        let mut frame = vec![0u8; geometry.frame_len()];
        for index in 0..frames {
            fill(index, &mut frame);
            writer.write_frame(&frame)?;
        }
        writer.finish()?;
        Ok(())
    }
}
