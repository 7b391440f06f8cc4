//! Path utilities for video lists and output naming.
//!
//! The input to a run is a plain text list of video paths. Each video gets an
//! output directory named after its file name, holding one JPEG per kept
//! frame named by the zero-padded frame counter.

use crate::{Error, Result};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Extension used for every extracted frame.
pub const FRAME_EXTENSION: &str = "jpg";

/// Width of the zero-padded frame counter in output file names.
pub const FRAME_COUNTER_WIDTH: usize = 6;

/// Parse the contents of a video list.
///
/// One path per line. Surrounding whitespace is trimmed, a single pair of
/// surrounding double quotes is stripped, blank lines are skipped and repeated
/// paths are kept only at their first occurrence.
///
/// # Examples
///
/// ```
/// use nvframes_common::paths::parse_video_list;
/// use std::path::PathBuf;
///
/// let videos = parse_video_list("a.mp4\n\n\"b c.mkv\"\na.mp4\n");
/// assert_eq!(videos, vec![PathBuf::from("a.mp4"), PathBuf::from("b c.mkv")]);
/// ```
pub fn parse_video_list(content: &str) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .map(strip_quotes)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(PathBuf::from)
        .collect()
}

/// Read and parse a video list file.
pub fn read_video_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::path_io(path, e))?;
    Ok(parse_video_list(&content))
}

fn strip_quotes(line: &str) -> &str {
    if line.len() >= 2 && line.starts_with('"') && line.ends_with('"') {
        &line[1..line.len() - 1]
    } else {
        line
    }
}

/// File name for the frame with the given 1-based counter.
///
/// # Examples
///
/// ```
/// use nvframes_common::paths::frame_file_name;
///
/// assert_eq!(frame_file_name(1), "000001.jpg");
/// assert_eq!(frame_file_name(123456), "123456.jpg");
/// ```
#[must_use]
pub fn frame_file_name(counter: u64) -> String {
    format!(
        "{:0width$}.{}",
        counter,
        FRAME_EXTENSION,
        width = FRAME_COUNTER_WIDTH
    )
}

/// Name of the per-video output (and log) directory: the video's file name.
pub fn video_dir_name(video: &Path) -> Result<&OsStr> {
    video.file_name().ok_or_else(|| {
        Error::invalid_input(format!("video path has no file name: {}", video.display()))
    })
}
