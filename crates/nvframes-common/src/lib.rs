//! nvframes-common: shared types and utilities.
//!
//! This crate provides functionality used across the nvframes workspace:
//!
//! - **Error Handling**: the common error type and result alias
//! - **Video Lists**: parsing of the input list of video paths
//! - **Output Naming**: frame file names and per-video directory names
//! - **Device Selection**: `all` or an explicit list of accelerator indices
//!
//! # Examples
//!
//! ```
//! use nvframes_common::paths::frame_file_name;
//! use nvframes_common::DeviceSelection;
//!
//! assert_eq!(frame_file_name(7), "000007.jpg");
//!
//! let selection: DeviceSelection = "0,2".parse().unwrap();
//! assert_eq!(selection.resolve(4).unwrap(), vec![0, 2]);
//! ```

pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
