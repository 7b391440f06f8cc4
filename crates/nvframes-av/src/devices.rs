//! Accelerator discovery.
//!
//! Devices are enumerated with `nvidia-smi -L`, which prints one line per GPU:
//!
//! ```text
//! GPU 0: NVIDIA A100-SXM4-40GB (UUID: GPU-5b8e...)
//! ```

use crate::{Error, Result};
use std::path::PathBuf;
use std::process::Command;

const NVIDIA_SMI: &str = "nvidia-smi";

/// One accelerator visible to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Ordinal used to bind decoders to the device.
    pub index: usize,
    /// Marketing name reported by the driver.
    pub name: String,
}

/// Locate `nvidia-smi` on PATH.
pub fn nvidia_smi_path() -> Result<PathBuf> {
    which::which(NVIDIA_SMI)
        .map_err(|e| Error::library_unavailable(NVIDIA_SMI, e.to_string()))
}

/// List the GPUs visible to this host.
///
/// # Errors
///
/// Returns an error if `nvidia-smi` is missing or exits unsuccessfully.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let smi = nvidia_smi_path()?;
    let output = Command::new(&smi).arg("-L").output()?;
    if !output.status.success() {
        return Err(Error::library_unavailable(
            NVIDIA_SMI,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let devices = parse_nvidia_smi_list(&String::from_utf8_lossy(&output.stdout));
    #[cfg(feature = "tracing")]
    tracing::debug!("nvidia-smi reported {} device(s)", devices.len());
    Ok(devices)
}

/// Number of devices to schedule on.
///
/// An explicit `override_count` wins; otherwise the devices are enumerated.
pub fn device_count(override_count: Option<usize>) -> Result<usize> {
    match override_count {
        Some(count) => Ok(count),
        None => list_devices().map(|devices| devices.len()),
    }
}

/// Parse the output of `nvidia-smi -L`. Lines that do not describe a GPU are
/// skipped.
pub fn parse_nvidia_smi_list(output: &str) -> Vec<DeviceInfo> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<DeviceInfo> {
    let rest = line.trim().strip_prefix("GPU ")?;
    let (index, rest) = rest.split_once(':')?;
    let index = index.trim().parse().ok()?;
    let name = match rest.rfind(" (UUID") {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    Some(DeviceInfo {
        index,
        name: name.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvidia_smi_list() {
        let output = "\
GPU 0: NVIDIA A100-SXM4-40GB (UUID: GPU-5b8e2c1a-0000-0000-0000-000000000000)
GPU 1: NVIDIA A100-SXM4-40GB (UUID: GPU-7f10aa2b-0000-0000-0000-000000000000)
  MIG 1g.5gb Device 0: (UUID: MIG-0000)
";
        let devices = parse_nvidia_smi_list(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].index, 0);
        assert_eq!(devices[1].index, 1);
        assert_eq!(devices[1].name, "NVIDIA A100-SXM4-40GB");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_nvidia_smi_list("").is_empty());
        assert!(parse_nvidia_smi_list("No devices were found\n").is_empty());
    }

    #[test]
    fn test_parse_line_without_uuid() {
        let devices = parse_nvidia_smi_list("GPU 3: Tesla T4");
        assert_eq!(
            devices,
            vec![DeviceInfo {
                index: 3,
                name: "Tesla T4".to_string()
            }]
        );
    }

    #[test]
    fn test_device_count_override() {
        assert_eq!(device_count(Some(5)).unwrap(), 5);
        assert_eq!(device_count(Some(0)).unwrap(), 0);
    }
}
