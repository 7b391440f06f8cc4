//! Core types shared between the configuration layer and the device inventory.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which accelerator devices a run uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSelection {
    /// Every detected device.
    #[default]
    All,
    /// Explicit device indices, in slot order.
    Indices(Vec<usize>),
}

impl DeviceSelection {
    /// Resolve the selection against the number of available devices.
    ///
    /// Fails if an explicit index is out of range or if nothing is selected.
    pub fn resolve(&self, available: usize) -> Result<Vec<usize>> {
        let indices = match self {
            Self::All => (0..available).collect::<Vec<_>>(),
            Self::Indices(indices) => {
                if let Some(&index) = indices.iter().find(|&&i| i >= available) {
                    return Err(Error::DeviceNotFound { index, available });
                }
                indices.clone()
            }
        };

        if indices.is_empty() {
            return Err(Error::invalid_input("no accelerator devices selected"));
        }
        Ok(indices)
    }
}

impl FromStr for DeviceSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        let indices = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| Error::invalid_input(format!("invalid device index: {part:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Indices(indices))
    }
}

impl TryFrom<String> for DeviceSelection {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceSelection> for String {
    fn from(value: DeviceSelection) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Indices(indices) => {
                let parts: Vec<String> = indices.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        assert_eq!("all".parse::<DeviceSelection>().unwrap(), DeviceSelection::All);
        assert_eq!("ALL".parse::<DeviceSelection>().unwrap(), DeviceSelection::All);
    }

    #[test]
    fn test_parse_indices() {
        assert_eq!(
            "0, 1,3".parse::<DeviceSelection>().unwrap(),
            DeviceSelection::Indices(vec![0, 1, 3])
        );
        assert!("0,x".parse::<DeviceSelection>().is_err());
        assert!("".parse::<DeviceSelection>().is_err());
    }

    #[test]
    fn test_resolve_all() {
        assert_eq!(DeviceSelection::All.resolve(3).unwrap(), vec![0, 1, 2]);
        assert!(DeviceSelection::All.resolve(0).is_err());
    }

    #[test]
    fn test_resolve_out_of_range() {
        let err = DeviceSelection::Indices(vec![0, 4]).resolve(2).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotFound {
                index: 4,
                available: 2
            }
        ));
    }

    #[test]
    fn test_display_round_trips_through_string() {
        let selection = DeviceSelection::Indices(vec![1, 0]);
        let text = String::from(selection.clone());
        assert_eq!(text, "1,0");
        assert_eq!(DeviceSelection::try_from(text).unwrap(), selection);
    }
}
