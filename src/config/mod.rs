mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./nvframes.toml",
        "~/.config/nvframes/config.toml",
        "/etc/nvframes/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration after command line overrides are applied
pub fn validate_config(config: &Config) -> Result<()> {
    let pipeline = &config.pipeline;
    if pipeline.interval == 0 {
        anyhow::bail!("Sampling interval must be at least 1");
    }
    if pipeline.encode_workers == 0 {
        anyhow::bail!("Encode workers must be at least 1");
    }
    if pipeline.write_workers == 0 {
        anyhow::bail!("Write workers must be at least 1");
    }
    if pipeline.queue_depth == 0 {
        anyhow::bail!("Queue depth must be at least 1");
    }

    if let Some(runtime) = &config.paths.runtime_path {
        if !runtime.is_dir() {
            anyhow::bail!("Runtime path is not a directory: {:?}", runtime);
        }
    }
    if let Some(turbojpeg) = &config.paths.turbojpeg_path {
        if !turbojpeg.is_file() {
            anyhow::bail!("libturbojpeg path is not a file: {:?}", turbojpeg);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvframes_av::CompressorKind;
    use nvframes_common::DeviceSelection;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pipeline.encode_workers, 4);
        assert_eq!(config.pipeline.write_workers, 4);
        assert_eq!(config.pipeline.queue_depth, 4);
        assert_eq!(config.pipeline.quality.get(), 85);
        assert_eq!(config.pipeline.interval, 1);
        assert_eq!(config.devices.selection, DeviceSelection::All);
        assert_eq!(config.run.timeout(), Some(Duration::from_secs(3600)));
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            encode_workers = 8
            quality = 92
            interval = 5
            compressor = "image"

            [devices]
            selection = "0,2"
            count = 4

            [run]
            timeout_secs = 0
            log_dir = "/var/log/nvframes"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.encode_workers, 8);
        assert_eq!(config.pipeline.write_workers, 4);
        assert_eq!(config.pipeline.quality.get(), 92);
        assert_eq!(config.pipeline.compressor, CompressorKind::Image);
        assert_eq!(config.devices.selection, DeviceSelection::Indices(vec![0, 2]));
        assert_eq!(config.devices.count, Some(4));
        assert_eq!(config.run.timeout(), None);
        assert!(config.run.log_dir.is_some());
    }

    #[test]
    fn test_invalid_quality_rejected_at_parse() {
        let result: std::result::Result<Config, _> = toml::from_str("[pipeline]\nquality = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.pipeline.interval = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.pipeline.queue_depth = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.paths.runtime_path = Some("/nonexistent/cuda/lib64".into());
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.paths.turbojpeg_path = Some(std::env::temp_dir());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvframes.toml");
        std::fs::write(&path, "[pipeline]\nwrite_workers = 2\n").unwrap();
        let config = load_config_or_default(Some(&path)).unwrap();
        assert_eq!(config.pipeline.write_workers, 2);

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_library_dirs() {
        let mut paths = PathsConfig::default();
        assert!(paths.library_dirs().is_empty());
        paths.runtime_path = Some("/usr/local/cuda/lib64".into());
        paths.turbojpeg_path = Some("/opt/libjpeg-turbo/lib64/libturbojpeg.so".into());
        assert_eq!(
            paths.library_dirs(),
            vec![
                std::path::PathBuf::from("/usr/local/cuda/lib64"),
                std::path::PathBuf::from("/opt/libjpeg-turbo/lib64"),
            ]
        );
    }
}
