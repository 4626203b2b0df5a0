//! Configuration loading and parsing.
//!
//! `iscad.toml` (or an override path provided on the command line) supplies
//! the cache location and export defaults. Unknown fields are ignored so
//! the file format can grow without breaking older binaries.

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CacheConfig {
    /// Cache directory; a temporary directory is created when absent.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Keep entries that were not touched by the last rebuild.
    #[serde(default)]
    pub keep_unused: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Relative STL deflection coefficient for extension-dispatched export.
    #[serde(default = "ExportConfig::default_stl_coefficient")]
    pub stl_coefficient: f64,
}

impl ExportConfig {
    fn default_stl_coefficient() -> f64 {
        cad_model::export::DEFAULT_STL_COEFFICIENT
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            stl_coefficient: Self::default_stl_coefficient(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
}

/// Load the configuration: explicit path, else `iscad.toml` in the working
/// directory, else defaults. A missing explicit file is an error; a missing
/// default file is not.
pub fn load_from(explicit: Option<PathBuf>) -> Result<Config> {
    let (path, required) = match explicit {
        Some(p) => (p, true),
        None => (PathBuf::from("iscad.toml"), false),
    };
    if !path.is_file() {
        if required {
            anyhow::bail!("configuration file {} not found", path.display());
        }
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    let file: ConfigFile = toml::from_str(&raw)?;
    info!(target: "config", file = %path.display(), "config_loaded");
    Ok(Config { file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = load_from(None).unwrap();
        assert!(cfg.file.cache.directory.is_none());
        assert!(!cfg.file.cache.keep_unused);
        assert!(cfg.file.export.stl_coefficient > 0.0);
    }

    #[test]
    fn parses_cache_section_and_ignores_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iscad.toml");
        std::fs::write(
            &path,
            "[cache]\ndirectory = \"/tmp/iscad-cache\"\nkeep_unused = true\n\n[future]\nx = 1\n",
        )
        .unwrap();
        let cfg = load_from(Some(path)).unwrap();
        assert_eq!(
            cfg.file.cache.directory.as_deref(),
            Some(std::path::Path::new("/tmp/iscad-cache"))
        );
        assert!(cfg.file.cache.keep_unused);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_from(Some(PathBuf::from("/no/such/iscad.toml"))).is_err());
    }
}
