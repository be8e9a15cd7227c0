//! Configuration management for the deformation engine

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lattice construction and pin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatticeConfig {
    /// Edge length of one square cell in pixels
    #[serde(default = "default_cell_size")]
    pub cell_size: u32,

    /// Weight given to a pinned lattice point.
    /// Every lattice hop away from a pin costs `cell_size²` of weight.
    #[serde(default = "default_pin_weight")]
    pub pin_weight: f64,
}

fn default_cell_size() -> u32 {
    32
}
fn default_pin_weight() -> f64 {
    100_000.0
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            pin_weight: default_pin_weight(),
        }
    }
}

/// Foreground mask settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Per-channel tolerance around the background colour sampled at (0, 0)
    #[serde(default = "default_tolerance")]
    pub tolerance: u8,
}

fn default_tolerance() -> u8 {
    10
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

/// Pixel sampling used when resampling a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// Nearest source pixel
    Nearest,
    /// Weighted blend of the 2x2 source neighbourhood
    #[default]
    Bilinear,
}

/// What the destination buffer holds before cells are projected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClearMode {
    /// Fill with the background colour sampled at (0, 0)
    #[default]
    Background,
    /// Restore the undeformed image
    Original,
}

/// Projection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default)]
    pub sampling: Sampling,

    #[serde(default)]
    pub clear: ClearMode,
}

/// Interactive session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Half-size of the square hit box around a handle, in pixels
    #[serde(default = "default_handle_radius")]
    pub handle_radius: f64,

    /// Log a performance line every this many frames (0 disables)
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

fn default_handle_radius() -> f64 {
    5.0
}
fn default_stats_interval() -> u64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handle_radius: default_handle_radius(),
            stats_interval: default_stats_interval(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub lattice: LatticeConfig,

    #[serde(default)]
    pub mask: MaskConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.lattice.cell_size, 32);
        assert_eq!(config.lattice.pin_weight, 100_000.0);
        assert_eq!(config.mask.tolerance, 10);
        assert_eq!(config.projection.sampling, Sampling::Bilinear);
        assert_eq!(config.projection.clear, ClearMode::Background);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            "[lattice]\ncell_size = 16\n\n[projection]\nsampling = \"nearest\"\n",
        )
        .unwrap();
        assert_eq!(config.lattice.cell_size, 16);
        assert_eq!(config.lattice.pin_weight, 100_000.0);
        assert_eq!(config.projection.sampling, Sampling::Nearest);
        assert_eq!(config.session.handle_radius, 5.0);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deform.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.lattice.cell_size, created.lattice.cell_size);
        assert_eq!(loaded.mask.tolerance, created.mask.tolerance);
    }
}
