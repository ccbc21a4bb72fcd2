//! Engine configuration file.
//!
//! Every field has a default, so a partial file (or an empty one) is a
//! valid configuration.
//!
//! ```toml
//! log_filter = "info,tessel_core=debug"
//!
//! [evaluation]
//! batch_size = 50
//! format = "rgba16f"
//!
//! [bake]
//! width = 2048
//! height = 2048
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessel_core::{BuilderConfig, ContextConfig, PixelFormat};

use crate::error::ConfigError;
use crate::validation::{ValidationResult, validate_config};

/// Target storage format as written in the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatSetting {
    /// 8 bits per channel.
    #[default]
    Rgba8,
    /// 16-bit float per channel.
    Rgba16f,
    /// 32-bit float per channel.
    Rgba32f,
}

impl From<FormatSetting> for PixelFormat {
    fn from(format: FormatSetting) -> Self {
        match format {
            FormatSetting::Rgba8 => PixelFormat::Rgba8,
            FormatSetting::Rgba16f => PixelFormat::Rgba16F,
            FormatSetting::Rgba32f => PixelFormat::Rgba32F,
        }
    }
}

/// Interactive evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Stages executed per `evaluate` call.
    pub batch_size: usize,
    /// Width of default-sized targets.
    pub default_width: u32,
    /// Height of default-sized targets.
    pub default_height: u32,
    /// Storage format of every target.
    pub format: FormatSetting,
    /// Render thumbnails for nodes that request them.
    pub thumbnails: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        let core = ContextConfig::default();
        Self {
            batch_size: core.batch_size,
            default_width: core.default_width,
            default_height: core.default_height,
            format: FormatSetting::default(),
            thumbnails: core.thumbnails,
        }
    }
}

/// Offline baking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    /// Working width.
    pub width: u32,
    /// Working height.
    pub height: u32,
    /// Extra evaluation passes per frame while stages are still processing.
    pub max_passes_per_frame: usize,
}

impl Default for BakeSettings {
    fn default() -> Self {
        let core = BuilderConfig::default();
        Self {
            width: core.width,
            height: core.height,
            max_passes_per_frame: core.max_passes_per_frame,
        }
    }
}

/// Thumbnail atlas layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Atlas edge in texels; a power of two.
    pub atlas_size: u32,
    /// Slot edge in texels; divides `atlas_size`.
    pub thumb_size: u32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        let core = ContextConfig::default();
        Self {
            atlas_size: core.atlas_size,
            thumb_size: core.thumb_size,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Interactive evaluation.
    pub evaluation: EvaluationSettings,
    /// Offline baking.
    pub bake: BakeSettings,
    /// Thumbnail atlas.
    pub thumbnails: ThumbnailSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            evaluation: EvaluationSettings::default(),
            bake: BakeSettings::default(),
            thumbnails: ThumbnailSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Check the settings for consistency.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_config(self)
    }

    /// Settings for an interactive evaluation context.
    pub fn to_context_config(&self) -> ContextConfig {
        ContextConfig {
            default_width: self.evaluation.default_width,
            default_height: self.evaluation.default_height,
            format: self.evaluation.format.into(),
            batch_size: self.evaluation.batch_size,
            building: false,
            thumbnails: self.evaluation.thumbnails,
            atlas_size: self.thumbnails.atlas_size,
            thumb_size: self.thumbnails.thumb_size,
        }
    }

    /// Settings for the background builder.
    pub fn to_builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            width: self.bake.width,
            height: self.bake.height,
            max_passes_per_frame: self.bake.max_passes_per_frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [evaluation]
            batch_size = 7
            format = "rgba32f"
            "#,
        )
        .unwrap();
        assert_eq!(config.evaluation.batch_size, 7);
        assert_eq!(config.evaluation.format, FormatSetting::Rgba32f);
        assert_eq!(config.evaluation.default_width, 512);
        assert_eq!(config.bake, BakeSettings::default());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = EngineConfig::default();
        config.log_filter = "debug".into();
        config.bake.width = 256;
        config.thumbnails.thumb_size = 128;
        let text = config.to_toml().unwrap();
        assert!(text.contains("[bake]"));
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let err = EngineConfig::from_toml("[thumbnails]\natlas_size = 1000\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::AtlasNotPowerOfTwo(1000))
        ));
    }

    #[test]
    fn test_unknown_format_is_parse_error() {
        let err = EngineConfig::from_toml("[evaluation]\nformat = \"bgra\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_context_conversion() {
        let mut config = EngineConfig::default();
        config.evaluation.format = FormatSetting::Rgba16f;
        config.evaluation.batch_size = 3;
        config.thumbnails.atlas_size = 2048;
        let ctx = config.to_context_config();
        assert_eq!(ctx.format, PixelFormat::Rgba16F);
        assert_eq!(ctx.batch_size, 3);
        assert_eq!(ctx.atlas_size, 2048);
        assert!(!ctx.building);
    }

    #[test]
    fn test_builder_conversion_matches_core_default() {
        assert_eq!(
            EngineConfig::default().to_builder_config(),
            BuilderConfig::default()
        );
    }
}
