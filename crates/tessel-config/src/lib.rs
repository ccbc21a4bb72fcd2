//! Tessel Config - engine configuration for tessel texture graphs.
//!
//! This crate loads, validates and saves the TOML file that controls
//! evaluation batch sizes, target resolution and format, baking settings and
//! the thumbnail atlas, and converts it into the core engine's settings.
//!
//! # Example
//!
//! ```rust
//! use tessel_config::EngineConfig;
//!
//! let config = EngineConfig::from_toml(
//!     r#"
//!     [bake]
//!     width = 1024
//!     height = 1024
//!     "#,
//! )
//! .unwrap();
//!
//! let builder = config.to_builder_config();
//! assert_eq!(builder.width, 1024);
//!
//! let context = config.to_context_config();
//! assert_eq!(context.default_width, 512);
//! ```
//!
//! # Config Locations
//!
//! [`paths::find_config`] looks for `tessel.toml` in the working directory,
//! then in the platform configuration directory ([`paths::config_dir`]).

pub mod engine;
pub mod error;
pub mod paths;
pub mod validation;

pub use engine::{BakeSettings, EngineConfig, EvaluationSettings, FormatSetting, ThumbnailSettings};
pub use error::ConfigError;
pub use paths::{config_dir, default_config_path, find_config};
pub use validation::{MAX_TEXTURE_SIZE, ValidationError, ValidationResult, validate_config};
