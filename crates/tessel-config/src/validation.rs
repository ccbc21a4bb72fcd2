//! Consistency checks for [`EngineConfig`].
//!
//! Every problem is collected, so a single run reports all of them.
//!
//! ```rust
//! use tessel_config::{EngineConfig, validate_config};
//!
//! let mut config = EngineConfig::default();
//! assert!(validate_config(&config).is_ok());
//!
//! config.thumbnails.atlas_size = 1000;
//! assert!(validate_config(&config).is_err());
//! ```

use thiserror::Error;

use crate::engine::EngineConfig;

/// Largest texture edge accepted anywhere in the configuration.
pub const MAX_TEXTURE_SIZE: u32 = 16384;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A size or count is zero.
    #[error("{0} must be non-zero")]
    ZeroSize(&'static str),

    /// A size exceeds [`MAX_TEXTURE_SIZE`].
    #[error("{field} = {value} exceeds the maximum of {MAX_TEXTURE_SIZE}")]
    TooLarge {
        /// Offending setting.
        field: &'static str,
        /// Its value.
        value: u32,
    },

    /// The atlas edge is not a power of two.
    #[error("thumbnails.atlas_size = {0} is not a power of two")]
    AtlasNotPowerOfTwo(u32),

    /// Thumbnails do not tile the atlas.
    #[error("thumbnails.thumb_size = {thumb} does not divide atlas_size = {atlas}")]
    ThumbDoesNotDivide {
        /// Thumbnail edge.
        thumb: u32,
        /// Atlas edge.
        atlas: u32,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_size(errors: &mut Vec<ValidationError>, field: &'static str, value: u32) {
    if value == 0 {
        errors.push(ValidationError::ZeroSize(field));
    } else if value > MAX_TEXTURE_SIZE {
        errors.push(ValidationError::TooLarge { field, value });
    }
}

/// Checks every setting of `config`.
pub fn validate_config(config: &EngineConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();

    let eval = &config.evaluation;
    check_size(&mut errors, "evaluation.default_width", eval.default_width);
    check_size(&mut errors, "evaluation.default_height", eval.default_height);
    if eval.batch_size == 0 {
        errors.push(ValidationError::ZeroSize("evaluation.batch_size"));
    }

    let bake = &config.bake;
    check_size(&mut errors, "bake.width", bake.width);
    check_size(&mut errors, "bake.height", bake.height);
    if bake.max_passes_per_frame == 0 {
        errors.push(ValidationError::ZeroSize("bake.max_passes_per_frame"));
    }

    let thumbs = &config.thumbnails;
    check_size(&mut errors, "thumbnails.atlas_size", thumbs.atlas_size);
    check_size(&mut errors, "thumbnails.thumb_size", thumbs.thumb_size);
    if thumbs.atlas_size > 0 && !thumbs.atlas_size.is_power_of_two() {
        errors.push(ValidationError::AtlasNotPowerOfTwo(thumbs.atlas_size));
    }
    if thumbs.thumb_size > 0
        && thumbs.atlas_size > 0
        && (thumbs.thumb_size > thumbs.atlas_size || thumbs.atlas_size % thumbs.thumb_size != 0)
    {
        errors.push(ValidationError::ThumbDoesNotDivide {
            thumb: thumbs.thumb_size,
            atlas: thumbs.atlas_size,
        });
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(validate_config(&EngineConfig::default()), Ok(()));
    }

    #[test]
    fn test_single_error_is_unwrapped() {
        let mut config = EngineConfig::default();
        config.bake.width = 0;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::ZeroSize("bake.width"))
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.evaluation.batch_size = 0;
        config.thumbnails.atlas_size = 1000;
        config.bake.height = MAX_TEXTURE_SIZE + 1;
        let Err(ValidationError::Multiple(errors)) = validate_config(&config) else {
            panic!("expected several errors");
        };
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::AtlasNotPowerOfTwo(1000)));
        assert!(errors.contains(&ValidationError::TooLarge {
            field: "bake.height",
            value: MAX_TEXTURE_SIZE + 1,
        }));
    }

    #[test]
    fn test_thumb_must_tile_atlas() {
        let mut config = EngineConfig::default();
        config.thumbnails.thumb_size = 48;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::ThumbDoesNotDivide {
                thumb: 48,
                atlas: 1024
            })
        );
    }

    #[test]
    fn test_multiple_display_joins() {
        let err = ValidationError::Multiple(vec![
            ValidationError::ZeroSize("a"),
            ValidationError::ZeroSize("b"),
        ]);
        assert_eq!(
            err.to_string(),
            "multiple validation errors: a must be non-zero; b must be non-zero"
        );
    }
}
