//! Shared CLI helpers used across multiple commands.

use std::ops::Range;
use std::path::Path;

use anyhow::Context;
use tessel_config::{EngineConfig, find_config};

/// Loads `explicit` if given, else the first config found, else defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let cwd = std::env::current_dir().context("reading the working directory")?;
    match find_config(&cwd) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Parse `WxH` (or a single `N` for square) for clap's `value_parser`.
pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid size '{s}' (expected WxH)"))
    };
    match s.split_once(['x', 'X']) {
        Some((w, h)) => Ok((parse(w)?, parse(h)?)),
        None => parse(s).map(|n| (n, n)),
    }
}

/// Parse `A..B` (end exclusive) or a single frame `N` for clap's `value_parser`.
pub fn parse_frames(s: &str) -> Result<Range<i32>, String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|_| format!("invalid frame range '{s}' (expected A..B)"))
    };
    let range = match s.split_once("..") {
        Some((a, b)) => parse(a)?..parse(b)?,
        None => {
            let n = parse(s)?;
            n..n + 1
        }
    };
    if range.is_empty() {
        return Err(format!("frame range '{s}' is empty"));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("256x128"), Ok((256, 128)));
        assert_eq!(parse_size("64"), Ok((64, 64)));
        assert!(parse_size("0x4").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn test_parse_frames() {
        assert_eq!(parse_frames("0..4"), Ok(0..4));
        assert_eq!(parse_frames("-2..1"), Ok(-2..1));
        assert_eq!(parse_frames("5"), Ok(5..6));
        assert!(parse_frames("3..3").is_err());
        assert!(parse_frames("a..b").is_err());
    }
}
