//! CLI 配置
//!
//! Per-stage log levels and the on-disk configuration document.

use hotbuild_config::{BuildConfig, Stage, Workspace};
use std::path::Path;
use tracing::Level;

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    /// Overrides as (stage, level); later entries win
    pub stages: Vec<(Stage, Level)>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::INFO,
            stages: Vec::new(),
        }
    }
}

impl LogConfig {
    /// `-v` raises the global level once per occurrence
    pub fn from_args(verbose: u8, overrides: &[String]) -> Result<Self, String> {
        let global = match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let mut stages = Vec::new();
        for item in overrides {
            stages.push(parse_override(item)?);
        }
        Ok(Self { global, stages })
    }

    /// Get log level for a specific stage
    pub fn level_for(&self, stage: Stage) -> Level {
        self.stages
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, level)| *level)
            .unwrap_or(self.global)
    }
}

/// `stage=level`, e.g. `compile=debug`
fn parse_override(item: &str) -> Result<(Stage, Level), String> {
    let (stage, level) = item
        .split_once('=')
        .ok_or_else(|| format!("expected stage=level, got '{}'", item))?;
    let stage = Stage::ALL
        .iter()
        .copied()
        .find(|s| s.as_str().eq_ignore_ascii_case(stage.trim()))
        .ok_or_else(|| format!("unknown stage '{}'", stage.trim()))?;
    let level = parse_level(level.trim()).ok_or_else(|| format!("unknown log level '{}'", level.trim()))?;
    Ok((stage, level))
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Load `<base>/hotbuild.json`, creating it with defaults when missing.
///
/// The document is written back after loading so keys added in newer
/// versions appear in the file.
pub fn load_or_create(workspace: &Workspace) -> Result<BuildConfig, String> {
    let path = workspace.config_path();
    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        BuildConfig::from_json(&content)
            .map_err(|e| format!("cannot parse '{}': {}", path.display(), e))?
    } else {
        BuildConfig::default()
    };
    save(&path, &config)?;
    Ok(config)
}

pub fn save(path: &Path, config: &BuildConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create '{}': {}", parent.display(), e))?;
    }
    let text = config
        .to_json_pretty()
        .map_err(|e| format!("cannot render configuration: {}", e))?;
    std::fs::write(path, text).map_err(|e| format!("cannot write '{}': {}", path.display(), e))
}
