//! Configuration and engine context
//!
//! Settings come from three layers: the TOML file under the state directory
//! (overridable with `COQU_CONFIG`), environment variables, and per-invocation
//! flags applied by the caller. The engine itself never consults a global:
//! everything it needs travels in an explicit [`EngineContext`].
//!
//! Unknown TOML keys are tolerated so older binaries can read newer files.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngineError, Result};

/// How much parsing `load` performs up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseMode {
    /// Index at load time, full-parse lazily when a query needs it.
    #[default]
    Auto,
    /// Full-parse every program at load time.
    Full,
    /// Never full-parse; semantic queries stay on the chunk analyzer.
    IndexOnly,
}

impl std::str::FromStr for ParseMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ParseMode::Auto),
            "full" => Ok(ParseMode::Full),
            "index-only" => Ok(ParseMode::IndexOnly),
            other => Err(EngineError::Usage(format!(
                "parse-mode must be auto, full or index-only (got {other})"
            ))),
        }
    }
}

impl std::fmt::Display for ParseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParseMode::Auto => "auto",
            ParseMode::Full => "full",
            ParseMode::IndexOnly => "index-only",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    pub parse_mode: ParseMode,
    /// Advisory ceiling for full parsing, as a size string ("512M").
    pub memory_limit: Option<String>,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CopybooksConfig {
    /// Ordered copybook search roots.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; defaults to `<state>/cache`.
    pub directory: Option<PathBuf>,
    /// Size string; "0" or absent means unlimited.
    pub max_size: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    pub highlight: bool,
    pub history_file: Option<PathBuf>,
    pub history_size: Option<usize>,
}

impl Default for ReplConfig {
    fn default() -> ReplConfig {
        ReplConfig {
            highlight: true,
            history_file: None,
            history_size: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub general: GeneralConfig,
    pub copybooks: CopybooksConfig,
    pub cache: CacheConfig,
    pub repl: ReplConfig,
}

impl ConfigFile {
    /// Load from an explicit path, `COQU_CONFIG`, or `<state>/config.toml`,
    /// in that order. A missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<ConfigFile> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match env::var_os("COQU_CONFIG") {
                Some(p) => PathBuf::from(p),
                None => state_dir().join("config.toml"),
            },
        };
        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| EngineError::FileAccess {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&text)
            .map_err(|e| EngineError::Usage(format!("{}: {e}", path.display())))
    }
}

/// State directory: `COQU_HOME` or `~/.coqu`.
pub fn state_dir() -> PathBuf {
    if let Some(home) = env::var_os("COQU_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(".coqu"))
        .unwrap_or_else(|| PathBuf::from(".coqu"))
}

/// Additional copybook roots from `COQU_COPYLIB` (colon or semicolon
/// separated), appended after workspace-scoped paths.
pub fn env_copylib() -> Vec<PathBuf> {
    match env::var("COQU_COPYLIB") {
        Ok(v) => v
            .split([':', ';'])
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// `COQU_DEBUG=1` switches debug output on.
pub fn env_debug() -> bool {
    matches!(env::var("COQU_DEBUG").as_deref(), Ok("1"))
}

/// Parse a size string: plain bytes, or a K/M/G suffix (optionally with B).
/// "0" means unlimited.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let upper = s.to_ascii_uppercase();
    let (digits, factor) = if let Some(d) = upper.strip_suffix("KB").or(upper.strip_suffix('K')) {
        (d.to_string(), 1024u64)
    } else if let Some(d) = upper.strip_suffix("MB").or(upper.strip_suffix('M')) {
        (d.to_string(), 1024 * 1024)
    } else if let Some(d) = upper.strip_suffix("GB").or(upper.strip_suffix('G')) {
        (d.to_string(), 1024 * 1024 * 1024)
    } else {
        (upper, 1)
    };
    digits.trim().parse::<u64>().ok().map(|n| n * factor)
}

/// Everything an engine operation needs, passed explicitly. There is no
/// process-wide mutable state inside the core.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub parse_mode: ParseMode,
    pub debug: bool,
    pub cache_dir: PathBuf,
    /// Cache quota in bytes; 0 = unlimited.
    pub cache_max_bytes: u64,
    /// Advisory full-parse ceiling in bytes; 0 = unlimited.
    pub memory_limit: u64,
    /// Parser diagnostic count above which an AST is flagged degraded.
    pub diagnostic_threshold: usize,
}

impl EngineContext {
    pub fn from_config(cfg: &ConfigFile, state: &Path) -> EngineContext {
        EngineContext {
            parse_mode: cfg.general.parse_mode,
            debug: cfg.general.debug || env_debug(),
            cache_dir: cfg
                .cache
                .directory
                .clone()
                .unwrap_or_else(|| state.join("cache")),
            cache_max_bytes: cfg
                .cache
                .max_size
                .as_deref()
                .and_then(parse_size)
                .unwrap_or(0),
            memory_limit: cfg
                .general
                .memory_limit
                .as_deref()
                .and_then(parse_size)
                .unwrap_or(0),
            diagnostic_threshold: 100,
        }
    }

    /// Context rooted at an arbitrary cache directory, defaults elsewhere.
    pub fn with_cache_dir(dir: impl Into<PathBuf>) -> EngineContext {
        EngineContext {
            parse_mode: ParseMode::Auto,
            debug: false,
            cache_dir: dir.into(),
            cache_max_bytes: 0,
            memory_limit: 0,
            diagnostic_threshold: 100,
        }
    }
}
