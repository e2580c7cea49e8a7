//! Worker configuration.
//!
//! Every field has a built-in default; a TOML file may override any subset.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default name of the change-set file inside the doctree directory.
pub const DEFAULT_DIGEST_FILE: &str = "digest.json";

/// Directory created under the temp root for internally keyed doctrees.
const WORKER_DIR_NAME: &str = "_doctree_worker";

/// Fallback temp root when no temp-directory variable is set.
const FALLBACK_TMP_ROOT: &str = ".doctree_worker_cache";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Worker configuration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Base directory for doctree directories the worker keys itself.
    pub worker_root: PathBuf,
    /// Build tool program followed by any leading arguments.
    pub build_command: Vec<String>,
    /// Suffixes that mark an input as a document source.
    pub doc_suffixes: Vec<String>,
    /// Fixed source-root prefix stripped from document paths. When unset,
    /// the request's source directory argument is used.
    pub source_prefix: Option<String>,
    /// Change-set file name, written inside the doctree directory.
    pub digest_file: String,
    /// Maximum bytes of tool output carried in a failure response.
    pub max_output_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_root: default_worker_root(),
            build_command: vec!["sphinx-build".to_string()],
            doc_suffixes: vec![".rst".to_string(), ".md".to_string()],
            source_prefix: None,
            digest_file: DEFAULT_DIGEST_FILE.to_string(),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl WorkerConfig {
    /// Load and validate config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: WorkerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_command.first().map_or(true, |program| program.is_empty()) {
            return Err(ConfigError::Invalid("build_command must name a program".to_string()));
        }
        if self.digest_file.is_empty() || self.digest_file.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "digest_file must be a plain file name, got {:?}",
                self.digest_file
            )));
        }
        if self.doc_suffixes.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid("doc_suffixes must not contain empty entries".to_string()));
        }
        Ok(())
    }
}

/// `$TMPDIR`, `$TEMP` or `$TMP` (first one set), joined with the worker
/// directory name.
fn default_worker_root() -> PathBuf {
    let tmp_root = ["TMPDIR", "TEMP", "TMP"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_TMP_ROOT));
    tmp_root.join(WORKER_DIR_NAME)
}
