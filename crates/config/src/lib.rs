//! Layered configuration for decant.
//!
//! Values are merged, lowest priority first, from:
//!
//! 1. built-in defaults ([`Config::default()`]),
//! 2. a configuration file (TOML, YAML or JSON, chosen by file extension),
//! 3. environment variables prefixed `DECANT_`, with nested keys separated
//!    by `__` (e.g. `DECANT_DECODER__PROGRAM=/opt/bin/ncmdump`).
//!
//! ```toml
//! extension = "ncm"
//! scratch = "/var/tmp/decant"
//!
//! [decoder]
//! candidates = ["ncmdump"]
//! args = ["{{ input }}", "-o", "{{ output_dir }}"]
//! ```

pub mod error;
mod last_used;

use crate::error::{ErrorKind, Result};
pub use crate::last_used::LastUsed;
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "DECANT_";
const CONFIG_FILE: &str = "config.toml";

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "decant").ok_or_raise(|| ErrorKind::NoHome)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extension of the encrypted container files, without the dot.
    pub extension: String,
    /// Where private scratch directories are created. The system temporary
    /// directory is used when unset.
    pub scratch: Option<PathBuf>,
    pub decoder: DecoderConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            extension: "ncm".to_string(),
            scratch: None,
            decoder: DecoderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Explicit decoder program; overrides discovery.
    pub program: Option<PathBuf>,
    /// Program names searched on `PATH` when no program is given.
    pub candidates: Vec<String>,
    /// Argument templates (`input`, `output_dir` and `basename` available).
    pub args: Vec<String>,
}
impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: None,
            candidates: vec!["ncmdump".to_string()],
            args: vec!["{{ input }}".to_string(), "-o".to_string(), "{{ output_dir }}".to_string()],
        }
    }
}

impl Config {
    /// `<config_dir>/config.toml` for the current user.
    pub fn default_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    /// Load and validate configuration.
    ///
    /// With `path` set, that file must exist. Without it, the default file is
    /// read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider stack without extracting it.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => match Self::default_path() {
                Ok(path) if path.is_file() => Some(path),
                Ok(path) => {
                    tracing::debug!(path = %path.display(), "No configuration file; using defaults");
                    None
                },
                Err(err) => {
                    tracing::warn!(error = ?err, "Could not locate default configuration file");
                    None
                },
            },
        };
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Loading configuration file");
            figment = match file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(&file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&file)),
                Some("json") => figment.merge(Json::file_exact(&file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn validate(&self) -> Result<()> {
        let extension = self.extension.as_str();
        if extension.is_empty() {
            exn::bail!(ErrorKind::Invalid("extension must not be empty".to_string()));
        }
        if extension.contains(['.', '/', '\\']) {
            exn::bail!(ErrorKind::Invalid(format!("extension {extension:?} must be a bare extension such as \"ncm\"")));
        }
        if self.decoder.program.is_none() && self.decoder.candidates.is_empty() {
            exn::bail!(ErrorKind::Invalid("decoder.candidates must not be empty without decoder.program".to_string()));
        }
        if !self.decoder.args.iter().any(|arg| references_input(arg)) {
            exn::bail!(ErrorKind::Invalid("decoder.args must reference {{ input }}".to_string()));
        }
        Ok(())
    }
}

fn references_input(arg: &str) -> bool {
    let compact: String = arg.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains("{{input}}") || compact.contains("{{input|")
}
