//! Run configuration.
//!
//! `imgpipe.toml` tunes how jobs run, never what they do: the job payload
//! names the operations, the config names the output directory, encoder
//! quality, upload failure policy and batch parallelism.
//!
//! ## Layering
//!
//! [`RunConfig::default`] is serialized to a TOML table and the user's file
//! is overlaid onto it key by key, so a file holding only
//! `[uploads] fail_on_error = true` is a complete config. The merged table is
//! deserialized with unknown keys denied and then range-checked.
//!
//! The file is looked up as `./imgpipe.toml` unless `--config` names one.
//! Only the implicit lookup may be absent.
//!
//! ```toml
//! output_dir = "tmp_images"
//!
//! [images]
//! quality = 90            # 1-100, used by JPEG, WebP and AVIF
//!
//! [uploads]
//! fail_on_error = false
//!
//! [processing]
//! max_processes = 4       # `batch` only; omitted means one per core
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "imgpipe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{} is not valid TOML: {source}", path.display())]
    Syntax {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("bad config: {0}")]
    Schema(#[from] toml::de::Error),
    #[error("cannot encode stock defaults: {0}")]
    Defaults(#[from] toml::ser::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Settings from `imgpipe.toml`, stock values for anything left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Where step results go; relative paths resolve against the working directory.
    pub output_dir: String,
    pub images: ImagesConfig,
    pub uploads: UploadsConfig,
    pub processing: ProcessingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: "tmp_images".to_string(),
            images: ImagesConfig::default(),
            uploads: UploadsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problem = if !(1..=100).contains(&self.images.quality) {
            Some(format!("images.quality is {}, expected 1-100", self.images.quality))
        } else if self.output_dir.trim().is_empty() {
            Some("output_dir is blank".to_string())
        } else if self.processing.max_processes == Some(0) {
            Some("processing.max_processes is 0, expected 1 or more".to_string())
        } else {
            None
        };
        match problem {
            Some(message) => Err(ConfigError::Invalid(message)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Lossy encoder quality, 1 to 100.
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Abort the job on the first failed upload instead of logging it.
    pub fail_on_error: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Upper bound on jobs `batch` runs at once.
    pub max_processes: Option<usize>,
}

/// Worker count for `batch`: the configured cap, never more than the
/// machine's cores, and every core when no cap is set.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    match config.max_processes {
        Some(cap) => cap.min(available),
        None => available,
    }
}

// =============================================================================
// Layered loading
// =============================================================================

/// [`RunConfig::default`] as a TOML table, the layer user files overlay.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(RunConfig::default())?)
}

/// Overlay `overlay` onto `base`.
///
/// Where both sides hold a table the overlay descends into it; anywhere else
/// the overlay value wins outright. Keys only `base` has are kept.
pub fn merge_toml(mut base: toml::Value, overlay: toml::Value) -> toml::Value {
    overlay_into(&mut base, overlay);
    base
}

fn overlay_into(slot: &mut toml::Value, overlay: toml::Value) {
    match (slot, overlay) {
        (toml::Value::Table(table), toml::Value::Table(incoming)) => {
            for (key, value) in incoming {
                match table.get_mut(&key) {
                    Some(existing) => overlay_into(existing, value),
                    None => {
                        table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Raw `imgpipe.toml` from `dir`, or `None` when the directory has none.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    match fs::read_to_string(&path) {
        Ok(text) => parse_raw(path, &text).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}

fn read_raw(path: &Path) -> Result<toml::Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_raw(path.to_path_buf(), &text)
}

fn parse_raw(path: PathBuf, text: &str) -> Result<toml::Value, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Syntax { path, source })
}

/// Apply `overlay` (if any) to `base`, deserialize, and range-check.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<RunConfig, ConfigError> {
    let config: RunConfig = overlay.into_iter().fold(base, merge_toml).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Config for a run in `dir`: stock defaults under `dir/imgpipe.toml` if present.
pub fn load_config(dir: &Path) -> Result<RunConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(dir)?)
}

/// Config from a file named on the command line. The file must exist.
pub fn load_config_file(path: &Path) -> Result<RunConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, Some(read_raw(path)?))
}

/// Annotated `imgpipe.toml` printed by `imgpipe gen-config`.
///
/// Every value equals the stock default, so writing it out unchanged is a no-op.
pub fn stock_config_toml() -> &'static str {
    r##"# imgpipe.toml
#
# Read from the working directory, or from --config <file>.
# Every key may be left out; the values below are what you get by default.
# A misspelled key is an error rather than being silently ignored.

# Step results land here. The directory is created on demand and made
# readable and writable by everyone. --output-dir overrides it.
output_dir = "tmp_images"

[images]
# Encoder quality for JPEG, WebP and AVIF outputs, 1 (smallest) to 100 (best).
quality = 90

[uploads]
# false: log a failed upload, mark it in the report, run the remaining steps.
# true:  stop the job at the first failed upload.
fail_on_error = false

[processing]
# How many jobs `imgpipe batch` runs side by side. Left unset it uses one
# per CPU core; larger values are capped at the core count.
# max_processes = 4
"##
}
