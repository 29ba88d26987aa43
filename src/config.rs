//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/experimentator/experimentator.toml`
//! 3. Local config: a file named by the caller (usually next to the experiment)
//! 4. Environment variables: `EXPERIMENTATOR_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ApplicationError;
use crate::domain::design_tree::{DEFAULT_DISCRIMINATOR, DEFAULT_ENTRY};

const APP_NAME: &str = "experimentator";
const ENV_PREFIX: &str = "EXPERIMENTATOR";

/// Unified configuration for experiment generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Fixed seed for every random choice; fresh entropy when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// IV whose value selects the subtree below a section
    pub discriminator: String,
    /// Subtree generation starts from
    pub entry: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: None,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            entry: DEFAULT_ENTRY.to_string(),
        }
    }
}

/// Get the XDG config directory for experimentator.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{APP_NAME}.toml")))
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local` - Optional config file overriding the global one
    pub fn load(local: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), local)
    }

    /// Same as [`Settings::load`] with an explicit global file.
    ///
    /// Missing files are skipped; a file that exists but does not parse is
    /// an error.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("discriminator", defaults.discriminator)
            .map_err(config_err)?
            .set_default("entry", defaults.entry)
            .map_err(config_err)?;

        for path in [global, local].into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "loading config file");
                builder = builder.add_source(File::from(path).required(true));
            }
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config = builder.build().map_err(config_err)?;
        config.try_deserialize().map_err(config_err)
    }

    /// Random source for generation: seeded when `seed` is set.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# experimentator configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/experimentator/experimentator.toml
#   Local:  a file passed to Settings::load
#   Env:    EXPERIMENTATOR_* environment variables

# Seed for shuffles, counterbalancing and Latin squares (omit for fresh entropy)
# seed = 42

# IV selecting the subtree of a heterogeneous design
# discriminator = "design"

# Subtree generation starts from
# entry = "main"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
