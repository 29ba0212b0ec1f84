//! Layered configuration.
//!
//! Precedence, lowest to highest: built-in defaults, an optional config
//! file (`imprint.toml`/`.yaml`/`.json` in the platform config directory or
//! an explicit path), then `IMPRINT_*` environment variables. Nested fields
//! use `__` in env vars, e.g. `IMPRINT_RESOLVER__LABEL_LENGTH_THRESHOLD=32`.
//!
//! Loading validates before returning: a config that loads is a config the
//! engine can run with.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Hard ceiling on concurrent fetches, matching the gate's pool bound.
pub const MAX_CONCURRENCY: usize = 3;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Master feature gate; when off, extraction returns nothing and
    /// performs no I/O.
    pub enabled: bool,
    /// Simultaneous in-flight fetches, clamped to 1..=3 on load.
    pub concurrency: usize,
    /// Overall per-extraction budget in milliseconds.
    pub timeout_ms: u64,
    /// Budget for small sniff/verification reads in milliseconds.
    pub sniff_timeout_ms: u64,
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Length under which unspaced candidate text is treated as a machine
    /// label rather than a prompt.
    pub label_length_threshold: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Persistent store path; `None` selects the platform cache directory.
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 2,
            timeout_ms: 15_000,
            sniff_timeout_ms: 1_500,
            resolver: ResolverConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { label_length_threshold: 24 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

impl Config {
    /// Load from the platform config directory and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_file_stem().as_deref())
    }

    /// Load with an explicit config file location (extension decides the
    /// format family; all three are probed when given a bare stem).
    #[instrument(skip_all, fields(file = ?stem))]
    pub fn load_from(stem: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(stem) = stem {
            figment = figment
                .merge(Toml::file(stem.with_extension("toml")))
                .merge(Yaml::file(stem.with_extension("yaml")))
                .merge(Json::file(stem.with_extension("json")));
        }
        let config: Config = figment
            .merge(Env::prefixed("IMPRINT_").split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validated()
    }

    /// The config file stem (`<config dir>/imprint`), when the platform
    /// exposes a config directory.
    fn default_file_stem() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "imprint")
            .map(|dirs| dirs.config_dir().join("imprint"))
    }

    /// The persistent cache database location: the configured override, or
    /// `prompts.db` in the platform cache directory.
    pub fn cache_db_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cache.path {
            return Some(path.clone());
        }
        directories::ProjectDirs::from("", "", "imprint")
            .map(|dirs| dirs.cache_dir().join("prompts.db"))
    }

    /// Range-check loaded values, clamping where a clamp is the documented
    /// behavior and rejecting where it isn't.
    fn validated(mut self) -> Result<Self> {
        let wanted = self.concurrency;
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        if self.concurrency != wanted {
            debug!(wanted, clamped = self.concurrency, "concurrency clamped");
        }
        if self.timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("timeout_ms must be nonzero"));
        }
        if self.sniff_timeout_ms > self.timeout_ms {
            exn::bail!(ErrorKind::Invalid("sniff timeout exceeds overall timeout"));
        }
        if self.resolver.label_length_threshold == 0 {
            exn::bail!(ErrorKind::Invalid("label_length_threshold must be nonzero"));
        }
        Ok(self)
    }
}
