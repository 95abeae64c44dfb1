// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! runtree configuration.
//!
//! The configuration is layered: the defaults in `default-config.toml` (embedded in the binary)
//! are overridden by an optional user file, conventionally `.config/runtree.toml`.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    ingest::IngestOptions,
    serialize::ExportOptions,
    swap::SwapStore,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use swrite::{SWrite, swrite};
use tracing::warn;

/// The maximum supported value of `export.indent`.
pub const MAX_INDENT: usize = 16;

/// Handles warnings produced while reading the config.
pub trait ConfigWarnings {
    /// Called with the unknown keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs config warnings through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.extend(unknown.iter().map(String::as_str));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                swrite!(unknown_str, "\n  - {ignored_key}");
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

/// runtree configuration, merged from the defaults and an optional config file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunTreeConfig {
    unrooted_suite_name: String,
    export_indent: usize,
    swap_dir: Option<Utf8PathBuf>,
}

impl RunTreeConfig {
    /// The conventional location of the user config file, relative to the current directory.
    pub const CONFIG_PATH: &'static str = ".config/runtree.toml";

    /// The default config, as embedded in the binary.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Returns the default config.
    pub fn default_config() -> Self {
        Self::from_sources_with_warnings(None, &mut DefaultConfigWarnings)
            .expect("the embedded default config is always valid")
    }

    /// Reads the config, layering `config_file` (if any) on top of the defaults.
    ///
    /// Unknown keys are logged as warnings.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(config_file, &mut DefaultConfigWarnings)
    }

    /// Reads the config, reporting warnings to `warnings`.
    pub fn from_sources_with_warnings(
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let mut builder = Self::make_default_config();
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::new(config_file.as_str(), FileFormat::Toml));
        }

        let to_error = |kind| ConfigParseError::new(config_file.map(Utf8Path::to_owned), kind);
        let (deserialized, unknown) =
            Self::build_and_deserialize_config(&builder).map_err(to_error)?;
        if let Some(config_file) = config_file {
            if !unknown.is_empty() {
                warnings.unknown_config_keys(config_file, &unknown);
            }
        }

        deserialized.into_config().map_err(to_error)
    }

    /// Returns the display name of the unrooted-tests suite.
    pub fn unrooted_suite_name(&self) -> &str {
        &self.unrooted_suite_name
    }

    /// Returns the indentation width for exported documents.
    pub fn export_indent(&self) -> usize {
        self.export_indent
    }

    /// Returns the directory sessions are swapped out to, if configured.
    pub fn swap_dir(&self) -> Option<&Utf8Path> {
        self.swap_dir.as_deref()
    }

    /// Returns ingestion options derived from this config.
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            unrooted_suite_name: self.unrooted_suite_name.clone(),
        }
    }

    /// Returns export options derived from this config.
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            indent: self.export_indent,
        }
    }

    /// Returns the swap store, if a swap directory is configured.
    pub fn swap_store(&self) -> Option<SwapStore> {
        self.swap_dir.clone().map(SwapStore::new)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(RunTreeConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: RunTreeConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate also reports the key, so drop it for consistency.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunTreeConfigDeserialize {
    session: SessionConfigDeserialize,
    export: ExportConfigDeserialize,
    #[serde(default)]
    swap: SwapConfigDeserialize,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SessionConfigDeserialize {
    unrooted_suite_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ExportConfigDeserialize {
    indent: usize,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SwapConfigDeserialize {
    #[serde(default)]
    dir: Option<Utf8PathBuf>,
}

impl RunTreeConfigDeserialize {
    fn into_config(self) -> Result<RunTreeConfig, ConfigParseErrorKind> {
        let Self {
            session,
            export,
            swap,
        } = self;

        if session.unrooted_suite_name.trim().is_empty() {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "session.unrooted-suite-name",
                reason: "must not be empty".to_owned(),
            });
        }
        if export.indent > MAX_INDENT {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "export.indent",
                reason: format!("must be at most {MAX_INDENT}, found {}", export.indent),
            });
        }

        Ok(RunTreeConfig {
            unrooted_suite_name: session.unrooted_suite_name,
            export_indent: export.indent,
            swap_dir: swap.dir,
        })
    }
}
