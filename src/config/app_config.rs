use serde::Deserialize;
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::core::errors::{PgpipeError, Result};
use crate::core::models::key_material::Credentials;
use crate::core::models::operation::ContentKind;
use crate::core::services::payload_adapter::BatchDefaults;

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pgpipe.toml";

/// Environment variable read for the passphrase unless configured otherwise.
pub const DEFAULT_PASSPHRASE_ENV: &str = "PGPIPE_PASSPHRASE";

/// Top-level pgpipe configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub credentials: CredentialsSection,
    pub batch: BatchSection,

    /// Directory relative key and attachment paths are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// The `[credentials]` section.
///
/// Each key may be given inline or as a file, not both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsSection {
    pub public_key: Option<String>,
    pub public_key_file: Option<PathBuf>,
    pub private_key: Option<String>,
    pub private_key_file: Option<PathBuf>,
    /// Name of the variable holding the passphrase.
    pub passphrase_env: Option<String>,
}

/// The `[batch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text_field: Option<String>,
    pub binary_property: Option<String>,
    pub output_property: Option<String>,
    pub continue_on_fail: bool,
    pub attachments_dir: Option<PathBuf>,
}

/// Credential values given on the command line. They win over the config.
#[derive(Debug, Default)]
pub struct CredentialOverrides {
    pub public_key_file: Option<PathBuf>,
    pub private_key_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load the configuration.
    ///
    /// Lookup order: `explicit`, `./pgpipe.toml`, the per-user
    /// `pgpipe/config.toml`, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(PgpipeError::InvalidConfig {
                    detail: format!("config file {} not found", path.display()),
                });
            }
            return Self::from_file(path);
        }

        match Self::discover() {
            Some(path) => Self::from_file(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join("pgpipe").join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Parse a config file. Relative paths inside it are resolved against
    /// the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content).map_err(|e| PgpipeError::InvalidConfig {
            detail: format!("Failed to parse {}: {e}", path.display()),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Build credentials from the config, CLI overrides and the environment.
    pub fn credentials(&self, overrides: CredentialOverrides) -> Result<Credentials> {
        self.credentials_with_env(overrides, |name| std::env::var(name).ok())
    }

    fn credentials_with_env(
        &self,
        overrides: CredentialOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials> {
        let section = &self.credentials;

        let public_key = match overrides.public_key_file {
            Some(path) => Some(read_key_file(&path, "public")?),
            None => self.configured_key(
                section.public_key.as_deref(),
                section.public_key_file.as_deref(),
                "public",
            )?,
        };

        let private_key = match overrides.private_key_file {
            Some(path) => Some(read_key_file(&path, "private")?),
            None => self.configured_key(
                section.private_key.as_deref(),
                section.private_key_file.as_deref(),
                "private",
            )?,
        };

        let passphrase_var = section
            .passphrase_env
            .as_deref()
            .unwrap_or(DEFAULT_PASSPHRASE_ENV);
        let passphrase = env(passphrase_var).map(SecretString::from);

        Ok(Credentials {
            public_key,
            private_key: private_key.map(SecretString::from),
            passphrase,
        })
    }

    fn configured_key(
        &self,
        inline: Option<&str>,
        file: Option<&Path>,
        role: &str,
    ) -> Result<Option<String>> {
        match (inline, file) {
            (Some(_), Some(_)) => Err(PgpipeError::InvalidConfig {
                detail: format!("set either {role}_key or {role}_key_file, not both"),
            }),
            (Some(key), None) => Ok(Some(key.to_string())),
            (None, Some(path)) => read_key_file(&self.resolve_path(path), role).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Batch defaults from `[batch]`, before CLI overrides.
    pub fn batch_defaults(&self) -> Result<BatchDefaults> {
        let mut defaults = BatchDefaults::default();
        let batch = &self.batch;

        if let Some(kind) = &batch.kind {
            defaults.kind = kind.parse::<ContentKind>()?;
        }
        if let Some(field) = &batch.text_field {
            defaults.text_field = field.clone();
        }
        if let Some(slot) = &batch.binary_property {
            defaults.binary_property = slot.clone();
        }
        defaults.output_property = batch.output_property.clone();

        Ok(defaults)
    }

    /// Configured attachments directory, resolved against the config file.
    pub fn attachments_dir(&self) -> Option<PathBuf> {
        self.batch
            .attachments_dir
            .as_deref()
            .map(|dir| self.resolve_path(dir))
    }
}

fn read_key_file(path: &Path, role: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| PgpipeError::InvalidConfig {
        detail: format!("cannot read {role} key file {}: {e}", path.display()),
    })
}
