//! TOML configuration with environment credential overrides.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! After parsing, the `CHROMADB_*` environment variables are layered on top
//! of the `[store]` section and the result is validated. The loaded
//! [`StoreConfig`] is what the store client receives; nothing downstream
//! reads the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Connection settings for the remote Chroma server.
#[derive(Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            tenant: default_tenant(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Keeps the password out of logs and error chains.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tenant", &self.tenant)
            .field("database", &self.database)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl StoreConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

fn default_scheme() -> String {
    "http".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_tenant() -> String {
    "default_tenant".to_string()
}
fn default_database() -> String {
    "default_database".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    #[serde(default = "default_input")]
    pub input: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub columns: ColumnMap,
    #[serde(default)]
    pub booleans: BooleanTokens,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            columns: ColumnMap::default(),
            booleans: BooleanTokens::default(),
        }
    }
}

fn default_input() -> PathBuf {
    PathBuf::from("data/user_rawdata.csv")
}
fn default_output() -> PathBuf {
    PathBuf::from("data/chromadb_ready.json")
}

/// Header names of the four required CSV columns.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    #[serde(default = "default_entity_column")]
    pub entity_id: String,
    #[serde(default = "default_category_column")]
    pub category: String,
    #[serde(default = "default_attribute_name_column")]
    pub attribute_name: String,
    #[serde(default = "default_attribute_value_column")]
    pub attribute_value: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            entity_id: default_entity_column(),
            category: default_category_column(),
            attribute_name: default_attribute_name_column(),
            attribute_value: default_attribute_value_column(),
        }
    }
}

fn default_entity_column() -> String {
    "客代".to_string()
}
fn default_category_column() -> String {
    "標籤分類1".to_string()
}
fn default_attribute_name_column() -> String {
    "標籤名稱".to_string()
}
fn default_attribute_value_column() -> String {
    "標籤值".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BooleanTokens {
    #[serde(default = "default_true_tokens")]
    pub true_tokens: Vec<String>,
    #[serde(default = "default_false_tokens")]
    pub false_tokens: Vec<String>,
}

impl Default for BooleanTokens {
    fn default() -> Self {
        Self {
            true_tokens: default_true_tokens(),
            false_tokens: default_false_tokens(),
        }
    }
}

fn default_true_tokens() -> Vec<String> {
    ["有", "是", "True", "true"].map(String::from).to_vec()
}
fn default_false_tokens() -> Vec<String> {
    ["無", "否", "False", "false"].map(String::from).to_vec()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_user_info")]
    pub user_info: String,
    #[serde(default = "default_product_info")]
    pub product_info: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            user_info: default_user_info(),
            product_info: default_product_info(),
        }
    }
}

fn default_user_info() -> String {
    "user_info".to_string()
}
fn default_product_info() -> String {
    "product_info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}

impl Config {
    /// Overlay `CHROMADB_HOST`, `CHROMADB_PORT`, `CHROMADB_USER` and
    /// `CHROMADB_PASSWORD` onto the store section.
    ///
    /// `lookup` abstracts the environment so callers (and tests) decide
    /// where the values come from.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CHROMADB_HOST") {
            self.store.host = host;
        }
        if let Some(port) = lookup("CHROMADB_PORT") {
            self.store.port = port
                .parse()
                .with_context(|| format!("CHROMADB_PORT is not a valid port: '{}'", port))?;
        }
        if let Some(user) = lookup("CHROMADB_USER") {
            self.store.username = Some(user);
        }
        if let Some(password) = lookup("CHROMADB_PASSWORD") {
            self.store.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.host.trim().is_empty() {
            bail!("store.host must not be empty");
        }
        if self.store.port == 0 {
            bail!("store.port must be > 0");
        }
        if self.store.timeout_secs == 0 {
            bail!("store.timeout_secs must be > 0");
        }
        match self.store.scheme.as_str() {
            "http" | "https" => {}
            other => bail!("store.scheme must be http or https, got '{}'", other),
        }
        if self.store.password.is_some() && self.store.username.is_none() {
            bail!("store.password is set but store.username is missing");
        }

        let columns = &self.normalize.columns;
        let names = [
            &columns.entity_id,
            &columns.category,
            &columns.attribute_name,
            &columns.attribute_value,
        ];
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                bail!("normalize.columns entries must not be empty");
            }
            if names[..i].contains(name) {
                bail!("normalize.columns maps '{}' to more than one field", name);
            }
        }

        let tokens = &self.normalize.booleans;
        if let Some(both) = tokens
            .true_tokens
            .iter()
            .find(|t| tokens.false_tokens.contains(t))
        {
            bail!(
                "normalize.booleans token '{}' is listed as both true and false",
                both
            );
        }

        if self.collections.user_info.trim().is_empty()
            || self.collections.product_info.trim().is_empty()
        {
            bail!("collection names must not be empty");
        }

        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        match self.embedding.provider.as_str() {
            "hash" => {}
            "openai" => {
                if self.embedding.model.is_none() {
                    bail!("embedding.model must be specified when provider is 'openai'");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hash or openai.",
                other
            ),
        }

        Ok(())
    }
}

/// Parse a config file, overlay the process environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    load_config_str(&content, |key| std::env::var(key).ok())
}

pub const DEFAULT_CONFIG_PATH: &str = "./config/psync.toml";

/// Load `path` if given; otherwise the default path when it exists, or
/// built-in defaults (still overlaid with the environment).
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(default)
            } else {
                tracing::debug!("no config file at {}; using defaults", DEFAULT_CONFIG_PATH);
                load_config_str("", |key| std::env::var(key).ok())
            }
        }
    }
}

/// Same as [`load_config`] but from an in-memory TOML string and an
/// explicit environment lookup.
pub fn load_config_str<F>(content: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}
