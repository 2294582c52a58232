use crate::error::AppError;
use crate::topup::DEFAULT_FEE_RATE;
use crate::wallet::{KeyfileWallet, StaticWallet, WalletProvider};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Settings file contents. Every field is optional so a partial file only
/// overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub fee_rate: Option<f64>,
    pub wallet_address: Option<String>,
    pub keyfile: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn merge(&mut self, other: ConfigFile) {
        if other.server_url.is_some() {
            self.server_url = other.server_url;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.fee_rate.is_some() {
            self.fee_rate = other.fee_rate;
        }
        if other.wallet_address.is_some() {
            self.wallet_address = other.wallet_address;
        }
        if other.keyfile.is_some() {
            self.keyfile = other.keyfile;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
    }

    fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_url: lookup("POOL_ADMIN_SERVER_URL"),
            api_key: lookup("POOL_ADMIN_API_KEY"),
            fee_rate: None,
            wallet_address: lookup("POOL_ADMIN_WALLET_ADDRESS"),
            keyfile: lookup("POOL_ADMIN_KEYFILE").map(PathBuf::from),
            request_timeout_secs: None,
        }
    }
}

/// Resolved configuration used by the client and the commands.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: Option<String>,
    pub api_key: String,
    pub fee_rate: f64,
    pub wallet_address: Option<String>,
    pub keyfile: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Layered load: file (explicit path, else the default location if it
    /// exists), then environment, then `overrides` from the command line.
    pub fn load(path: Option<&Path>, overrides: ConfigFile) -> Result<Self, AppError> {
        let mut layered = match path {
            Some(p) => read_file(p)?,
            None => match default_path() {
                Some(p) if p.exists() => read_file(&p)?,
                _ => ConfigFile::default(),
            },
        };
        layered.merge(ConfigFile::from_env(|k| std::env::var(k).ok()));
        layered.merge(overrides);
        Self::resolve(layered)
    }

    pub fn resolve(file: ConfigFile) -> Result<Self, AppError> {
        let fee_rate = file.fee_rate.unwrap_or(DEFAULT_FEE_RATE);
        if !(0.0..1.0).contains(&fee_rate) {
            return Err(AppError::Config(format!(
                "fee_rate must be in [0, 1), got {fee_rate}"
            )));
        }
        Ok(Self {
            server_url: file
                .server_url
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            api_key: file.api_key.unwrap_or_default(),
            fee_rate,
            wallet_address: file.wallet_address.filter(|s| !s.trim().is_empty()),
            keyfile: file.keyfile,
            request_timeout_secs: file.request_timeout_secs,
        })
    }

    /// Server URL, required before any network call.
    pub fn require_server_url(&self) -> Result<&str, AppError> {
        let raw = self
            .server_url
            .as_deref()
            .ok_or_else(|| AppError::Precondition("Server URL is missing.".into()))?;
        let parsed = Url::parse(raw)
            .map_err(|e| AppError::Config(format!("Invalid server URL '{raw}': {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(raw),
            other => Err(AppError::Config(format!(
                "Server URL must be http or https, got '{other}'"
            ))),
        }
    }

    /// Pick the wallet strategy: a keyfile wins over a bare address.
    pub fn wallet_provider(&self) -> Option<Box<dyn WalletProvider>> {
        if let Some(path) = &self.keyfile {
            return Some(Box::new(KeyfileWallet::new(path.clone())));
        }
        self.wallet_address
            .as_ref()
            .map(|a| Box::new(StaticWallet::new(a.clone())) as Box<dyn WalletProvider>)
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pool-admin").join("config.toml"))
}

fn read_file(path: &Path) -> Result<ConfigFile, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Cannot read config {}: {e}", path.display()))
    })?;
    Ok(toml::from_str(&content)?)
}
