use crate::address::is_valid_address;
use crate::error::AppError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Source of the creator's active address.
pub trait WalletProvider {
    fn name(&self) -> &'static str;
    fn active_address(&self) -> Result<String, AppError>;
}

/// Address supplied directly through config or flags.
pub struct StaticWallet {
    address: String,
}

impl StaticWallet {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl WalletProvider for StaticWallet {
    fn name(&self) -> &'static str {
        "static"
    }

    fn active_address(&self) -> Result<String, AppError> {
        let address = self.address.trim();
        if !is_valid_address(address) {
            return Err(AppError::Validation(format!(
                "Configured wallet address '{address}' is not a valid address"
            )));
        }
        Ok(address.to_string())
    }
}

/// Arweave JWK keyfile. The address is the SHA-256 of the RSA modulus.
pub struct KeyfileWallet {
    path: PathBuf,
}

#[derive(Deserialize)]
struct Jwk {
    kty: String,
    n: String,
}

impl KeyfileWallet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WalletProvider for KeyfileWallet {
    fn name(&self) -> &'static str {
        "keyfile"
    }

    fn active_address(&self) -> Result<String, AppError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AppError::Config(format!("Cannot read keyfile {}: {e}", self.path.display()))
        })?;
        let jwk: Jwk = serde_json::from_str(&content)?;
        address_from_jwk(&jwk)
    }
}

fn address_from_jwk(jwk: &Jwk) -> Result<String, AppError> {
    if jwk.kty != "RSA" {
        return Err(AppError::Validation(format!(
            "Unsupported key type '{}', expected RSA",
            jwk.kty
        )));
    }
    let modulus = URL_SAFE_NO_PAD
        .decode(jwk.n.trim_end_matches('='))
        .map_err(|e| AppError::Validation(format!("Keyfile modulus is not base64url: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(&modulus)))
}
