use crate::error::AppError;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Length of a base64url-encoded SHA-256 digest, which is what a wallet address is.
pub const ADDRESS_LEN: usize = 43;

/// Check a candidate wallet address. Surrounding whitespace is ignored.
pub fn is_valid_address(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    trimmed.len() == ADDRESS_LEN
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Split newline-delimited whitelist text into trimmed, non-empty, de-duplicated
/// entries. First occurrence wins, so the order the creator typed is kept.
pub fn parse_whitelist(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Reject the whole list if any entry is malformed, naming every offender at once.
pub fn validate_whitelist(addresses: &[String]) -> Result<(), AppError> {
    let invalid = invalid_addresses(addresses);
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Please fix invalid addresses: {}",
            invalid.join(", ")
        )))
    }
}

fn invalid_addresses(addresses: &[String]) -> Vec<&str> {
    addresses
        .iter()
        .filter(|a| !is_valid_address(a))
        .map(String::as_str)
        .collect()
}

/// A single line of a whitelist preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    pub address: String,
    pub valid: bool,
}

/// Live classification of whitelist text, entry by entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WhitelistPreview {
    pub entries: Vec<PreviewEntry>,
}

impl WhitelistPreview {
    pub fn from_text(text: &str) -> Self {
        let entries = parse_whitelist(text)
            .into_iter()
            .map(|address| PreviewEntry {
                valid: is_valid_address(&address),
                address,
            })
            .collect();
        Self { entries }
    }

    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.entries.len() - self.valid_count()
    }

    pub fn is_submittable(&self) -> bool {
        self.invalid_count() == 0
    }
}

/// Load a bulk whitelist file (a JSON array of address strings) and flatten it
/// into the newline-delimited form used by the create and edit forms.
pub fn import_whitelist_file(path: &Path) -> Result<String, AppError> {
    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| AppError::Validation(format!("Error parsing JSON file: {e}")))?;

    let Some(items) = value.as_array() else {
        return Err(AppError::Validation(
            "Invalid JSON format: Must be an array of addresses.".into(),
        ));
    };

    let mut addresses = Vec::with_capacity(items.len());
    let mut invalid = Vec::new();
    for item in items {
        match item.as_str() {
            Some(s) if is_valid_address(s) => addresses.push(s.trim().to_string()),
            Some(s) => invalid.push(s.to_string()),
            None => invalid.push(item.to_string()),
        }
    }

    if !invalid.is_empty() {
        return Err(AppError::Validation(format!(
            "Invalid addresses found in file: {}",
            invalid.join(", ")
        )));
    }

    Ok(addresses.join("\n"))
}
