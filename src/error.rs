use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{message}{}", code_suffix(.code))]
    Api {
        message: String,
        code: Option<String>,
        status: u16,
    },
    #[error("Request failed: {0}")]
    Http(String),
    #[error("{0}")]
    Precondition(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal: {0}")]
    Internal(String),
}

fn code_suffix(code: &Option<String>) -> String {
    match code {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Http(e.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

// `--json` output renders errors as plain strings
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_appends_code_when_present() {
        let err = AppError::Api {
            message: "Invalid password".into(),
            code: Some("INVALID_PASSWORD".into()),
            status: 401,
        };
        assert_eq!(err.to_string(), "Invalid password (INVALID_PASSWORD)");
    }

    #[test]
    fn api_error_without_code_is_bare_message() {
        let err = AppError::Api {
            message: "Pool not found".into(),
            code: None,
            status: 404,
        };
        assert_eq!(err.to_string(), "Pool not found");
    }

    #[test]
    fn serializes_as_display_string() {
        let err = AppError::Validation("Passwords do not match.".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#""Passwords do not match.""#);
    }
}
