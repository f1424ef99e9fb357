use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration field '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Malformed configuration: {0}")]
    Parse(String),

    #[error("Unable to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn from_serde(error: serde_json::Error) -> Self {
        let message = error.to_string();
        if message.starts_with("unknown field") || message.starts_with("unknown variant") {
            ConfigError::UnknownKey(message)
        } else {
            ConfigError::Parse(message)
        }
    }
}
