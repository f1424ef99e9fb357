use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Invalid target '{0}': expected an http(s) URL")]
    InvalidTarget(String),

    #[error("Target {target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("Target {target} returned an unexpected response: {reason}")]
    InvalidResponse { target: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}
