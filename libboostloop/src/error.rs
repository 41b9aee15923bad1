//! Error types for Boostloop

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoostError>;

#[derive(Error, Debug)]
pub enum BoostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Too many failed cycles: {errors} errors exceeds the limit of {threshold}")]
    CircuitOpen { errors: u32, threshold: u32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BoostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BoostError::InvalidInput(_) => 3,
            BoostError::Platform(PlatformError::Authentication(_)) => 2,
            BoostError::Config(_) => 2,
            BoostError::Platform(_) => 1,
            BoostError::Store(_) => 1,
            BoostError::CircuitOpen { .. } => 1,
        }
    }

    /// Whether this error means the session itself is unusable
    pub fn is_authentication(&self) -> bool {
        matches!(self, BoostError::Platform(PlatformError::Authentication(_)))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request rejected: {0}")]
    Request(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = BoostError::InvalidInput("bad interval".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = BoostError::Platform(PlatformError::Authentication("expired".to_string()));
        assert_eq!(error.exit_code(), 2);
        assert!(error.is_authentication());
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = BoostError::Config(ConfigError::MissingField("BSKY_IDENTIFIER".to_string()));
        assert_eq!(error.exit_code(), 2);
        assert!(!error.is_authentication());
    }

    #[test]
    fn test_exit_code_circuit_open() {
        let error = BoostError::CircuitOpen {
            errors: 11,
            threshold: 10,
        };
        assert_eq!(error.exit_code(), 1);
        assert_eq!(
            error.to_string(),
            "Too many failed cycles: 11 errors exceeds the limit of 10"
        );
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        for err in [
            PlatformError::Request("x".to_string()),
            PlatformError::Action("x".to_string()),
            PlatformError::Network("x".to_string()),
            PlatformError::RateLimit("x".to_string()),
            PlatformError::Decode("x".to_string()),
        ] {
            assert_eq!(BoostError::Platform(err).exit_code(), 1);
        }
    }

    #[test]
    fn test_error_message_formatting() {
        let error = BoostError::Platform(PlatformError::Network("connection reset".to_string()));
        assert_eq!(
            error.to_string(),
            "Platform error: Network error: connection reset"
        );

        let error = BoostError::Config(ConfigError::MissingField("BSKY_PASSWORD".to_string()));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: BSKY_PASSWORD"
        );
    }

    #[test]
    fn test_store_write_error_includes_path() {
        let error = StoreError::Write {
            path: "/tmp/store/following.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let message = error.to_string();
        assert!(message.contains("following.json"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let err: BoostError = PlatformError::Action("follow failed".to_string()).into();
        match err {
            BoostError::Platform(PlatformError::Action(msg)) => assert_eq!(msg, "follow failed"),
            _ => panic!("Expected BoostError::Platform"),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::RateLimit("slow down".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
