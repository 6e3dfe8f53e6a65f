use gemini_live::{
    CredentialMode, LiveConfig,
    config::{DEFAULT_ENDPOINT, DEFAULT_MODEL},
    risk::DEFAULT_DANGER_THRESHOLD,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub gemini_api_key: SecretString,
    pub model: String,
    pub endpoint: String,
    pub credential: CredentialMode,
    pub prompt_path: Option<PathBuf>,
    pub accumulate_fragments: bool,
    pub danger_threshold: i32,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let endpoint =
            std::env::var("GEMINI_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let credential_str =
            std::env::var("GEMINI_CREDENTIAL").unwrap_or_else(|_| "header".to_string());
        let credential = match credential_str.to_lowercase().as_str() {
            "header" => CredentialMode::Header,
            "query" => CredentialMode::Query,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "GEMINI_CREDENTIAL".to_string(),
                    format!("'{}' is not one of 'header' or 'query'", credential_str),
                ));
            }
        };

        let prompt_path = std::env::var("SENTINEL_PROMPT_PATH").ok().map(PathBuf::from);

        let accumulate_fragments = match std::env::var("SENTINEL_ACCUMULATE_FRAGMENTS") {
            Ok(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SENTINEL_ACCUMULATE_FRAGMENTS".to_string(),
                    format!("'{}' is not a boolean", value),
                )
            })?,
            Err(_) => false,
        };

        let danger_threshold = match std::env::var("SENTINEL_DANGER_THRESHOLD") {
            Ok(value) => value.trim().parse::<i32>().map_err(|e| {
                ConfigError::InvalidValue("SENTINEL_DANGER_THRESHOLD".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_DANGER_THRESHOLD,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            gemini_api_key,
            model,
            endpoint,
            credential,
            prompt_path,
            accumulate_fragments,
            danger_threshold,
            log_level,
        })
    }

    /// Builds the client configuration, reading the instruction override if one is set.
    pub fn to_live_config(&self) -> Result<LiveConfig, ConfigError> {
        let mut live = LiveConfig::new(self.gemini_api_key.expose_secret())
            .with_endpoint(&self.endpoint)
            .with_model(&self.model)
            .with_credential(self.credential)
            .with_fragment_accumulation(self.accumulate_fragments);

        if let Some(path) = &self.prompt_path {
            let instruction = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidValue(
                    "SENTINEL_PROMPT_PATH".to_string(),
                    format!("{}: {}", path.display(), e),
                )
            })?;
            live = live.with_instruction(instruction.trim());
        }
        Ok(live)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_live::config::FRAUD_ANALYSIS_PROMPT;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("GEMINI_MODEL");
            env::remove_var("GEMINI_ENDPOINT");
            env::remove_var("GEMINI_CREDENTIAL");
            env::remove_var("SENTINEL_PROMPT_PATH");
            env::remove_var("SENTINEL_ACCUMULATE_FRAGMENTS");
            env::remove_var("SENTINEL_DANGER_THRESHOLD");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.gemini_api_key.expose_secret(), "test-gemini-key");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.credential, CredentialMode::Header);
        assert_eq!(config.prompt_path, None);
        assert!(!config.accumulate_fragments);
        assert_eq!(config.danger_threshold, 85);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("GEMINI_MODEL", "models/custom");
            env::set_var("GEMINI_ENDPOINT", "ws://localhost:9000/live");
            env::set_var("GEMINI_CREDENTIAL", "Query");
            env::set_var("SENTINEL_PROMPT_PATH", "/custom/prompt.md");
            env::set_var("SENTINEL_ACCUMULATE_FRAGMENTS", "yes");
            env::set_var("SENTINEL_DANGER_THRESHOLD", "70");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.model, "models/custom");
        assert_eq!(config.endpoint, "ws://localhost:9000/live");
        assert_eq!(config.credential, CredentialMode::Query);
        assert_eq!(config.prompt_path, Some(PathBuf::from("/custom/prompt.md")));
        assert!(config.accumulate_fragments);
        assert_eq!(config.danger_threshold, 70);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "GEMINI_API_KEY"),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        for (var, value) in [
            ("GEMINI_CREDENTIAL", "cookie"),
            ("SENTINEL_ACCUMULATE_FRAGMENTS", "maybe"),
            ("SENTINEL_DANGER_THRESHOLD", "high"),
            ("RUST_LOG", "not-a-level"),
        ] {
            clear_env_vars();
            set_minimal_env();
            unsafe {
                env::set_var(var, value);
            }

            let err = Config::from_env().unwrap_err();
            match err {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                _ => panic!("Expected InvalidValue for {var}"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_live_config_uses_prompt_override() {
        clear_env_vars();
        set_minimal_env();
        let mut prompt = tempfile::NamedTempFile::new().unwrap();
        writeln!(prompt, "Flag anyone asking for gift cards.").unwrap();
        unsafe {
            env::set_var("SENTINEL_PROMPT_PATH", prompt.path());
            env::set_var("SENTINEL_ACCUMULATE_FRAGMENTS", "true");
        }

        let live = Config::from_env().unwrap().to_live_config().unwrap();

        assert_eq!(live.instruction, "Flag anyone asking for gift cards.");
        assert!(live.accumulate_fragments);
        assert_eq!(live.api_key.expose_secret(), "test-gemini-key");
    }

    #[test]
    #[serial]
    fn test_live_config_defaults_and_missing_prompt() {
        clear_env_vars();
        set_minimal_env();

        let live = Config::from_env().unwrap().to_live_config().unwrap();
        assert_eq!(live.instruction, FRAUD_ANALYSIS_PROMPT);

        unsafe {
            env::set_var("SENTINEL_PROMPT_PATH", "/nonexistent/sentinel/prompt.md");
        }
        let err = Config::from_env().unwrap().to_live_config().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SENTINEL_PROMPT_PATH"),
            _ => panic!("Expected InvalidValue for SENTINEL_PROMPT_PATH"),
        }
    }
}
