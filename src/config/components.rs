//! Component framework configuration loading from config.toml
//!
//! Holds the bot owners (who bypass rate limits), the user-facing messages sent when an
//! interaction is rejected, and the named rate limit buckets components can refer to.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComponentsConfig {
    /// Discord user ids of the bot owners, owners are never rate limited
    pub owner_ids: Vec<u64>,
    /// Ephemeral replies sent when an interaction is rejected
    pub messages: DefaultMessages,
    /// Rate limit buckets, referenced by name from components
    pub rate_limits: Vec<RateLimitConfig>,
}

impl ComponentsConfig {
    /// Whether the given user is one of the bot owners.
    #[must_use]
    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

/// Messages replied (ephemerally) to users when an interaction cannot be processed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultMessages {
    /// The component no longer exists, or its handler changed shape
    pub component_expired: String,
    /// The user failed the component's constraints, or its filters could not be restored
    pub component_not_allowed: String,
    /// An uncaught error happened while handling the interaction
    pub general_error: String,
    /// The user is rate limited, `{seconds}` is replaced by the remaining delay
    pub rate_limited: String,
    /// A stored argument could not be turned back into a value
    pub invalid_argument: String,
}

impl Default for DefaultMessages {
    fn default() -> Self {
        Self {
            component_expired: "This component is no longer usable.".to_string(),
            component_not_allowed: "You are not allowed to use this component.".to_string(),
            general_error: "An unexpected error occurred while handling this interaction."
                .to_string(),
            rate_limited: "You are being rate limited, try again in {seconds} seconds."
                .to_string(),
            invalid_argument: "This component refers to data that no longer exists."
                .to_string(),
        }
    }
}

impl DefaultMessages {
    /// Formats [`DefaultMessages::rate_limited`] with the remaining delay.
    #[must_use]
    pub fn rate_limited_message(&self, seconds: u64) -> String {
        self.rate_limited.replace("{seconds}", &seconds.to_string())
    }
}

/// A named token bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Name referenced by components
    pub group: String,
    /// Maximum number of tokens per user
    pub capacity: u32,
    /// Seconds needed to regain one token
    pub refill_seconds: u64,
}

/// Loads the configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A field has the wrong type
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ComponentsConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_config(&contents)
}

/// Parses the configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<ComponentsConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the configuration from `./config.toml`, or the defaults if the file does not exist.
pub fn load_default_config() -> Result<ComponentsConfig> {
    let path = Path::new("config.toml");
    if !path.exists() {
        tracing::info!("No config.toml found, using default component configuration");
        return Ok(ComponentsConfig::default());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_components_config() {
        let toml_str = r#"
            owner_ids = [222078108977594368]

            [messages]
            component_expired = "Too late!"

            [[rate_limits]]
            group = "votes"
            capacity = 3
            refill_seconds = 10
        "#;

        let config = parse_config(toml_str).unwrap();
        assert!(config.is_owner(222_078_108_977_594_368));
        assert!(!config.is_owner(1));
        assert_eq!(config.messages.component_expired, "Too late!");
        // Unspecified messages keep their defaults
        assert_eq!(
            config.messages.general_error,
            DefaultMessages::default().general_error
        );
        assert_eq!(config.rate_limits.len(), 1);
        assert_eq!(config.rate_limits[0].group, "votes");
        assert_eq!(config.rate_limits[0].capacity, 3);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.owner_ids.is_empty());
        assert!(config.rate_limits.is_empty());
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let result = parse_config("owner_ids = \"nope\"");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rate_limited_message_formatting() {
        let messages = DefaultMessages::default();
        assert!(messages.rate_limited_message(5).contains("5 seconds"));
    }
}
