/// Component framework configuration loading from config.toml
pub mod components;

/// Database configuration and connection management
pub mod database;
