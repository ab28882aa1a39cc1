//! Unified error type for the component framework.
//!
//! Variants follow the error taxonomy of the framework: storage failures, framework
//! misuse detected while declaring components, expected runtime outcomes of awaiting a
//! component, and internal contract violations which should be reported as bugs.

use thiserror::Error;

/// Errors produced by the component framework and the bot built on top of it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Storage failure, the surrounding transaction has been rolled back.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The framework was used incorrectly while declaring or creating components.
    #[error("Invalid usage: {message}")]
    User {
        /// Description of the misuse
        message: String,
    },

    /// A framework invariant was broken, this is a bug and should be reported.
    #[error("Internal error, please report this: {message}")]
    Internal {
        /// Description of the violated contract
        message: String,
    },

    /// The awaited component was deleted (or timed out) before anyone interacted with it.
    #[error("Component {component_id} was deleted before being used")]
    ComponentDeleted {
        /// Internal id of the awaited component
        component_id: i32,
    },

    /// Waiting on a component exceeded the caller supplied duration.
    #[error("Timed out while waiting on component {component_id}")]
    AwaitTimeout {
        /// Internal id of the awaited component
        component_id: i32,
    },

    /// A component handler reported a failure.
    #[error("Handler error: {message}")]
    Handler {
        /// Failure reported by the handler
        message: String,
    },

    /// JSON (de)serialization of an array column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required environment variable is missing or invalid.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Serenity/Poise framework error.
    #[error("Discord error: {0}")]
    Discord(Box<poise::serenity_prelude::Error>),
}

impl Error {
    /// Shorthand for [`Error::User`].
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Handler`].
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Discord(Box::new(value))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
