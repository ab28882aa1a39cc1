//! Central handling of errors escaping component handlers.

use crate::core::interaction::ComponentInteraction;
use crate::errors::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

/// Application hook notified of every unhandled error, after it was logged.
#[async_trait]
pub trait GlobalExceptionHandler: Send + Sync {
    /// `context` describes where the error happened.
    async fn handle(&self, context: &str, error: &Error);
}

/// Logs unhandled errors, forwards them to the [`GlobalExceptionHandler`] and tells the
/// user something went wrong.
pub struct ExceptionHandler {
    global_handler: Option<Arc<dyn GlobalExceptionHandler>>,
    general_error_message: String,
}

impl ExceptionHandler {
    /// Creates a handler replying `general_error_message` to failed interactions.
    pub fn new(
        global_handler: Option<Arc<dyn GlobalExceptionHandler>>,
        general_error_message: impl Into<String>,
    ) -> Self {
        Self {
            global_handler,
            general_error_message: general_error_message.into(),
        }
    }

    /// Handles an error raised while processing an interaction.
    pub async fn handle_interaction_error(
        &self,
        interaction: &dyn ComponentInteraction,
        component_id: Option<i32>,
        error: &Error,
    ) {
        let context = format!(
            "component interaction (message: {}, component: {}, custom id: '{}')",
            interaction.message_link().as_deref().unwrap_or("unknown"),
            component_id.map_or_else(|| "unknown".to_string(), |id| id.to_string()),
            interaction.custom_id()
        );
        error!("Unhandled exception in {context}: {error}");

        if let Some(global_handler) = &self.global_handler {
            global_handler.handle(&context, error).await;
        }

        if !interaction.is_acknowledged() {
            if let Err(reply_error) = interaction.reply_ephemeral(&self.general_error_message).await {
                warn!("Could not send the error message of a failed component interaction: {reply_error}");
            }
        }
    }

    /// Handles an error raised while processing a timeout.
    pub async fn handle_timeout_error(&self, component_id: i32, error: &Error) {
        let context = format!("timeout of component {component_id}");
        error!("Unhandled exception in {context}: {error}");

        if let Some(global_handler) = &self.global_handler {
            global_handler.handle(&context, error).await;
        }
    }
}
