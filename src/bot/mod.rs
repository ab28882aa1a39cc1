//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for the ComponentBuddy application,
//! including the slash commands, the persistent component handlers, and the routing of
//! component interactions to the component framework.

/// Discord command implementations (demo, general)
pub mod commands;
/// Buttons and select menus backed by stored components
pub mod components;
/// Persistent component handlers
pub mod handlers;
/// serenity adapter of component interactions
pub mod interaction;

use crate::core::controller::ComponentController;
use crate::core::listener::ComponentsListener;
use crate::core::service::ComponentsService;
use crate::errors::{Error, Result};
use interaction::SerenityComponentInteraction;
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to all bot commands.
/// This structure holds the database connection and the component framework.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// Creates, deletes and awaits components
    pub components: Arc<ComponentController>,
    service: ComponentsService,
}

impl BotData {
    /// Creates a new `BotData` instance owning the running component framework.
    #[must_use]
    pub fn new(database: DatabaseConnection, service: ComponentsService) -> Self {
        Self {
            database,
            components: Arc::clone(service.controller()),
            service,
        }
    }

    /// Receives component interactions.
    #[must_use]
    pub const fn listener(&self) -> &Arc<ComponentsListener> {
        self.service.listener()
    }
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {error}");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {error}", ctx.command().name);
            if let Err(e) = ctx.say(format!("An error occurred: {error}")).await {
                error!("Failed to send error message: {e}");
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}

/// Hands component interactions to the component framework.
#[allow(clippy::unused_async)]
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    if let serenity::FullEvent::InteractionCreate {
        interaction: serenity::Interaction::Component(component),
    } = event
    {
        data.listener()
            .on_component_interaction(Arc::new(SerenityComponentInteraction::new(
                Arc::clone(&ctx.http),
                component.clone(),
            )));
    }
    Ok(())
}

/// Connects to Discord and runs until the gateway connection ends.
#[instrument(skip_all)]
pub async fn run_bot(
    token: String,
    database: DatabaseConnection,
    service: ComponentsService,
) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::help(),
                commands::greet(),
                commands::color(),
                commands::confirm(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(BotData::new(database, service))
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {e}"))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {e}"))?;
    Ok(())
}
