//! serenity implementation of [`ComponentInteraction`].

use crate::core::interaction::{ComponentInteraction, InteractionKind};
use crate::errors::Result;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A component interaction received from the gateway.
pub struct SerenityComponentInteraction {
    http: Arc<serenity::Http>,
    interaction: serenity::ComponentInteraction,
    acknowledged: AtomicBool,
}

impl SerenityComponentInteraction {
    /// Wraps an interaction, replies go through `http`.
    #[must_use]
    pub const fn new(http: Arc<serenity::Http>, interaction: serenity::ComponentInteraction) -> Self {
        Self {
            http,
            interaction,
            acknowledged: AtomicBool::new(false),
        }
    }

    /// The raw serenity interaction.
    #[must_use]
    pub const fn inner(&self) -> &serenity::ComponentInteraction {
        &self.interaction
    }

    /// Discord HTTP client.
    #[must_use]
    pub const fn http(&self) -> &Arc<serenity::Http> {
        &self.http
    }

    /// Sends the initial response and marks the interaction acknowledged.
    ///
    /// Handlers responding with anything other than an ephemeral message should go
    /// through here, so that failures raised afterwards are not answered twice.
    pub async fn create_response(&self, response: serenity::CreateInteractionResponse) -> Result<()> {
        self.interaction
            .create_response(self.http.as_ref(), response)
            .await?;
        self.mark_acknowledged();
        Ok(())
    }
}

#[async_trait]
impl ComponentInteraction for SerenityComponentInteraction {
    fn custom_id(&self) -> &str {
        &self.interaction.data.custom_id
    }

    fn kind(&self) -> InteractionKind {
        match self.interaction.data.kind {
            serenity::ComponentInteractionDataKind::Button => InteractionKind::Button,
            serenity::ComponentInteractionDataKind::StringSelect { .. } => {
                InteractionKind::StringSelect
            }
            _ => InteractionKind::EntitySelect,
        }
    }

    fn user_id(&self) -> u64 {
        self.interaction.user.id.get()
    }

    fn member_roles(&self) -> Vec<u64> {
        self.interaction
            .member
            .as_ref()
            .map(|member| member.roles.iter().copied().map(serenity::RoleId::get).collect())
            .unwrap_or_default()
    }

    fn member_permissions(&self) -> Option<u64> {
        self.interaction
            .member
            .as_ref()
            .and_then(|member| member.permissions)
            .map(|permissions| permissions.bits())
    }

    fn values(&self) -> Vec<String> {
        use serenity::ComponentInteractionDataKind as Kind;

        match &self.interaction.data.kind {
            Kind::StringSelect { values } => values.clone(),
            Kind::UserSelect { values } => values.iter().map(ToString::to_string).collect(),
            Kind::RoleSelect { values } => values.iter().map(ToString::to_string).collect(),
            Kind::ChannelSelect { values } => values.iter().map(ToString::to_string).collect(),
            Kind::MentionableSelect { values } => values.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }

    fn message_link(&self) -> Option<String> {
        Some(self.interaction.message.link())
    }

    fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    fn mark_acknowledged(&self) {
        self.acknowledged.store(true, Ordering::SeqCst);
    }

    async fn reply_ephemeral(&self, content: &str) -> Result<()> {
        self.create_response(serenity::CreateInteractionResponse::Message(
            serenity::CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        ))
        .await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
