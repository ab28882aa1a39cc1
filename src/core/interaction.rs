//! Framework-agnostic view of a component interaction.
//!
//! The dispatcher only needs a handful of facts about an interaction (who clicked, which
//! component, whether it was acknowledged) and a way to reply. Keeping that behind
//! [`ComponentInteraction`] lets the core run without a gateway connection; the serenity
//! adapter lives in [`crate::bot::interaction`].

use crate::core::ratelimit::CancellableRateLimit;
use crate::errors::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Kind of UI element that was interacted with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    /// A button was clicked
    Button,
    /// Values were picked in a string select menu
    StringSelect,
    /// Users, roles, channels or mentionables were picked in an entity select menu
    EntitySelect,
}

/// An incoming interaction on a message component.
#[async_trait]
pub trait ComponentInteraction: Send + Sync {
    /// The `custom_id` of the interacted UI element.
    fn custom_id(&self) -> &str;

    /// Kind of UI element.
    fn kind(&self) -> InteractionKind;

    /// Id of the interacting user.
    fn user_id(&self) -> u64;

    /// Role ids of the interacting member, empty outside of guilds.
    fn member_roles(&self) -> Vec<u64>;

    /// Raw permissions of the interacting member, `None` outside of guilds.
    fn member_permissions(&self) -> Option<u64>;

    /// Selected values, empty for buttons.
    fn values(&self) -> Vec<String>;

    /// Link to the message holding the component.
    fn message_link(&self) -> Option<String>;

    /// Whether the interaction has already been replied to or deferred.
    fn is_acknowledged(&self) -> bool;

    /// Records a reply or deferral sent without going through this trait.
    fn mark_acknowledged(&self);

    /// Replies with a message only the interacting user can see.
    async fn reply_ephemeral(&self, content: &str) -> Result<()>;

    /// Access to the concrete interaction, for handlers needing more than this trait offers.
    fn as_any(&self) -> &dyn Any;
}

/// The event handed to component handlers and to `await_component` callers.
///
/// Cloning is cheap, every waiter of a component and its group gets the same interaction.
#[derive(Clone)]
pub struct ComponentEvent {
    interaction: Arc<dyn ComponentInteraction>,
    component_id: i32,
    rate_limit: CancellableRateLimit,
}

impl ComponentEvent {
    /// Wraps an interaction on the component `component_id`.
    #[must_use]
    pub fn new(
        interaction: Arc<dyn ComponentInteraction>,
        component_id: i32,
        rate_limit: CancellableRateLimit,
    ) -> Self {
        Self {
            interaction,
            component_id,
            rate_limit,
        }
    }

    /// The underlying interaction.
    #[must_use]
    pub fn interaction(&self) -> &Arc<dyn ComponentInteraction> {
        &self.interaction
    }

    /// Internal id of the component that was interacted with.
    #[must_use]
    pub const fn component_id(&self) -> i32 {
        self.component_id
    }

    /// Id of the interacting user.
    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.interaction.user_id()
    }

    /// Selected values, empty for buttons.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        self.interaction.values()
    }

    /// Replies with a message only the interacting user can see.
    pub async fn reply_ephemeral(&self, content: &str) -> Result<()> {
        self.interaction.reply_ephemeral(content).await
    }

    /// Gives back the rate limit token consumed by this interaction.
    pub fn cancel_rate_limit(&self) {
        self.rate_limit.cancel_rate_limit();
    }
}

impl fmt::Debug for ComponentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEvent")
            .field("component_id", &self.component_id)
            .field("custom_id", &self.interaction.custom_id())
            .field("kind", &self.interaction.kind())
            .field("user_id", &self.interaction.user_id())
            .finish_non_exhaustive()
    }
}
