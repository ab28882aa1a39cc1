//! Shared test utilities for `ComponentBuddy`.
//!
//! This module provides an in-memory database, a scripted interaction and recording
//! doubles for the seams of the component framework.

use crate::{
    config::components::ComponentsConfig,
    core::{
        controller::ComponentController,
        exceptions::GlobalExceptionHandler,
        filters::{ComponentInteractionFilter, FilterRegistry},
        handlers::{EphemeralComponentHandlers, EphemeralTimeoutHandlers, HandlerRegistry},
        interaction::{ComponentInteraction, InteractionKind},
        listener::ComponentsListener,
        ratelimit::RateLimitContainer,
        repository::ComponentRepository,
        timeout::{ComponentTimeoutManager, TimeoutManager},
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedReceiver;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// An interaction whose replies are recorded instead of sent.
pub struct MockInteraction {
    custom_id: String,
    kind: InteractionKind,
    user_id: u64,
    roles: Vec<u64>,
    permissions: Option<u64>,
    values: Vec<String>,
    acknowledged: AtomicBool,
    replies: Mutex<Vec<String>>,
}

impl MockInteraction {
    /// A button click outside of a guild.
    pub fn button(custom_id: impl Into<String>, user_id: u64) -> Self {
        Self {
            custom_id: custom_id.into(),
            kind: InteractionKind::Button,
            user_id,
            roles: Vec::new(),
            permissions: None,
            values: Vec::new(),
            acknowledged: AtomicBool::new(false),
            replies: Mutex::new(Vec::new()),
        }
    }

    /// A string select menu submission.
    pub fn select(custom_id: impl Into<String>, user_id: u64, values: Vec<String>) -> Self {
        Self {
            kind: InteractionKind::StringSelect,
            values,
            ..Self::button(custom_id, user_id)
        }
    }

    /// Makes the user a guild member with these roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<u64>) -> Self {
        self.roles = roles;
        self
    }

    /// Makes the user a guild member with these permissions.
    #[must_use]
    pub const fn with_permissions(mut self, permissions: u64) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Every ephemeral reply sent so far.
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl ComponentInteraction for MockInteraction {
    fn custom_id(&self) -> &str {
        &self.custom_id
    }

    fn kind(&self) -> InteractionKind {
        self.kind
    }

    fn user_id(&self) -> u64 {
        self.user_id
    }

    fn member_roles(&self) -> Vec<u64> {
        self.roles.clone()
    }

    fn member_permissions(&self) -> Option<u64> {
        self.permissions
    }

    fn values(&self) -> Vec<String> {
        self.values.clone()
    }

    fn message_link(&self) -> Option<String> {
        Some("https://discord.com/channels/1/2/3".to_string())
    }

    fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    fn mark_acknowledged(&self) {
        self.acknowledged.store(true, Ordering::SeqCst);
    }

    async fn reply_ephemeral(&self, content: &str) -> Result<()> {
        self.mark_acknowledged();
        self.replies.lock().push(content.to_string());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lets only the listed users through.
pub struct AllowUsersFilter {
    name: String,
    users: Vec<u64>,
    global: bool,
}

impl AllowUsersFilter {
    pub fn new(name: &str, users: Vec<u64>) -> Self {
        Self {
            name: name.to_string(),
            users,
            global: false,
        }
    }

    /// Turns the filter into a global one.
    #[must_use]
    pub fn into_global(mut self) -> Self {
        self.global = true;
        self
    }
}

#[async_trait]
impl ComponentInteractionFilter for AllowUsersFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn global(&self) -> bool {
        self.global
    }

    async fn check(
        &self,
        interaction: &dyn ComponentInteraction,
        _handler_name: Option<&str>,
    ) -> Result<Option<String>> {
        if self.users.contains(&interaction.user_id()) {
            Ok(None)
        } else {
            Ok(Some(format!("Rejected by {}", self.name)))
        }
    }
}

/// Records schedules and removals without running any timer.
#[derive(Default)]
pub struct RecordingTimeoutManager {
    scheduled: Mutex<Vec<(i32, DateTime<Utc>)>>,
    removed: Mutex<Vec<i32>>,
}

impl RecordingTimeoutManager {
    pub fn scheduled(&self) -> Vec<(i32, DateTime<Utc>)> {
        self.scheduled.lock().clone()
    }

    pub fn removed(&self) -> Vec<i32> {
        self.removed.lock().clone()
    }
}

impl TimeoutManager for RecordingTimeoutManager {
    fn schedule_timeout(&self, component_id: i32, expiration: DateTime<Utc>) {
        self.scheduled.lock().push((component_id, expiration));
    }

    fn remove_timeouts(&self, component_id: i32, _throw_if_pending: bool) -> Result<()> {
        self.removed.lock().push(component_id);
        Ok(())
    }
}

/// Records `(context, error)` pairs.
#[derive(Default)]
pub struct RecordingExceptionHandler {
    recorded: Mutex<Vec<(String, String)>>,
}

impl RecordingExceptionHandler {
    pub fn recorded(&self) -> Vec<(String, String)> {
        self.recorded.lock().clone()
    }
}

#[async_trait]
impl GlobalExceptionHandler for RecordingExceptionHandler {
    async fn handle(&self, context: &str, error: &Error) {
        self.recorded
            .lock()
            .push((context.to_string(), error.to_string()));
    }
}

/// Creates a repository on a fresh database with empty registries.
pub async fn setup_test_repository() -> Result<ComponentRepository> {
    setup_test_repository_with(FilterRegistry::default()).await
}

async fn setup_test_repository_with(filters: FilterRegistry) -> Result<ComponentRepository> {
    let db = setup_test_db().await?;
    Ok(ComponentRepository::new(
        db,
        Arc::new(filters),
        Arc::new(EphemeralComponentHandlers::default()),
        Arc::new(EphemeralTimeoutHandlers::default()),
    ))
}

/// Creates a controller whose timeouts are only recorded.
pub async fn setup_test_controller() -> Result<(Arc<ComponentController>, Arc<RecordingTimeoutManager>)> {
    let repository = setup_test_repository().await?;
    let timeouts = Arc::new(RecordingTimeoutManager::default());
    let controller = ComponentController::new(
        repository,
        Arc::clone(&timeouts) as Arc<dyn TimeoutManager>,
        Arc::new(RateLimitContainer::empty()),
    );
    Ok((Arc::new(controller), timeouts))
}

/// Creates a listener whose timeouts are only recorded.
pub async fn setup_test_listener(
    handlers: HandlerRegistry,
    filters: FilterRegistry,
    config: ComponentsConfig,
) -> Result<ComponentsListener> {
    let repository = setup_test_repository_with(filters).await?;
    let controller = ComponentController::new(
        repository,
        Arc::new(RecordingTimeoutManager::default()),
        Arc::new(RateLimitContainer::from_config(&config)?),
    );
    Ok(ComponentsListener::new(
        Arc::new(controller),
        Arc::new(handlers),
        Arc::new(config),
        None,
    ))
}

/// Creates a listener reporting unhandled errors to `hook`.
pub async fn setup_test_listener_with_hook(
    handlers: HandlerRegistry,
    hook: Arc<dyn GlobalExceptionHandler>,
) -> Result<ComponentsListener> {
    let repository = setup_test_repository().await?;
    let controller = ComponentController::new(
        repository,
        Arc::new(RecordingTimeoutManager::default()),
        Arc::new(RateLimitContainer::empty()),
    );
    Ok(ComponentsListener::new(
        Arc::new(controller),
        Arc::new(handlers),
        Arc::new(ComponentsConfig::default()),
        Some(hook),
    ))
}

/// Creates a listener backed by real timers, with the receiver its timeout loop consumes.
pub async fn setup_test_listener_with_timeouts() -> Result<(ComponentsListener, UnboundedReceiver<i32>)> {
    let repository = setup_test_repository().await?;
    let (timeout_manager, receiver) = ComponentTimeoutManager::new();
    let controller = ComponentController::new(
        repository,
        Arc::new(timeout_manager),
        Arc::new(RateLimitContainer::empty()),
    );
    let listener = ComponentsListener::new(
        Arc::new(controller),
        Arc::new(HandlerRegistry::default()),
        Arc::new(ComponentsConfig::default()),
        None,
    );
    Ok((listener, receiver))
}
