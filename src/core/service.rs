//! Components service - Startup wiring of the component framework.
//!
//! Startup runs in this order:
//! 1. ephemeral components are purged from the database and the in-memory registries,
//! 2. persisted timeouts are re-scheduled,
//! 3. the timeout loop is spawned.

use crate::config::components::ComponentsConfig;
use crate::core::controller::ComponentController;
use crate::core::exceptions::GlobalExceptionHandler;
use crate::core::filters::FilterRegistry;
use crate::core::handlers::{EphemeralComponentHandlers, EphemeralTimeoutHandlers, HandlerRegistry};
use crate::core::listener::ComponentsListener;
use crate::core::ratelimit::{RateLimitContainer, RateLimiter};
use crate::core::repository::ComponentRepository;
use crate::core::timeout::ComponentTimeoutManager;
use crate::errors::Result;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// Collects the registries needed to start a [`ComponentsService`].
pub struct ComponentsServiceBuilder {
    db: DatabaseConnection,
    config: ComponentsConfig,
    handlers: HandlerRegistry,
    filters: FilterRegistry,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    global_exception_handler: Option<Arc<dyn GlobalExceptionHandler>>,
}

impl ComponentsServiceBuilder {
    /// Starts from a database with its tables created.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: ComponentsConfig) -> Self {
        Self {
            db,
            config,
            handlers: HandlerRegistry::default(),
            filters: FilterRegistry::default(),
            rate_limiter: None,
            global_exception_handler: None,
        }
    }

    /// Persistent handlers.
    #[must_use]
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Filters and rejection handler.
    #[must_use]
    pub fn filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// Replaces the rate limiter built from the configured buckets.
    #[must_use]
    pub fn rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Hook notified of unhandled errors.
    #[must_use]
    pub fn global_exception_handler(mut self, handler: Arc<dyn GlobalExceptionHandler>) -> Self {
        self.global_exception_handler = Some(handler);
        self
    }

    /// Cleans up leftovers of the previous run and starts processing timeouts.
    #[instrument(skip_all)]
    pub async fn start(self) -> Result<ComponentsService> {
        let rate_limiter: Arc<dyn RateLimiter> = match self.rate_limiter {
            Some(rate_limiter) => rate_limiter,
            None => Arc::new(RateLimitContainer::from_config(&self.config)?),
        };

        let ephemeral_handlers = Arc::new(EphemeralComponentHandlers::default());
        let ephemeral_timeout_handlers = Arc::new(EphemeralTimeoutHandlers::default());
        let repository = ComponentRepository::new(
            self.db,
            Arc::new(self.filters),
            Arc::clone(&ephemeral_handlers),
            Arc::clone(&ephemeral_timeout_handlers),
        );

        repository.cleanup_ephemeral().await?;
        ephemeral_handlers.clear();
        ephemeral_timeout_handlers.clear();

        let (timeout_manager, receiver) = ComponentTimeoutManager::new();
        let timeout_manager = Arc::new(timeout_manager);
        repository
            .schedule_existing_timeouts(timeout_manager.as_ref())
            .await?;

        let controller = Arc::new(ComponentController::new(
            repository,
            timeout_manager,
            rate_limiter,
        ));
        let listener = Arc::new(ComponentsListener::new(
            Arc::clone(&controller),
            Arc::new(self.handlers),
            Arc::new(self.config),
            self.global_exception_handler,
        ));
        let timeout_task = tokio::spawn(Arc::clone(&listener).run_timeout_loop(receiver));

        info!("Components service started");
        Ok(ComponentsService {
            controller,
            listener,
            timeout_task,
        })
    }
}

/// The running component framework.
pub struct ComponentsService {
    controller: Arc<ComponentController>,
    listener: Arc<ComponentsListener>,
    timeout_task: JoinHandle<()>,
}

impl ComponentsService {
    /// Creates, deletes and awaits components.
    #[must_use]
    pub const fn controller(&self) -> &Arc<ComponentController> {
        &self.controller
    }

    /// Receives component interactions.
    #[must_use]
    pub const fn listener(&self) -> &Arc<ComponentsListener> {
        &self.listener
    }
}

impl Drop for ComponentsService {
    fn drop(&mut self) {
        self.timeout_task.abort();
    }
}
