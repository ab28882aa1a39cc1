//! Components listener - Dispatches component interactions and timeouts.
//!
//! An interaction goes through these steps, any of which may stop it:
//! 1. the custom id is decoded, foreign ids are ignored,
//! 2. global filters run,
//! 3. the component is loaded, a missing component is reported as expired,
//! 4. constraints and component filters run,
//! 5. a rate limit token is taken,
//! 6. continuations of the group, then of the component, are resumed,
//! 7. one-use components are deleted with their group,
//! 8. the persistent or ephemeral handler runs.
//!
//! Elapsed timeouts are received from the [`ComponentTimeoutManager`] channel: the
//! component is deleted with its group, then its timeout handler runs.
//!
//! [`ComponentTimeoutManager`]: crate::core::timeout::ComponentTimeoutManager

use crate::config::components::ComponentsConfig;
use crate::core::controller::ComponentController;
use crate::core::data::{ComponentData, ComponentTimeout, ComponentType, PersistentHandler};
use crate::core::exceptions::{ExceptionHandler, GlobalExceptionHandler};
use crate::core::filters::ComponentInteractionFilter;
use crate::core::handlers::{HandlerRegistry, TimeoutEvent};
use crate::core::ids;
use crate::core::interaction::{ComponentEvent, ComponentInteraction};
use crate::core::ratelimit::CancellableRateLimit;
use crate::errors::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, trace, warn};

/// Outcome of a dispatched interaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dispatch {
    /// The handler ran, or there was none to run
    Completed,
    /// The interaction was rejected with a message to the user
    Rejected,
}

/// Receives component interactions and elapsed timeouts.
pub struct ComponentsListener {
    controller: Arc<ComponentController>,
    handlers: Arc<HandlerRegistry>,
    config: Arc<ComponentsConfig>,
    exception_handler: ExceptionHandler,
}

impl ComponentsListener {
    /// Creates a listener.
    pub fn new(
        controller: Arc<ComponentController>,
        handlers: Arc<HandlerRegistry>,
        config: Arc<ComponentsConfig>,
        global_exception_handler: Option<Arc<dyn GlobalExceptionHandler>>,
    ) -> Self {
        let exception_handler =
            ExceptionHandler::new(global_exception_handler, config.messages.general_error.clone());
        Self {
            controller,
            handlers,
            config,
            exception_handler,
        }
    }

    /// The controller.
    #[must_use]
    pub const fn controller(&self) -> &Arc<ComponentController> {
        &self.controller
    }

    /// Handles the interaction in its own task.
    pub fn on_component_interaction(self: &Arc<Self>, interaction: Arc<dyn ComponentInteraction>) {
        let listener = Arc::clone(self);
        tokio::spawn(async move { listener.handle_interaction(interaction).await });
    }

    /// Handles an interaction, errors are given to the exception handler.
    pub async fn handle_interaction(&self, interaction: Arc<dyn ComponentInteraction>) {
        let custom_id = interaction.custom_id();
        trace!("Received component interaction: {custom_id}");

        if !ids::is_compatible(custom_id) {
            error!(
                "Received an interaction for an external component format: '{custom_id}', \
                 only components created by this bot are handled"
            );
            return;
        }

        let component_id = match ids::decode(custom_id) {
            Ok(component_id) => component_id,
            Err(error) => {
                self.exception_handler
                    .handle_interaction_error(interaction.as_ref(), None, &error)
                    .await;
                return;
            }
        };

        if let Err(error) = self.process_interaction(&interaction, component_id).await {
            self.exception_handler
                .handle_interaction_error(interaction.as_ref(), Some(component_id), &error)
                .await;
        }
    }

    async fn process_interaction(
        &self,
        interaction: &Arc<dyn ComponentInteraction>,
        component_id: i32,
    ) -> Result<()> {
        let messages = &self.config.messages;
        let filters = self.controller.repository().filters();

        if !self
            .passes_filters(interaction.as_ref(), filters.global_filters(), None)
            .await?
        {
            return Ok(());
        }

        let Some(data) = self.controller.repository().get_component(component_id).await? else {
            interaction.reply_ephemeral(&messages.component_expired).await?;
            return Ok(());
        };
        let Some(base) = data.base() else {
            return Err(Error::internal(format!(
                "Group {component_id} cannot be interacted with"
            )));
        };

        if base.filters.is_invalid() || !base.constraints.is_allowed(interaction.as_ref()) {
            interaction
                .reply_ephemeral(&messages.component_not_allowed)
                .await?;
            return Ok(());
        }

        let handler_name = match &data {
            ComponentData::Persistent(persistent) => persistent
                .handler
                .as_ref()
                .map(|handler| handler.handler_name.as_str()),
            _ => None,
        };
        if !self
            .passes_filters(interaction.as_ref(), base.filters.filters(), handler_name)
            .await?
        {
            return Ok(());
        }

        let user_id = interaction.user_id();
        let rate_limiter = self.controller.rate_limiter();
        let rate_limit_group = match &base.rate_limit_group {
            Some(group) if !self.config.is_owner(user_id) => {
                if !rate_limiter.try_acquire(group, interaction.as_ref()).await? {
                    return Ok(());
                }
                Some(group.as_str())
            }
            _ => None,
        };

        let rate_limit = CancellableRateLimit::default();
        let event = ComponentEvent::new(Arc::clone(interaction), component_id, rate_limit.clone());
        let result = self.dispatch(&data, event).await;

        if let Some(group) = rate_limit_group {
            if !matches!(result, Ok(Dispatch::Completed)) || rate_limit.is_cancelled() {
                trace!("Refunding rate limit token of user {user_id} on '{group}'");
                rate_limiter.refund(group, user_id);
            }
        }

        result.map(drop)
    }

    async fn passes_filters(
        &self,
        interaction: &dyn ComponentInteraction,
        filters: &[Arc<dyn ComponentInteractionFilter>],
        handler_name: Option<&str>,
    ) -> Result<bool> {
        for filter in filters {
            let Some(user_error) = filter.check(interaction, handler_name).await? else {
                continue;
            };

            self.controller
                .repository()
                .filters()
                .rejection_handler()
                .handle(interaction, handler_name, &user_error)
                .await?;
            if interaction.is_acknowledged() {
                trace!("Component interaction rejected by filter '{}'", filter.name());
            } else {
                error!(
                    "The rejection handler did not acknowledge the interaction rejected by filter '{}'",
                    filter.name()
                );
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn dispatch(&self, data: &ComponentData, event: ComponentEvent) -> Result<Dispatch> {
        let component_id = data.component_id();

        if let Some(group_id) = data.group_id() {
            self.controller.resume_continuations(group_id, &event);
        }
        self.controller.resume_continuations(component_id, &event);

        if data.one_use() {
            let deleted = self
                .controller
                .delete_components_by_id(&[component_id], true)
                .await?;
            // Another interaction used the component since it was loaded
            if !deleted.iter().any(|component| component.component_id == component_id) {
                trace!("One-use component {component_id} was already used");
                event
                    .reply_ephemeral(&self.config.messages.component_expired)
                    .await?;
                return Ok(Dispatch::Rejected);
            }
        }

        match data {
            ComponentData::Persistent(persistent) => match &persistent.handler {
                Some(handler) => {
                    self.invoke_persistent(persistent.base.component_type, handler, event)
                        .await
                }
                None => Ok(Dispatch::Completed),
            },
            ComponentData::Ephemeral(ephemeral) => {
                if let Some(handler) = &ephemeral.handler {
                    handler.call(event).await?;
                }
                Ok(Dispatch::Completed)
            }
            ComponentData::Group(_) => Err(Error::internal(format!(
                "Group {component_id} reached the component dispatcher"
            ))),
        }
    }

    async fn invoke_persistent(
        &self,
        component_type: ComponentType,
        handler: &PersistentHandler,
        event: ComponentEvent,
    ) -> Result<Dispatch> {
        let handler_name = handler.handler_name.as_str();
        let descriptor = match component_type {
            ComponentType::Button => self.handlers.button(handler_name),
            ComponentType::SelectMenu => self.handlers.select_menu(handler_name),
            ComponentType::Group => None,
        }
        .ok_or_else(|| {
            Error::user(format!(
                "Missing {component_type:?} handler '{handler_name}'"
            ))
        })?;

        if descriptor.option_count() != handler.user_data.len() {
            debug!(
                "Mismatch between user data and options of handler '{handler_name}', expected {} arguments but got {}",
                descriptor.option_count(),
                handler.user_data.len()
            );
            event
                .reply_ephemeral(&self.config.messages.component_expired)
                .await?;
            return Ok(Dispatch::Rejected);
        }

        let args = match descriptor.resolve_args(&handler.user_data) {
            Ok(args) => args,
            Err(option) => {
                debug!(
                    "Could not resolve option '{}' ({:?}) of handler '{handler_name}'",
                    option.name, option.kind
                );
                event
                    .reply_ephemeral(&self.config.messages.invalid_argument)
                    .await?;
                return Ok(Dispatch::Rejected);
            }
        };

        (descriptor.function())(event, args).await?;
        Ok(Dispatch::Completed)
    }

    /// Processes elapsed timeouts until the timeout manager is dropped.
    pub async fn run_timeout_loop(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<i32>) {
        while let Some(component_id) = receiver.recv().await {
            let listener = Arc::clone(&self);
            tokio::spawn(async move { listener.handle_timeout(component_id).await });
        }
        debug!("Timeout loop stopped");
    }

    /// Processes an elapsed timeout, errors are given to the exception handler.
    pub async fn handle_timeout(&self, component_id: i32) {
        if let Err(error) = self.process_timeout(component_id).await {
            self.exception_handler
                .handle_timeout_error(component_id, &error)
                .await;
        }
    }

    #[instrument(skip(self))]
    async fn process_timeout(&self, component_id: i32) -> Result<()> {
        let Some(data) = self.controller.repository().get_component(component_id).await? else {
            trace!("Timed out component {component_id} was already deleted");
            return self
                .controller
                .timeout_manager()
                .remove_timeouts(component_id, false);
        };

        let timeout = match &data {
            ComponentData::Group(group) => group.timeout.clone(),
            ComponentData::Persistent(persistent) => {
                persistent.timeout.clone().map(ComponentTimeout::Persistent)
            }
            ComponentData::Ephemeral(ephemeral) => {
                ephemeral.timeout.clone().map(ComponentTimeout::Ephemeral)
            }
        };

        // Waiters are released and the ephemeral handlers forgotten, the loaded timeout
        // handler stays usable
        self.controller
            .delete_components_by_id(&[component_id], false)
            .await?;

        let event = TimeoutEvent {
            component_id,
            component_type: data.component_type(),
        };
        match timeout {
            Some(ComponentTimeout::Persistent(timeout)) => {
                let Some(handler_name) = timeout.handler_name else {
                    return Ok(());
                };
                let descriptor = self.handlers.timeout(&handler_name).ok_or_else(|| {
                    Error::user(format!("Missing timeout handler '{handler_name}'"))
                })?;

                if descriptor.option_count() != timeout.user_data.len() {
                    warn!(
                        "Skipping timeout handler '{handler_name}' of component {component_id}, expected {} arguments but got {}",
                        descriptor.option_count(),
                        timeout.user_data.len()
                    );
                    return Ok(());
                }
                match descriptor.resolve_args(&timeout.user_data) {
                    Ok(args) => (descriptor.function())(event, args).await,
                    Err(option) => {
                        warn!(
                            "Skipping timeout handler '{handler_name}' of component {component_id}, could not resolve option '{}'",
                            option.name
                        );
                        Ok(())
                    }
                }
            }
            Some(ComponentTimeout::Ephemeral(timeout)) => match timeout.handler {
                Some(handler) => handler.call(event).await,
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::components::RateLimitConfig;
    use crate::core::data::{ComponentBuilder, ComponentGroupBuilder, InteractionConstraints};
    use crate::core::filters::FilterRegistry;
    use crate::core::handlers::{EphemeralTimeoutHandler, HandlerOption, OptionKind};
    use crate::test_utils::{
        AllowUsersFilter, MockInteraction, RecordingExceptionHandler, setup_test_listener,
    };
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn greet_registry(calls: Arc<Mutex<Vec<i64>>>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::default();
        registry
            .register_button(
                "greet",
                vec![HandlerOption::required("count", OptionKind::Integer)],
                move |_, args| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.lock().push(args.integer(0).unwrap_or_default());
                        Ok(())
                    }
                },
            )
            .unwrap();
        registry
            .register_button("fail", vec![], |_, _| async {
                Err(Error::handler("handler failed"))
            })
            .unwrap();
        registry
            .register_button("deferred_fail", vec![], |event, _| async move {
                // Stands for a modal or deferral sent through the concrete interaction
                event.interaction().mark_acknowledged();
                Err(Error::handler("failed after deferring"))
            })
            .unwrap();
        registry
    }

    fn click(component_id: i32, user_id: u64) -> Arc<MockInteraction> {
        Arc::new(MockInteraction::button(&ids::encode(component_id), user_id))
    }

    #[tokio::test]
    async fn test_one_use_persistent_button_greets_then_expires() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = setup_test_listener(
            greet_registry(Arc::clone(&calls)),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let controller = listener.controller();
        let component_id = controller
            .create_component(
                &ComponentBuilder::persistent_button()
                    .one_use(true)
                    .bind_to("greet", ["42"]),
            )
            .await?;

        let interaction = click(component_id, 1);
        listener.handle_interaction(interaction.clone()).await;

        assert_eq!(*calls.lock(), vec![42]);
        assert!(controller.repository().get_component(component_id).await?.is_none());

        // Clicking again reports the component as expired
        let interaction = click(component_id, 1);
        listener.handle_interaction(interaction.clone()).await;
        assert_eq!(
            interaction.replies(),
            vec![ComponentsConfig::default().messages.component_expired]
        );
        assert_eq!(calls.lock().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_clicks_run_one_use_handler_once() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = setup_test_listener(
            greet_registry(Arc::clone(&calls)),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let component_id = listener
            .controller()
            .create_component(
                &ComponentBuilder::persistent_button()
                    .one_use(true)
                    .bind_to("greet", ["42"]),
            )
            .await?;

        let first = click(component_id, 1);
        let second = click(component_id, 2);
        tokio::join!(
            listener.handle_interaction(first.clone()),
            listener.handle_interaction(second.clone())
        );

        assert_eq!(*calls.lock(), vec![42]);
        let mut replies = first.replies();
        replies.extend(second.replies());
        assert_eq!(
            replies,
            vec![ComponentsConfig::default().messages.component_expired]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_ids_are_ignored() -> Result<()> {
        let listener = setup_test_listener(
            HandlerRegistry::default(),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;

        let interaction = Arc::new(MockInteraction::button("some-other-bot:confirm", 1));
        listener.handle_interaction(interaction.clone()).await;

        assert!(interaction.replies().is_empty());
        assert!(!interaction.is_acknowledged());
        Ok(())
    }

    #[tokio::test]
    async fn test_arity_mismatch_replies_expired() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = setup_test_listener(
            greet_registry(Arc::clone(&calls)),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let component_id = listener
            .controller()
            .create_component(&ComponentBuilder::persistent_button().bind_to("greet", ["1", "2"]))
            .await?;

        let interaction = click(component_id, 1);
        listener.handle_interaction(interaction.clone()).await;

        assert!(calls.lock().is_empty());
        assert_eq!(
            interaction.replies(),
            vec![ComponentsConfig::default().messages.component_expired]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolvable_argument_replies_invalid_argument() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = setup_test_listener(
            greet_registry(Arc::clone(&calls)),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let component_id = listener
            .controller()
            .create_component(&ComponentBuilder::persistent_button().bind_to("greet", ["many"]))
            .await?;

        let interaction = click(component_id, 1);
        listener.handle_interaction(interaction.clone()).await;

        assert!(calls.lock().is_empty());
        assert_eq!(
            interaction.replies(),
            vec![ComponentsConfig::default().messages.invalid_argument]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_one_use_member_deletes_whole_group() -> Result<()> {
        let listener = setup_test_listener(
            HandlerRegistry::default(),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let controller = listener.controller();
        let used = controller
            .create_component(
                &ComponentBuilder::ephemeral_button()
                    .one_use(true)
                    .on_interaction(|_| async { Ok(()) }),
            )
            .await?;
        let untouched = controller
            .create_component(&ComponentBuilder::ephemeral_button().on_interaction(|_| async { Ok(()) }))
            .await?;
        let group = controller
            .create_group(&ComponentGroupBuilder::ephemeral([used, untouched]))
            .await?;

        listener.handle_interaction(click(used, 1)).await;

        for id in [used, untouched, group.group_id()] {
            assert!(controller.repository().get_component(id).await?.is_none());
        }
        assert!(controller.repository().ephemeral_handlers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_waiters_are_resumed_before_deletion() -> Result<()> {
        let listener = setup_test_listener(
            HandlerRegistry::default(),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let controller = listener.controller();
        let first = controller
            .create_component(&ComponentBuilder::ephemeral_button().one_use(true))
            .await?;
        let second = controller
            .create_component(&ComponentBuilder::ephemeral_button())
            .await?;
        let group = controller
            .create_group(&ComponentGroupBuilder::ephemeral([first, second]))
            .await?;

        let group_waiter = controller.subscribe(group.group_id());
        let first_waiter = controller.subscribe(first);
        let second_waiter = controller.subscribe(second);

        listener.handle_interaction(click(first, 7)).await;

        let event = group_waiter.wait().await?;
        assert_eq!(event.component_id(), first);
        assert_eq!(event.user_id(), 7);
        assert_eq!(first_waiter.wait().await?.component_id(), first);
        // The sibling was deleted without being used
        assert!(matches!(
            second_waiter.wait().await,
            Err(Error::ComponentDeleted { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_constraints_reject_other_users() -> Result<()> {
        let used = Arc::new(AtomicUsize::new(0));
        let listener = setup_test_listener(
            HandlerRegistry::default(),
            FilterRegistry::default(),
            ComponentsConfig::default(),
        )
        .await?;
        let counter = Arc::clone(&used);
        let component_id = listener
            .controller()
            .create_component(
                &ComponentBuilder::ephemeral_button()
                    .constraints(InteractionConstraints::default().allow_user(1))
                    .on_interaction(move |_| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
            )
            .await?;

        let stranger = click(component_id, 2);
        listener.handle_interaction(stranger.clone()).await;
        assert_eq!(
            stranger.replies(),
            vec![ComponentsConfig::default().messages.component_not_allowed]
        );

        listener.handle_interaction(click(component_id, 1)).await;
        assert_eq!(used.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_filters_reject_with_their_message() -> Result<()> {
        let admins = Arc::new(AllowUsersFilter::new("admins", vec![1]));
        let mut filters = FilterRegistry::default();
        filters.register(admins.clone())?;
        filters.register(Arc::new(
            AllowUsersFilter::new("not_banned", vec![1, 2]).into_global(),
        ))?;
        let listener =
            setup_test_listener(HandlerRegistry::default(), filters, ComponentsConfig::default())
                .await?;
        let component_id = listener
            .controller()
            .create_component(&ComponentBuilder::ephemeral_button().add_filter(admins))
            .await?;

        // Rejected by the global filter
        let banned = click(component_id, 3);
        listener.handle_interaction(banned.clone()).await;
        assert_eq!(banned.replies().len(), 1);
        assert!(banned.replies()[0].contains("not_banned"));

        // Rejected by the component filter
        let member = click(component_id, 2);
        listener.handle_interaction(member.clone()).await;
        assert_eq!(member.replies().len(), 1);
        assert!(member.replies()[0].contains("admins"));

        let admin = click(component_id, 1);
        listener.handle_interaction(admin.clone()).await;
        assert!(admin.replies().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unregistered_filter_rejects_every_interaction() -> Result<()> {
        let admins = Arc::new(AllowUsersFilter::new("admins", vec![1]));
        let mut filters = FilterRegistry::default();
        filters.register(admins.clone())?;
        let listener =
            setup_test_listener(HandlerRegistry::default(), filters, ComponentsConfig::default())
                .await?;
        let component_id = listener
            .controller()
            .create_component(&ComponentBuilder::persistent_button().add_filter(admins))
            .await?;

        // Same database, the filter is gone after a "restart"
        let restarted = setup_test_listener_on(&listener, FilterRegistry::default());
        let interaction = click(component_id, 1);
        restarted.handle_interaction(interaction.clone()).await;
        assert_eq!(
            interaction.replies(),
            vec![ComponentsConfig::default().messages.component_not_allowed]
        );
        Ok(())
    }

    fn setup_test_listener_on(listener: &ComponentsListener, filters: FilterRegistry) -> ComponentsListener {
        use crate::core::controller::ComponentController;
        use crate::core::repository::ComponentRepository;

        let old = listener.controller();
        let repository = ComponentRepository::new(
            old.repository().db().clone(),
            Arc::new(filters),
            Arc::clone(old.repository().ephemeral_handlers()),
            Arc::clone(old.repository().ephemeral_timeout_handlers()),
        );
        let controller = ComponentController::new(
            repository,
            Arc::clone(old.timeout_manager()),
            Arc::clone(old.rate_limiter()),
        );
        ComponentsListener::new(
            Arc::new(controller),
            Arc::clone(&listener.handlers),
            Arc::clone(&listener.config),
            None,
        )
    }

    #[tokio::test]
    async fn test_rate_limit_refunds_cancelled_tokens_and_skips_owners() -> Result<()> {
        let config = ComponentsConfig {
            owner_ids: vec![99],
            rate_limits: vec![RateLimitConfig {
                group: "votes".to_string(),
                capacity: 1,
                refill_seconds: 3600,
            }],
            ..Default::default()
        };
        let listener =
            setup_test_listener(HandlerRegistry::default(), FilterRegistry::default(), config)
                .await?;
        let controller = listener.controller();
        let limited = controller
            .create_component(&ComponentBuilder::ephemeral_button().rate_limit_reference("votes"))
            .await?;
        let refunding = controller
            .create_component(
                &ComponentBuilder::ephemeral_button()
                    .rate_limit_reference("votes")
                    .on_interaction(|event| async move {
                        event.cancel_rate_limit();
                        Ok(())
                    }),
            )
            .await?;

        // The refunding handler gives its token back every time
        for _ in 0..3 {
            let interaction = click(refunding, 1);
            listener.handle_interaction(interaction.clone()).await;
            assert!(interaction.replies().is_empty());
        }

        let first = click(limited, 1);
        listener.handle_interaction(first.clone()).await;
        assert!(first.replies().is_empty());

        let second = click(limited, 1);
        listener.handle_interaction(second.clone()).await;
        assert_eq!(second.replies().len(), 1);
        assert!(second.replies()[0].contains("rate limited"));

        for _ in 0..3 {
            let owner = click(limited, 99);
            listener.handle_interaction(owner.clone()).await;
            assert!(owner.replies().is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_handler_errors_reply_generic_message() -> Result<()> {
        let exceptions = Arc::new(RecordingExceptionHandler::default());
        let listener = Arc::new(
            crate::test_utils::setup_test_listener_with_hook(
                greet_registry(Arc::new(Mutex::new(Vec::new()))),
                Arc::clone(&exceptions) as _,
            )
            .await?,
        );
        let controller = listener.controller();
        let failing = controller
            .create_component(&ComponentBuilder::persistent_button().bind_to("fail", Vec::<String>::new()))
            .await?;
        let missing = controller
            .create_component(&ComponentBuilder::persistent_button().bind_to("removed", Vec::<String>::new()))
            .await?;

        for component_id in [failing, missing] {
            let interaction = click(component_id, 1);
            listener.handle_interaction(interaction.clone()).await;
            assert_eq!(
                interaction.replies(),
                vec![ComponentsConfig::default().messages.general_error]
            );
        }

        let recorded = exceptions.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].1.contains("handler failed"));
        assert!(recorded[1].1.contains("removed"));
        Ok(())
    }

    #[tokio::test]
    async fn test_handler_error_after_custom_response_is_not_replied_twice() -> Result<()> {
        let exceptions = Arc::new(RecordingExceptionHandler::default());
        let listener = Arc::new(
            crate::test_utils::setup_test_listener_with_hook(
                greet_registry(Arc::new(Mutex::new(Vec::new()))),
                Arc::clone(&exceptions) as _,
            )
            .await?,
        );
        let deferred = listener
            .controller()
            .create_component(
                &ComponentBuilder::persistent_button().bind_to("deferred_fail", Vec::<String>::new()),
            )
            .await?;

        let interaction = click(deferred, 1);
        listener.handle_interaction(interaction.clone()).await;

        assert!(interaction.is_acknowledged());
        assert!(interaction.replies().is_empty());
        let recorded = exceptions.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].1.contains("failed after deferring"));
        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_timeout_deletes_and_runs_handler() -> Result<()> {
        let expired = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::default();
        let recorded = Arc::clone(&expired);
        handlers.register_timeout(
            "poll_closed",
            vec![HandlerOption::required("poll", OptionKind::Integer)],
            move |event, args| {
                let recorded = Arc::clone(&recorded);
                async move {
                    recorded
                        .lock()
                        .push((event.component_id, args.integer(0).unwrap_or_default()));
                    Ok(())
                }
            },
        )?;
        let listener =
            setup_test_listener(handlers, FilterRegistry::default(), ComponentsConfig::default())
                .await?;
        let controller = listener.controller();
        let member = controller
            .create_component(&ComponentBuilder::persistent_button())
            .await?;
        let group = controller
            .create_group(&ComponentGroupBuilder::persistent([member]).timeout(
                ComponentTimeout::Persistent(crate::core::data::PersistentTimeout {
                    expiration: Utc::now(),
                    handler_name: Some("poll_closed".to_string()),
                    user_data: vec!["5".to_string()],
                }),
            ))
            .await?;
        let waiter = controller.subscribe(member);

        listener.handle_timeout(group.group_id()).await;

        assert_eq!(*expired.lock(), vec![(group.group_id(), 5)]);
        assert!(controller.repository().get_component(member).await?.is_none());
        assert!(matches!(waiter.wait().await, Err(Error::ComponentDeleted { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_ephemeral_timeout_runs_closure_through_loop() -> Result<()> {
        let (listener, receiver) = crate::test_utils::setup_test_listener_with_timeouts().await?;
        let listener = Arc::new(listener);
        tokio::spawn(Arc::clone(&listener).run_timeout_loop(receiver));

        let (sender, fired) = tokio::sync::oneshot::channel();
        let sender = Arc::new(Mutex::new(Some(sender)));
        let component_id = listener
            .controller()
            .create_component(&ComponentBuilder::ephemeral_button().ephemeral_timeout(
                Utc::now() + chrono::Duration::milliseconds(20),
                Some(EphemeralTimeoutHandler::new(move |event| {
                    let sender = Arc::clone(&sender);
                    async move {
                        if let Some(sender) = sender.lock().take() {
                            let _ = sender.send(event.component_id);
                        }
                        Ok(())
                    }
                })),
            ))
            .await?;

        let fired_id = tokio::time::timeout(std::time::Duration::from_secs(5), fired)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired_id, component_id);
        assert!(listener
            .controller()
            .repository()
            .get_component(component_id)
            .await?
            .is_none());
        assert!(listener.controller().repository().ephemeral_timeout_handlers().is_empty());
        Ok(())
    }
    #[tokio::test]
    async fn test_select_menu_handler_receives_values() -> Result<()> {
        let picked = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::default();
        let recorded = Arc::clone(&picked);
        handlers.register_select_menu("pick_color", vec![], move |event, _| {
            let recorded = Arc::clone(&recorded);
            async move {
                recorded.lock().extend(event.values());
                Ok(())
            }
        })?;
        let listener =
            setup_test_listener(handlers, FilterRegistry::default(), ComponentsConfig::default())
                .await?;
        let component_id = listener
            .controller()
            .create_component(
                &ComponentBuilder::persistent_select_menu().bind_to("pick_color", Vec::<String>::new()),
            )
            .await?;

        let interaction = Arc::new(MockInteraction::select(
            ids::encode(component_id),
            1,
            vec!["red".to_string(), "blue".to_string()],
        ));
        listener.handle_interaction(interaction.clone()).await;

        assert_eq!(*picked.lock(), vec!["red".to_string(), "blue".to_string()]);
        assert!(interaction.replies().is_empty());
        Ok(())
    }
}
