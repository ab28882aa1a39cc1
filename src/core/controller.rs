//! Component controller - Creation, deletion and awaiting of components.
//!
//! The controller validates builders against the registries before anything is
//! persisted, schedules timeouts, and keeps the continuations of tasks awaiting an
//! interaction on a component. Deleting a component drops its continuations, which
//! wakes their waiters with [`Error::ComponentDeleted`].

use crate::core::data::{ComponentBuilder, ComponentGroupBuilder};
use crate::core::ids;
use crate::core::interaction::ComponentEvent;
use crate::core::ratelimit::RateLimiter;
use crate::core::repository::{ComponentRepository, DeletedComponent};
use crate::core::timeout::TimeoutManager;
use crate::errors::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

type Continuation = oneshot::Sender<ComponentEvent>;

#[derive(Default)]
struct Continuations {
    next_waiter_id: u64,
    waiters: HashMap<i32, Vec<(u64, Continuation)>>,
}

/// Orchestrates the repository, the timeout manager and the awaiting tasks.
pub struct ComponentController {
    repository: ComponentRepository,
    timeout_manager: Arc<dyn TimeoutManager>,
    rate_limiter: Arc<dyn RateLimiter>,
    continuations: Arc<Mutex<Continuations>>,
}

impl ComponentController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        repository: ComponentRepository,
        timeout_manager: Arc<dyn TimeoutManager>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            repository,
            timeout_manager,
            rate_limiter,
            continuations: Arc::new(Mutex::new(Continuations::default())),
        }
    }

    /// The repository.
    #[must_use]
    pub const fn repository(&self) -> &ComponentRepository {
        &self.repository
    }

    /// The timeout manager.
    #[must_use]
    pub const fn timeout_manager(&self) -> &Arc<dyn TimeoutManager> {
        &self.timeout_manager
    }

    /// The rate limiter components may reference.
    #[must_use]
    pub const fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    /// Persists a component, then lets `block` build the UI element from its internal and
    /// wire ids.
    ///
    /// The rate limit group and filters are checked before anything is written.
    pub async fn with_new_component<R>(
        &self,
        builder: &ComponentBuilder,
        block: impl FnOnce(i32, String) -> R,
    ) -> Result<R> {
        if let Some(group) = builder.rate_limit_group() {
            if !self.rate_limiter.contains(group) {
                return Err(Error::user(format!(
                    "Rate limit group '{group}' is not declared"
                )));
            }
        }
        for filter in builder.filters() {
            self.repository.filters().check_attachable(filter.as_ref())?;
        }
        builder.validate()?;

        let component_id = self.repository.create_component(builder).await?;
        if let Some(timeout) = builder.component_timeout() {
            self.timeout_manager
                .schedule_timeout(component_id, timeout.expiration());
        }

        Ok(block(component_id, ids::encode(component_id)))
    }

    /// Persists a component and returns its internal id.
    pub async fn create_component(&self, builder: &ComponentBuilder) -> Result<i32> {
        self.with_new_component(builder, |component_id, _| component_id)
            .await
    }

    /// Persists a group of existing components.
    pub async fn create_group(self: &Arc<Self>, builder: &ComponentGroupBuilder) -> Result<ComponentGroup> {
        let group_id = self.repository.insert_group(builder).await?;
        if let Some(timeout) = builder.component_timeout() {
            self.timeout_manager.schedule_timeout(group_id, timeout.expiration());
        }

        Ok(ComponentGroup {
            controller: Arc::clone(self),
            group_id,
        })
    }

    /// Deletes a component with its group and siblings.
    pub async fn delete_component(&self, component_id: i32) -> Result<()> {
        self.delete_components_by_id(&[component_id], false)
            .await
            .map(drop)
    }

    /// Deletes components with their groups and siblings, then releases everything held
    /// in memory for them: continuations, ephemeral handlers and scheduled timeouts.
    ///
    /// With `throw_timeouts`, finding an elapsed but unprocessed timeout is an internal
    /// error. Every deleted component is still cleaned up, the first error is returned.
    pub async fn delete_components_by_id(
        &self,
        ids: &[i32],
        throw_timeouts: bool,
    ) -> Result<Vec<DeletedComponent>> {
        let deleted = self.repository.delete_components_by_id(ids).await?;

        let mut first_error = None;
        for component in &deleted {
            let continuations = self.remove_continuations(component.component_id);
            if !continuations.is_empty() {
                trace!(
                    "Cancelling {} continuations of deleted component {}",
                    continuations.len(),
                    component.component_id
                );
            }
            drop(continuations);

            if let Some(handler_id) = component.ephemeral_handler_id {
                self.repository.ephemeral_handlers().remove(handler_id);
            }
            if let Some(handler_id) = component.ephemeral_timeout_handler_id {
                self.repository.ephemeral_timeout_handlers().remove(handler_id);
            }

            if let Err(error) = self
                .timeout_manager
                .remove_timeouts(component.component_id, throw_timeouts)
            {
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(deleted),
        }
    }

    /// Registers a continuation on a component.
    ///
    /// The returned waiter is registered immediately, dropping it deregisters it.
    #[must_use]
    pub fn subscribe(&self, component_id: i32) -> ComponentWaiter {
        let (sender, receiver) = oneshot::channel();

        let mut continuations = self.continuations.lock();
        let waiter_id = continuations.next_waiter_id;
        continuations.next_waiter_id += 1;
        continuations
            .waiters
            .entry(component_id)
            .or_default()
            .push((waiter_id, sender));

        ComponentWaiter {
            component_id,
            receiver,
            _guard: WaiterGuard {
                continuations: Arc::clone(&self.continuations),
                component_id,
                waiter_id,
            },
        }
    }

    /// Waits for the next interaction on a component or group.
    ///
    /// Fails with [`Error::ComponentDeleted`] if the component is deleted first, or
    /// does not exist.
    pub async fn await_component(&self, component_id: i32) -> Result<ComponentEvent> {
        let waiter = self.subscribe(component_id);
        if self.repository.get_component(component_id).await?.is_none() {
            return Err(Error::ComponentDeleted { component_id });
        }
        waiter.wait().await
    }

    /// Same as [`Self::await_component`], failing with [`Error::AwaitTimeout`] after
    /// `duration`.
    pub async fn await_component_timeout(
        &self,
        component_id: i32,
        duration: Duration,
    ) -> Result<ComponentEvent> {
        tokio::time::timeout(duration, self.await_component(component_id))
            .await
            .map_err(|_| Error::AwaitTimeout { component_id })?
    }

    /// Removes every continuation registered on a component.
    pub fn remove_continuations(&self, component_id: i32) -> Vec<oneshot::Sender<ComponentEvent>> {
        self.continuations
            .lock()
            .waiters
            .remove(&component_id)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, sender)| sender)
            .collect()
    }

    /// Resumes every continuation registered on a component, returns how many were resumed.
    pub fn resume_continuations(&self, component_id: i32, event: &ComponentEvent) -> usize {
        self.remove_continuations(component_id)
            .into_iter()
            .map(|sender| sender.send(event.clone()).is_ok())
            .filter(|sent| *sent)
            .count()
    }
}

struct WaiterGuard {
    continuations: Arc<Mutex<Continuations>>,
    component_id: i32,
    waiter_id: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let mut continuations = self.continuations.lock();
        if let Some(waiters) = continuations.waiters.get_mut(&self.component_id) {
            waiters.retain(|(waiter_id, _)| *waiter_id != self.waiter_id);
            if waiters.is_empty() {
                continuations.waiters.remove(&self.component_id);
            }
        }
    }
}

/// A registered continuation, see [`ComponentController::subscribe`].
pub struct ComponentWaiter {
    component_id: i32,
    receiver: oneshot::Receiver<ComponentEvent>,
    _guard: WaiterGuard,
}

impl ComponentWaiter {
    /// Waits for the interaction.
    pub async fn wait(self) -> Result<ComponentEvent> {
        let Self {
            component_id,
            receiver,
            _guard,
        } = self;
        receiver
            .await
            .map_err(|_| Error::ComponentDeleted { component_id })
    }
}

/// Handle to a persisted group.
#[derive(Clone)]
pub struct ComponentGroup {
    controller: Arc<ComponentController>,
    group_id: i32,
}

impl ComponentGroup {
    /// Internal id of the group.
    #[must_use]
    pub const fn group_id(&self) -> i32 {
        self.group_id
    }

    /// Waits for an interaction on any member.
    pub async fn await_any(&self) -> Result<ComponentEvent> {
        self.controller.await_component(self.group_id).await
    }

    /// Waits for an interaction on any member for at most `duration`.
    pub async fn await_any_timeout(&self, duration: Duration) -> Result<ComponentEvent> {
        self.controller
            .await_component_timeout(self.group_id, duration)
            .await
    }

    /// Deletes the group and all its members.
    pub async fn delete(&self) -> Result<()> {
        self.controller.delete_component(self.group_id).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::ratelimit::CancellableRateLimit;
    use crate::test_utils::{AllowUsersFilter, MockInteraction, setup_test_controller};
    use chrono::Utc;

    fn event_on(component_id: i32) -> ComponentEvent {
        ComponentEvent::new(
            Arc::new(MockInteraction::button(&ids::encode(component_id), 1)),
            component_id,
            CancellableRateLimit::default(),
        )
    }

    #[tokio::test]
    async fn test_with_new_component_passes_ids_and_schedules_timeout() -> Result<()> {
        let (controller, timeouts) = setup_test_controller().await?;
        let expiration = Utc::now() + chrono::Duration::minutes(5);
        let builder = ComponentBuilder::persistent_button()
            .bind_to("greet", ["42"])
            .persistent_timeout(expiration, None, Vec::<String>::new());

        let (component_id, wire_id) = controller
            .with_new_component(&builder, |component_id, wire_id| (component_id, wire_id))
            .await?;

        assert_eq!(wire_id, ids::encode(component_id));
        assert_eq!(timeouts.scheduled(), vec![(component_id, expiration)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_builders_are_rejected_before_persisting() -> Result<()> {
        let (controller, _) = setup_test_controller().await?;

        let unknown_bucket = ComponentBuilder::persistent_button().rate_limit_reference("nope");
        assert!(matches!(
            controller.create_component(&unknown_bucket).await,
            Err(Error::User { .. })
        ));

        let unregistered = ComponentBuilder::persistent_button()
            .add_filter(Arc::new(AllowUsersFilter::new("unregistered", vec![1])));
        assert!(matches!(
            controller.create_component(&unregistered).await,
            Err(Error::User { .. })
        ));

        // Nothing was written, the next component gets the first id
        let component_id = controller
            .create_component(&ComponentBuilder::persistent_button())
            .await?;
        assert_eq!(component_id, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_delivers_event_once() -> Result<()> {
        let (controller, _) = setup_test_controller().await?;
        let component_id = controller
            .create_component(&ComponentBuilder::persistent_button())
            .await?;

        let waiter = controller.subscribe(component_id);
        assert_eq!(controller.resume_continuations(component_id, &event_on(component_id)), 1);
        assert_eq!(controller.resume_continuations(component_id, &event_on(component_id)), 0);

        let event = waiter.wait().await?;
        assert_eq!(event.component_id(), component_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_deletion_unblocks_waiters() -> Result<()> {
        let (controller, _) = setup_test_controller().await?;
        let first = controller
            .create_component(&ComponentBuilder::ephemeral_button().on_interaction(|_| async { Ok(()) }))
            .await?;
        let second = controller
            .create_component(&ComponentBuilder::ephemeral_button())
            .await?;
        let group = controller
            .create_group(&ComponentGroupBuilder::ephemeral([first, second]))
            .await?;

        let member_waiter = controller.subscribe(second);
        let group_waiter = controller.subscribe(group.group_id());

        // Deleting a sibling deletes the whole group
        controller.delete_component(first).await?;

        assert!(matches!(
            member_waiter.wait().await,
            Err(Error::ComponentDeleted { component_id }) if component_id == second
        ));
        assert!(matches!(
            group_waiter.wait().await,
            Err(Error::ComponentDeleted { .. })
        ));
        assert!(controller.repository().ephemeral_handlers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_await_missing_component_fails_immediately() -> Result<()> {
        let (controller, _) = setup_test_controller().await?;
        let result = controller.await_component(404).await;
        assert!(matches!(result, Err(Error::ComponentDeleted { component_id: 404 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_await_timeout_deregisters() -> Result<()> {
        let (controller, _) = setup_test_controller().await?;
        let component_id = controller
            .create_component(&ComponentBuilder::persistent_button())
            .await?;

        let result = controller
            .await_component_timeout(component_id, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::AwaitTimeout { .. })));
        assert!(controller.remove_continuations(component_id).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_group_handle_await_and_delete() -> Result<()> {
        let (controller, timeouts) = setup_test_controller().await?;
        let member = controller
            .create_component(&ComponentBuilder::persistent_button())
            .await?;
        let group = controller
            .create_group(&ComponentGroupBuilder::persistent([member]))
            .await?;

        let waiting_group = group.clone();
        let waiting = tokio::spawn(async move { waiting_group.await_any().await });
        while controller.continuations.lock().waiters.is_empty() {
            tokio::task::yield_now().await;
        }

        group.delete().await?;
        assert!(matches!(
            waiting.await.unwrap(),
            Err(Error::ComponentDeleted { .. })
        ));
        assert!(controller.repository().get_component(member).await?.is_none());
        assert!(timeouts.removed().contains(&group.group_id()));
        Ok(())
    }
}
