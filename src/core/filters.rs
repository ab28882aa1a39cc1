//! Interaction filters.
//!
//! Filters are checks run before a component handler. Global filters apply to every
//! component interaction, other filters are attached to individual components and stored
//! by name, so they must be registered in the [`FilterRegistry`] to be restored after a
//! restart. A component whose filters can no longer be resolved gets
//! [`FilterSet::Invalid`] and rejects every interaction.

use crate::core::interaction::ComponentInteraction;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A check run before a component handler.
#[async_trait]
pub trait ComponentInteractionFilter: Send + Sync {
    /// Unique name, stored alongside the components using this filter.
    fn name(&self) -> &str;

    /// Global filters run on every interaction and cannot be attached to components.
    fn global(&self) -> bool {
        false
    }

    /// Returns an error message for the user when the interaction must be rejected.
    async fn check(
        &self,
        interaction: &dyn ComponentInteraction,
        handler_name: Option<&str>,
    ) -> Result<Option<String>>;
}

/// Informs the user that a filter rejected their interaction.
///
/// Implementations must acknowledge the interaction.
#[async_trait]
pub trait ComponentInteractionRejectionHandler: Send + Sync {
    /// Called with the message returned by the rejecting filter.
    async fn handle(
        &self,
        interaction: &dyn ComponentInteraction,
        handler_name: Option<&str>,
        user_error: &str,
    ) -> Result<()>;
}

/// Replies the filter's message ephemerally.
pub struct ReplyRejectionHandler;

#[async_trait]
impl ComponentInteractionRejectionHandler for ReplyRejectionHandler {
    async fn handle(
        &self,
        interaction: &dyn ComponentInteraction,
        _handler_name: Option<&str>,
        user_error: &str,
    ) -> Result<()> {
        interaction.reply_ephemeral(user_error).await
    }
}

/// Filters of a loaded component.
#[derive(Clone)]
pub enum FilterSet {
    /// Every stored filter name was found in the registry
    Resolved(Vec<Arc<dyn ComponentInteractionFilter>>),
    /// At least one stored filter is no longer registered
    Invalid,
}

impl FilterSet {
    /// Whether the filters could not be restored.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Resolved filters, empty when invalid.
    #[must_use]
    pub fn filters(&self) -> &[Arc<dyn ComponentInteractionFilter>] {
        match self {
            Self::Resolved(filters) => filters,
            Self::Invalid => &[],
        }
    }
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(filters) => f
                .debug_list()
                .entries(filters.iter().map(|filter| filter.name()))
                .finish(),
            Self::Invalid => f.write_str("INVALID_FILTERS"),
        }
    }
}

/// Every filter known to the framework, plus the rejection handler.
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn ComponentInteractionFilter>>,
    global_filters: Vec<Arc<dyn ComponentInteractionFilter>>,
    rejection_handler: Arc<dyn ComponentInteractionRejectionHandler>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self {
            filters: HashMap::new(),
            global_filters: Vec::new(),
            rejection_handler: Arc::new(ReplyRejectionHandler),
        }
    }
}

impl FilterRegistry {
    /// Registers a filter, global filters are applied to every interaction.
    pub fn register(&mut self, filter: Arc<dyn ComponentInteractionFilter>) -> Result<()> {
        let name = filter.name().to_string();
        let duplicate = self.filters.contains_key(&name)
            || self.global_filters.iter().any(|global| global.name() == name);
        if duplicate {
            return Err(Error::user(format!(
                "A filter named '{name}' is already registered"
            )));
        }

        if filter.global() {
            self.global_filters.push(filter);
        } else {
            self.filters.insert(name, filter);
        }
        Ok(())
    }

    /// Replaces the default rejection handler, which replies the filter's message.
    pub fn set_rejection_handler(
        &mut self,
        rejection_handler: Arc<dyn ComponentInteractionRejectionHandler>,
    ) {
        self.rejection_handler = rejection_handler;
    }

    /// Filters applied to every interaction.
    #[must_use]
    pub fn global_filters(&self) -> &[Arc<dyn ComponentInteractionFilter>] {
        &self.global_filters
    }

    /// Handler notified of filter rejections.
    #[must_use]
    pub fn rejection_handler(&self) -> &Arc<dyn ComponentInteractionRejectionHandler> {
        &self.rejection_handler
    }

    /// Checks that a filter can be attached to a component.
    pub fn check_attachable(&self, filter: &dyn ComponentInteractionFilter) -> Result<()> {
        let name = filter.name();
        if filter.global() {
            return Err(Error::user(format!(
                "Global filter '{name}' cannot be attached to a component, it already runs on every interaction"
            )));
        }
        if !self.filters.contains_key(name) {
            return Err(Error::user(format!(
                "Filter '{name}' must be registered before being attached to a component, \
                 otherwise it cannot be restored after a restart"
            )));
        }
        Ok(())
    }

    /// Restores stored filter names, or [`FilterSet::Invalid`] if one is unknown.
    #[must_use]
    pub fn resolve(&self, names: &[String]) -> FilterSet {
        let mut filters = Vec::with_capacity(names.len());
        for name in names {
            let Some(filter) = self.filters.get(name) else {
                warn!("Component filter '{name}' is not registered anymore, the component will reject all interactions");
                return FilterSet::Invalid;
            };
            filters.push(Arc::clone(filter));
        }
        FilterSet::Resolved(filters)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{AllowUsersFilter, MockInteraction};

    #[tokio::test]
    async fn test_reply_rejection_handler_acknowledges() -> Result<()> {
        let interaction = MockInteraction::button("ComponentBuddy-1", 1);
        ReplyRejectionHandler
            .handle(&interaction, None, "Nope")
            .await?;

        assert!(interaction.is_acknowledged());
        assert_eq!(interaction.replies(), vec!["Nope".to_string()]);
        Ok(())
    }

    #[test]
    fn test_resolve_known_and_unknown_names() {
        let mut registry = FilterRegistry::default();
        registry
            .register(Arc::new(AllowUsersFilter::new("admins", vec![1])))
            .unwrap();

        let resolved = registry.resolve(&["admins".to_string()]);
        assert!(!resolved.is_invalid());
        assert_eq!(resolved.filters().len(), 1);

        let invalid = registry.resolve(&["admins".to_string(), "removed".to_string()]);
        assert!(invalid.is_invalid());
        assert!(invalid.filters().is_empty());
    }

    #[test]
    fn test_attachable_rules() {
        let mut registry = FilterRegistry::default();
        let global = Arc::new(AllowUsersFilter::new("everyone", vec![1]).into_global());
        registry.register(global.clone()).unwrap();

        assert!(matches!(
            registry.check_attachable(global.as_ref()),
            Err(Error::User { .. })
        ));

        let unregistered = AllowUsersFilter::new("unregistered", vec![1]);
        assert!(matches!(
            registry.check_attachable(&unregistered),
            Err(Error::User { .. })
        ));

        assert_eq!(registry.global_filters().len(), 1);
    }

    #[test]
    fn test_duplicate_filter_names_are_rejected() {
        let mut registry = FilterRegistry::default();
        registry
            .register(Arc::new(AllowUsersFilter::new("admins", vec![1])))
            .unwrap();
        let result = registry.register(Arc::new(AllowUsersFilter::new("admins", vec![2])));
        assert!(matches!(result, Err(Error::User { .. })));
    }
}
