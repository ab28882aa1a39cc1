//! Component data model and builders.
//!
//! [`ComponentBuilder`] and [`ComponentGroupBuilder`] describe what should be persisted,
//! [`ComponentData`] is what the repository loads back.

use crate::core::filters::{ComponentInteractionFilter, FilterSet};
use crate::core::handlers::{EphemeralHandler, EphemeralTimeoutHandler};
use crate::core::interaction::{ComponentEvent, ComponentInteraction};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;

/// Kind of component.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// A set of components sharing a timeout and one-use state
    Group,
    /// A button
    Button,
    /// A select menu of any kind
    SelectMenu,
}

impl ComponentType {
    /// Numeric key stored in the database.
    #[must_use]
    pub const fn key(self) -> i32 {
        match self {
            Self::Group => 0,
            Self::Button => 1,
            Self::SelectMenu => 2,
        }
    }

    /// Parses a stored key.
    pub fn from_key(key: i32) -> Result<Self> {
        match key {
            0 => Ok(Self::Group),
            1 => Ok(Self::Button),
            2 => Ok(Self::SelectMenu),
            _ => Err(Error::internal(format!("Unknown component type key {key}"))),
        }
    }
}

/// Whether a component survives restarts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LifetimeType {
    /// Handlers and timeouts are referenced by name and survive restarts
    Persistent,
    /// Handlers and timeouts are in-memory closures, wiped at startup
    Ephemeral,
}

impl LifetimeType {
    /// Numeric key stored in the database.
    #[must_use]
    pub const fn key(self) -> i32 {
        match self {
            Self::Persistent => 0,
            Self::Ephemeral => 1,
        }
    }

    /// Parses a stored key.
    pub fn from_key(key: i32) -> Result<Self> {
        match key {
            0 => Ok(Self::Persistent),
            1 => Ok(Self::Ephemeral),
            _ => Err(Error::internal(format!("Unknown lifetime type key {key}"))),
        }
    }
}

/// Who may use a component.
///
/// A component without any constraint can be used by anyone. Otherwise the member must
/// have all `allowing_permissions`, or be one of `allowed_users`, or have one of
/// `allowed_roles`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InteractionConstraints {
    /// Users allowed regardless of roles and permissions
    pub allowed_users: Vec<u64>,
    /// Roles allowed regardless of permissions
    pub allowed_roles: Vec<u64>,
    /// Raw permission bits granting access, `0` for none
    pub allowing_permissions: u64,
}

impl InteractionConstraints {
    /// Allows a user.
    #[must_use]
    pub fn allow_user(mut self, user_id: u64) -> Self {
        self.allowed_users.push(user_id);
        self
    }

    /// Allows a role.
    #[must_use]
    pub fn allow_role(mut self, role_id: u64) -> Self {
        self.allowed_roles.push(role_id);
        self
    }

    /// Allows members having all of these permission bits.
    #[must_use]
    pub const fn allow_permissions(mut self, permissions: u64) -> Self {
        self.allowing_permissions |= permissions;
        self
    }

    /// Whether no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_users.is_empty()
            && self.allowed_roles.is_empty()
            && self.allowing_permissions == 0
    }

    /// Whether the interacting user passes these constraints.
    #[must_use]
    pub fn is_allowed(&self, interaction: &dyn ComponentInteraction) -> bool {
        if self.is_empty() {
            return true;
        }

        if self.allowing_permissions != 0
            && interaction
                .member_permissions()
                .is_some_and(|permissions| permissions & self.allowing_permissions == self.allowing_permissions)
        {
            return true;
        }

        if self.allowed_users.contains(&interaction.user_id()) {
            return true;
        }

        interaction
            .member_roles()
            .iter()
            .any(|role| self.allowed_roles.contains(role))
    }
}

/// A named handler and the arguments it is invoked with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentHandler {
    /// Name of a handler in the [`HandlerRegistry`](crate::core::handlers::HandlerRegistry)
    pub handler_name: String,
    /// Positional arguments, in stringified form
    pub user_data: Vec<String>,
}

/// Handler run when a component is used.
#[derive(Clone, Debug)]
pub enum ComponentHandler {
    /// Named handler
    Persistent(PersistentHandler),
    /// In-memory closure
    Ephemeral(EphemeralHandler),
}

impl ComponentHandler {
    /// Lifetime this handler requires.
    #[must_use]
    pub const fn lifetime_type(&self) -> LifetimeType {
        match self {
            Self::Persistent(_) => LifetimeType::Persistent,
            Self::Ephemeral(_) => LifetimeType::Ephemeral,
        }
    }
}

/// Timeout of a persistent component or group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentTimeout {
    /// When the component is deleted
    pub expiration: DateTime<Utc>,
    /// Named timeout handler run after the deletion, if any
    pub handler_name: Option<String>,
    /// Positional arguments of the timeout handler
    pub user_data: Vec<String>,
}

/// Timeout of an ephemeral component or group.
#[derive(Clone, Debug)]
pub struct EphemeralTimeout {
    /// When the component is deleted
    pub expiration: DateTime<Utc>,
    /// Closure run after the deletion, if any
    pub handler: Option<EphemeralTimeoutHandler>,
}

/// Timeout of a component or group.
#[derive(Clone, Debug)]
pub enum ComponentTimeout {
    /// Named handler
    Persistent(PersistentTimeout),
    /// In-memory closure
    Ephemeral(EphemeralTimeout),
}

impl ComponentTimeout {
    /// When the component expires.
    #[must_use]
    pub const fn expiration(&self) -> DateTime<Utc> {
        match self {
            Self::Persistent(timeout) => timeout.expiration,
            Self::Ephemeral(timeout) => timeout.expiration,
        }
    }

    /// Lifetime this timeout requires.
    #[must_use]
    pub const fn lifetime_type(&self) -> LifetimeType {
        match self {
            Self::Persistent(_) => LifetimeType::Persistent,
            Self::Ephemeral(_) => LifetimeType::Ephemeral,
        }
    }
}

/// Fields shared by loaded buttons and select menus.
#[derive(Clone, Debug)]
pub struct ComponentBase {
    /// Internal id
    pub component_id: i32,
    /// Button or select menu
    pub component_type: ComponentType,
    /// Whether the component is deleted after its first use
    pub one_use: bool,
    /// Rate limit bucket applied to interactions
    pub rate_limit_group: Option<String>,
    /// Filters applied to interactions
    pub filters: FilterSet,
    /// Who may use the component
    pub constraints: InteractionConstraints,
    /// Group the component belongs to
    pub group_id: Option<i32>,
    /// Whether the group of the component is one-use
    pub group_one_use: bool,
}

/// A loaded persistent button or select menu.
#[derive(Clone, Debug)]
pub struct PersistentComponentData {
    /// Shared fields
    pub base: ComponentBase,
    /// Named handler
    pub handler: Option<PersistentHandler>,
    /// Timeout
    pub timeout: Option<PersistentTimeout>,
}

/// A loaded ephemeral button or select menu.
#[derive(Clone, Debug)]
pub struct EphemeralComponentData {
    /// Shared fields
    pub base: ComponentBase,
    /// In-memory handler
    pub handler: Option<EphemeralHandler>,
    /// Timeout
    pub timeout: Option<EphemeralTimeout>,
}

/// A loaded group.
#[derive(Clone, Debug)]
pub struct ComponentGroupData {
    /// Internal id of the group
    pub component_id: i32,
    /// Lifetime of the group
    pub lifetime_type: LifetimeType,
    /// Whether using any member deletes the whole group
    pub one_use: bool,
    /// Timeout of the group
    pub timeout: Option<ComponentTimeout>,
    /// Members of the group
    pub component_ids: Vec<i32>,
}

/// A loaded component or group.
#[derive(Clone, Debug)]
pub enum ComponentData {
    /// A group
    Group(ComponentGroupData),
    /// A persistent button or select menu
    Persistent(PersistentComponentData),
    /// An ephemeral button or select menu
    Ephemeral(EphemeralComponentData),
}

impl ComponentData {
    /// Internal id.
    #[must_use]
    pub const fn component_id(&self) -> i32 {
        match self {
            Self::Group(group) => group.component_id,
            Self::Persistent(data) => data.base.component_id,
            Self::Ephemeral(data) => data.base.component_id,
        }
    }

    /// Kind of component.
    #[must_use]
    pub const fn component_type(&self) -> ComponentType {
        match self {
            Self::Group(_) => ComponentType::Group,
            Self::Persistent(data) => data.base.component_type,
            Self::Ephemeral(data) => data.base.component_type,
        }
    }

    /// Lifetime.
    #[must_use]
    pub const fn lifetime_type(&self) -> LifetimeType {
        match self {
            Self::Group(group) => group.lifetime_type,
            Self::Persistent(_) => LifetimeType::Persistent,
            Self::Ephemeral(_) => LifetimeType::Ephemeral,
        }
    }

    /// Shared fields, `None` for groups.
    #[must_use]
    pub const fn base(&self) -> Option<&ComponentBase> {
        match self {
            Self::Group(_) => None,
            Self::Persistent(data) => Some(&data.base),
            Self::Ephemeral(data) => Some(&data.base),
        }
    }

    /// Whether the component is deleted after its first use, either because it is
    /// one-use itself or because its group is.
    #[must_use]
    pub const fn one_use(&self) -> bool {
        match self {
            Self::Group(group) => group.one_use,
            Self::Persistent(data) => data.base.one_use || data.base.group_one_use,
            Self::Ephemeral(data) => data.base.one_use || data.base.group_one_use,
        }
    }

    /// Group this component belongs to, `None` for groups and free components.
    #[must_use]
    pub fn group_id(&self) -> Option<i32> {
        self.base().and_then(|base| base.group_id)
    }
}

/// Describes a button or select menu to create.
#[derive(Clone)]
pub struct ComponentBuilder {
    component_type: ComponentType,
    lifetime_type: LifetimeType,
    one_use: bool,
    rate_limit_group: Option<String>,
    filters: Vec<Arc<dyn ComponentInteractionFilter>>,
    constraints: InteractionConstraints,
    handler: Option<ComponentHandler>,
    timeout: Option<ComponentTimeout>,
}

impl ComponentBuilder {
    /// Starts a component.
    #[must_use]
    pub fn new(component_type: ComponentType, lifetime_type: LifetimeType) -> Self {
        Self {
            component_type,
            lifetime_type,
            one_use: false,
            rate_limit_group: None,
            filters: Vec::new(),
            constraints: InteractionConstraints::default(),
            handler: None,
            timeout: None,
        }
    }

    /// A button surviving restarts.
    #[must_use]
    pub fn persistent_button() -> Self {
        Self::new(ComponentType::Button, LifetimeType::Persistent)
    }

    /// A button handled by closures.
    #[must_use]
    pub fn ephemeral_button() -> Self {
        Self::new(ComponentType::Button, LifetimeType::Ephemeral)
    }

    /// A select menu surviving restarts.
    #[must_use]
    pub fn persistent_select_menu() -> Self {
        Self::new(ComponentType::SelectMenu, LifetimeType::Persistent)
    }

    /// A select menu handled by closures.
    #[must_use]
    pub fn ephemeral_select_menu() -> Self {
        Self::new(ComponentType::SelectMenu, LifetimeType::Ephemeral)
    }

    /// Deletes the component (and its group) after the first successful use.
    #[must_use]
    pub const fn one_use(mut self, one_use: bool) -> Self {
        self.one_use = one_use;
        self
    }

    /// Applies the rate limit bucket `group` to interactions.
    #[must_use]
    pub fn rate_limit_reference(mut self, group: impl Into<String>) -> Self {
        self.rate_limit_group = Some(group.into());
        self
    }

    /// Adds a registered, non-global filter.
    #[must_use]
    pub fn add_filter(mut self, filter: Arc<dyn ComponentInteractionFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restricts who may use the component.
    #[must_use]
    pub fn constraints(mut self, constraints: InteractionConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Runs the registered handler `handler_name` with `user_data` when used.
    #[must_use]
    pub fn bind_to<I, S>(mut self, handler_name: impl Into<String>, user_data: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.handler = Some(ComponentHandler::Persistent(PersistentHandler {
            handler_name: handler_name.into(),
            user_data: user_data.into_iter().map(|data| data.to_string()).collect(),
        }));
        self
    }

    /// Runs `handler` when used.
    #[must_use]
    pub fn on_interaction<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handler = Some(ComponentHandler::Ephemeral(EphemeralHandler::new(handler)));
        self
    }

    /// Deletes the component at `expiration`, then runs the registered timeout handler.
    #[must_use]
    pub fn persistent_timeout<I, S>(
        mut self,
        expiration: DateTime<Utc>,
        handler_name: Option<&str>,
        user_data: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.timeout = Some(ComponentTimeout::Persistent(PersistentTimeout {
            expiration,
            handler_name: handler_name.map(str::to_string),
            user_data: user_data.into_iter().map(|data| data.to_string()).collect(),
        }));
        self
    }

    /// Deletes the component at `expiration`, then runs `handler`.
    #[must_use]
    pub fn ephemeral_timeout(
        mut self,
        expiration: DateTime<Utc>,
        handler: Option<EphemeralTimeoutHandler>,
    ) -> Self {
        self.timeout = Some(ComponentTimeout::Ephemeral(EphemeralTimeout {
            expiration,
            handler,
        }));
        self
    }

    /// Sets an already built timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: ComponentTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kind of component.
    #[must_use]
    pub const fn component_type(&self) -> ComponentType {
        self.component_type
    }

    /// Lifetime.
    #[must_use]
    pub const fn lifetime_type(&self) -> LifetimeType {
        self.lifetime_type
    }

    /// Whether the component is deleted after its first use.
    #[must_use]
    pub const fn is_one_use(&self) -> bool {
        self.one_use
    }

    /// Rate limit bucket.
    #[must_use]
    pub fn rate_limit_group(&self) -> Option<&str> {
        self.rate_limit_group.as_deref()
    }

    /// Attached filters.
    #[must_use]
    pub fn filters(&self) -> &[Arc<dyn ComponentInteractionFilter>] {
        &self.filters
    }

    /// Constraints.
    #[must_use]
    pub const fn interaction_constraints(&self) -> &InteractionConstraints {
        &self.constraints
    }

    /// Handler.
    #[must_use]
    pub const fn handler(&self) -> Option<&ComponentHandler> {
        self.handler.as_ref()
    }

    /// Timeout.
    #[must_use]
    pub const fn component_timeout(&self) -> Option<&ComponentTimeout> {
        self.timeout.as_ref()
    }

    /// Checks that the handler and timeout match the declared lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.component_type == ComponentType::Group {
            return Err(Error::user(
                "Groups must be created with a ComponentGroupBuilder",
            ));
        }
        check_lifetime(
            self.lifetime_type,
            self.handler.as_ref().map(ComponentHandler::lifetime_type),
            "handler",
        )?;
        check_lifetime(
            self.lifetime_type,
            self.timeout.as_ref().map(ComponentTimeout::lifetime_type),
            "timeout",
        )
    }
}

/// Describes a group of existing components to create.
#[derive(Clone, Debug)]
pub struct ComponentGroupBuilder {
    lifetime_type: LifetimeType,
    one_use: bool,
    component_ids: Vec<i32>,
    timeout: Option<ComponentTimeout>,
}

impl ComponentGroupBuilder {
    /// A persistent group of the given components.
    #[must_use]
    pub fn persistent(component_ids: impl IntoIterator<Item = i32>) -> Self {
        Self::new(LifetimeType::Persistent, component_ids)
    }

    /// An ephemeral group of the given components.
    #[must_use]
    pub fn ephemeral(component_ids: impl IntoIterator<Item = i32>) -> Self {
        Self::new(LifetimeType::Ephemeral, component_ids)
    }

    fn new(lifetime_type: LifetimeType, component_ids: impl IntoIterator<Item = i32>) -> Self {
        Self {
            lifetime_type,
            one_use: false,
            component_ids: component_ids.into_iter().collect(),
            timeout: None,
        }
    }

    /// Deletes the whole group after any member is used.
    #[must_use]
    pub const fn one_use(mut self, one_use: bool) -> Self {
        self.one_use = one_use;
        self
    }

    /// Deletes the group and its members at the timeout's expiration.
    #[must_use]
    pub fn timeout(mut self, timeout: ComponentTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lifetime.
    #[must_use]
    pub const fn lifetime_type(&self) -> LifetimeType {
        self.lifetime_type
    }

    /// Whether using any member deletes the whole group.
    #[must_use]
    pub const fn is_one_use(&self) -> bool {
        self.one_use
    }

    /// Members.
    #[must_use]
    pub fn component_ids(&self) -> &[i32] {
        &self.component_ids
    }

    /// Timeout.
    #[must_use]
    pub const fn component_timeout(&self) -> Option<&ComponentTimeout> {
        self.timeout.as_ref()
    }

    /// Checks that the group has members and that its timeout matches its lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.component_ids.is_empty() {
            return Err(Error::user("A component group needs at least one component"));
        }
        check_lifetime(
            self.lifetime_type,
            self.timeout.as_ref().map(ComponentTimeout::lifetime_type),
            "timeout",
        )
    }
}

fn check_lifetime(expected: LifetimeType, actual: Option<LifetimeType>, what: &str) -> Result<()> {
    match actual {
        Some(actual) if actual != expected => Err(Error::user(format!(
            "A {expected:?} component cannot have a {actual:?} {what}"
        ))),
        _ => Ok(()),
    }
}
