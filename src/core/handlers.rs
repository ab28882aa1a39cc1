//! Component and timeout handlers.
//!
//! Two kinds of handlers exist:
//! - Persistent handlers are registered by name in a [`HandlerRegistry`] at startup, and
//!   components store that name plus positional user data. They keep working after a
//!   restart as long as a handler with the same name and option count is registered.
//! - Ephemeral handlers are closures kept in an [`EphemeralHandlers`] registry. Components
//!   only store the numeric handle, which is meaningless in any other process.

use crate::core::data::ComponentType;
use crate::core::interaction::ComponentEvent;
use crate::errors::{Error, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by every handler.
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// Signature of a registered button or select menu handler.
pub type ComponentHandlerFn = Arc<dyn Fn(ComponentEvent, HandlerArgs) -> HandlerFuture + Send + Sync>;

/// Signature of a registered timeout handler.
pub type TimeoutHandlerFn = Arc<dyn Fn(TimeoutEvent, HandlerArgs) -> HandlerFuture + Send + Sync>;

/// In-memory closure run when an ephemeral component is used.
#[derive(Clone)]
pub struct EphemeralHandler(Arc<dyn Fn(ComponentEvent) -> HandlerFuture + Send + Sync>);

impl EphemeralHandler {
    /// Wraps an async closure.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |event| Box::pin(handler(event))))
    }

    /// Runs the closure.
    pub async fn call(&self, event: ComponentEvent) -> Result<()> {
        (self.0)(event).await
    }
}

impl fmt::Debug for EphemeralHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralHandler")
    }
}

/// In-memory closure run when an ephemeral component or group expires.
#[derive(Clone)]
pub struct EphemeralTimeoutHandler(Arc<dyn Fn(TimeoutEvent) -> HandlerFuture + Send + Sync>);

impl EphemeralTimeoutHandler {
    /// Wraps an async closure.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(TimeoutEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |event| Box::pin(handler(event))))
    }

    /// Runs the closure.
    pub async fn call(&self, event: TimeoutEvent) -> Result<()> {
        (self.0)(event).await
    }
}

impl fmt::Debug for EphemeralTimeoutHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralTimeoutHandler")
    }
}

/// Passed to timeout handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutEvent {
    /// Internal id of the expired component or group
    pub component_id: i32,
    /// Whether a group or a single component expired
    pub component_type: ComponentType,
}

/// Process-local id → closure map backing ephemeral handlers and timeouts.
///
/// Handles are only valid in the process that created them; the map is cleared at startup
/// together with the database rows referencing it.
pub struct EphemeralHandlers<H> {
    inner: Mutex<HandlerMap<H>>,
}

struct HandlerMap<H> {
    next_id: i32,
    handlers: HashMap<i32, H>,
}

/// Registry of ephemeral component handlers.
pub type EphemeralComponentHandlers = EphemeralHandlers<EphemeralHandler>;

/// Registry of ephemeral timeout handlers.
pub type EphemeralTimeoutHandlers = EphemeralHandlers<EphemeralTimeoutHandler>;

impl<H: Clone> Default for EphemeralHandlers<H> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HandlerMap {
                next_id: 1,
                handlers: HashMap::new(),
            }),
        }
    }
}

impl<H: Clone> EphemeralHandlers<H> {
    /// Stores a handler and returns its handle.
    ///
    /// Handles wrap around to 1 after `i32::MAX`, skipping the ones still in use.
    pub fn put(&self, handler: H) -> i32 {
        let mut inner = self.inner.lock();
        let mut id = inner.next_id;
        while inner.handlers.contains_key(&id) {
            id = following_handle(id);
        }
        inner.next_id = following_handle(id);
        inner.handlers.insert(id, handler);
        id
    }

    /// Gets the handler behind a handle.
    pub fn get(&self, id: i32) -> Option<H> {
        self.inner.lock().handlers.get(&id).cloned()
    }

    /// Forgets a handler.
    pub fn remove(&self, id: i32) -> Option<H> {
        self.inner.lock().handlers.remove(&id)
    }

    /// Forgets every handler.
    pub fn clear(&self) {
        self.inner.lock().handlers.clear();
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Whether no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn following_handle(id: i32) -> i32 {
    id.checked_add(1).unwrap_or(1)
}

/// Type of a handler option, which decides how stored user data is parsed back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OptionKind {
    /// Raw string
    String,
    /// Signed 64-bit integer
    Integer,
    /// Floating point number
    Number,
    /// `true` or `false`
    Boolean,
    /// User snowflake
    User,
    /// Role snowflake
    Role,
    /// Channel snowflake
    Channel,
}

impl OptionKind {
    /// Parses a stored string, `None` if it is not a valid value of this kind.
    #[must_use]
    pub fn resolve(self, raw: &str) -> Option<OptionValue> {
        match self {
            Self::String => Some(OptionValue::String(raw.to_string())),
            Self::Integer => raw.parse().ok().map(OptionValue::Integer),
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(OptionValue::Number),
            Self::Boolean => raw.parse().ok().map(OptionValue::Boolean),
            Self::User => raw.parse().ok().map(OptionValue::User),
            Self::Role => raw.parse().ok().map(OptionValue::Role),
            Self::Channel => raw.parse().ok().map(OptionValue::Channel),
        }
    }
}

/// A resolved handler argument.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    /// Raw string
    String(String),
    /// Signed 64-bit integer
    Integer(i64),
    /// Floating point number
    Number(f64),
    /// Boolean
    Boolean(bool),
    /// User snowflake
    User(u64),
    /// Role snowflake
    Role(u64),
    /// Channel snowflake
    Channel(u64),
}

/// A declared option of a persistent handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerOption {
    /// Name, used in logs
    pub name: String,
    /// How the stored string is parsed
    pub kind: OptionKind,
    /// Whether the handler cannot run without this value
    pub required: bool,
}

impl HandlerOption {
    /// An option the handler cannot run without.
    pub fn required(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// An option which may fail to resolve, in which case the handler gets `None`.
    pub fn optional(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Positional arguments of a persistent handler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandlerArgs {
    values: Vec<Option<OptionValue>>,
}

impl HandlerArgs {
    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the handler has no argument.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument at `index`, `None` if out of bounds or unresolved.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&OptionValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// String argument at `index`.
    #[must_use]
    pub fn string(&self, index: usize) -> Option<&str> {
        match self.get(index)? {
            OptionValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Integer argument at `index`.
    #[must_use]
    pub fn integer(&self, index: usize) -> Option<i64> {
        match self.get(index)? {
            OptionValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Number argument at `index`.
    #[must_use]
    pub fn number(&self, index: usize) -> Option<f64> {
        match self.get(index)? {
            OptionValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean argument at `index`.
    #[must_use]
    pub fn boolean(&self, index: usize) -> Option<bool> {
        match self.get(index)? {
            OptionValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Snowflake argument (user, role or channel) at `index`.
    #[must_use]
    pub fn snowflake(&self, index: usize) -> Option<u64> {
        match self.get(index)? {
            OptionValue::User(id) | OptionValue::Role(id) | OptionValue::Channel(id) => Some(*id),
            _ => None,
        }
    }
}

/// A named handler with its declared options.
pub struct HandlerDescriptor<F> {
    name: String,
    options: Vec<HandlerOption>,
    function: F,
}

/// Descriptor of a button or select menu handler.
pub type ComponentDescriptor = HandlerDescriptor<ComponentHandlerFn>;

/// Descriptor of a timeout handler.
pub type TimeoutDescriptor = HandlerDescriptor<TimeoutHandlerFn>;

impl<F> HandlerDescriptor<F> {
    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of positional options, stored user data must have exactly this length.
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// The handler function.
    #[must_use]
    pub const fn function(&self) -> &F {
        &self.function
    }

    /// Resolves stored user data into arguments.
    ///
    /// Returns the failing option when a required value cannot be parsed.
    /// The caller must have checked the arity first.
    pub fn resolve_args(&self, user_data: &[String]) -> std::result::Result<HandlerArgs, &HandlerOption> {
        let mut values = Vec::with_capacity(self.options.len());
        for (option, raw) in self.options.iter().zip(user_data) {
            let value = option.kind.resolve(raw);
            if value.is_none() && option.required {
                return Err(option);
            }
            values.push(value);
        }
        Ok(HandlerArgs { values })
    }
}

/// Every persistent handler, looked up by name when a component is used or expires.
#[derive(Default)]
pub struct HandlerRegistry {
    buttons: HashMap<String, ComponentDescriptor>,
    select_menus: HashMap<String, ComponentDescriptor>,
    timeouts: HashMap<String, TimeoutDescriptor>,
}

impl HandlerRegistry {
    /// Registers a button handler.
    pub fn register_button<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: Vec<HandlerOption>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(ComponentEvent, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let function: ComponentHandlerFn = Arc::new(move |event, args| Box::pin(handler(event, args)));
        insert_descriptor(&mut self.buttons, "button", name.into(), options, function)
    }

    /// Registers a select menu handler.
    pub fn register_select_menu<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: Vec<HandlerOption>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(ComponentEvent, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let function: ComponentHandlerFn = Arc::new(move |event, args| Box::pin(handler(event, args)));
        insert_descriptor(&mut self.select_menus, "select menu", name.into(), options, function)
    }

    /// Registers a timeout handler, used by both component and group timeouts.
    pub fn register_timeout<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: Vec<HandlerOption>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(TimeoutEvent, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let function: TimeoutHandlerFn = Arc::new(move |event, args| Box::pin(handler(event, args)));
        insert_descriptor(&mut self.timeouts, "timeout", name.into(), options, function)
    }

    /// Button handler named `name`.
    #[must_use]
    pub fn button(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.buttons.get(name)
    }

    /// Select menu handler named `name`.
    #[must_use]
    pub fn select_menu(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.select_menus.get(name)
    }

    /// Timeout handler named `name`.
    #[must_use]
    pub fn timeout(&self, name: &str) -> Option<&TimeoutDescriptor> {
        self.timeouts.get(name)
    }
}

fn insert_descriptor<F>(
    map: &mut HashMap<String, HandlerDescriptor<F>>,
    kind: &str,
    name: String,
    options: Vec<HandlerOption>,
    function: F,
) -> Result<()> {
    if map.contains_key(&name) {
        return Err(Error::user(format!(
            "Tried to register the {kind} handler '{name}' twice"
        )));
    }

    let descriptor = HandlerDescriptor {
        name: name.clone(),
        options,
        function,
    };
    map.insert(name, descriptor);
    Ok(())
}
