//! Entity module - Contains all SeaORM entity definitions for the component tables.
//! The `component` table holds one row per component or group, every other table is a
//! satellite keyed by `component_id`.

pub mod component;
pub mod component_constraints;
pub mod component_group;
pub mod ephemeral_handler;
pub mod ephemeral_timeout;
pub mod persistent_handler;
pub mod persistent_timeout;

// Re-export specific types to avoid conflicts
pub use component::{Column as ComponentColumn, Entity as Component, Model as ComponentModel};
pub use component_constraints::{
    Column as ComponentConstraintsColumn, Entity as ComponentConstraints,
    Model as ComponentConstraintsModel,
};
pub use component_group::{
    Column as ComponentGroupColumn, Entity as ComponentGroup, Model as ComponentGroupModel,
};
pub use ephemeral_handler::{
    Column as EphemeralHandlerColumn, Entity as EphemeralHandler, Model as EphemeralHandlerModel,
};
pub use ephemeral_timeout::{
    Column as EphemeralTimeoutColumn, Entity as EphemeralTimeout, Model as EphemeralTimeoutModel,
};
pub use persistent_handler::{
    Column as PersistentHandlerColumn, Entity as PersistentHandler,
    Model as PersistentHandlerModel,
};
pub use persistent_timeout::{
    Column as PersistentTimeoutColumn, Entity as PersistentTimeout,
    Model as PersistentTimeoutModel,
};
