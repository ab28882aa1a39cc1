//! Persistent handler entity - Binds a component to a named handler.
//!
//! Named handlers survive restarts, the positional `user_data` (JSON array of strings)
//! is resolved back into typed arguments when the handler runs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persistent handler database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "persistent_handler")]
pub struct Model {
    /// Component the handler is bound to
    #[sea_orm(primary_key, auto_increment = false)]
    pub component_id: i32,
    /// Name of the registered handler
    pub handler_name: String,
    /// JSON array of the positional arguments
    pub user_data: String,
}

/// Each handler row belongs to one component
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning component
    #[sea_orm(
        belongs_to = "super::component::Entity",
        from = "Column::ComponentId",
        to = "super::component::Column::ComponentId",
        on_delete = "Cascade"
    )]
    Component,
}

impl Related<super::component::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Component.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
