//! Ephemeral handler entity - Points a component at an in-process closure.
//!
//! `handler_id` keys the in-memory handler registry, so rows are only meaningful for the
//! process that wrote them and the table is emptied at every startup.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ephemeral handler database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ephemeral_handler")]
pub struct Model {
    /// Component the handler is bound to
    #[sea_orm(primary_key, auto_increment = false)]
    pub component_id: i32,
    /// Handle in the in-memory handler registry
    pub handler_id: i32,
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
