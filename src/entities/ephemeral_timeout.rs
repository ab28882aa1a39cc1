//! Ephemeral timeout entity - Expiration with an optional in-process timeout closure.
//!
//! Emptied at every startup, like [`ephemeral_handler`](super::ephemeral_handler).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ephemeral timeout database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ephemeral_timeout")]
pub struct Model {
    /// Component or group that expires
    #[sea_orm(primary_key, auto_increment = false)]
    pub component_id: i32,
    /// When the component expires
    pub expiration_timestamp: DateTimeUtc,
    /// Handle in the in-memory timeout handler registry, if any
    pub handler_id: Option<i32>,
}

/// Each timeout row belongs to one component
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
