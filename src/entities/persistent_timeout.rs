//! Persistent timeout entity - Expiration of a component or group that survives restarts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persistent timeout database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "persistent_timeout")]
pub struct Model {
    /// Component or group that expires
    #[sea_orm(primary_key, auto_increment = false)]
    pub component_id: i32,
    /// When the component expires
    pub expiration_timestamp: DateTimeUtc,
    /// Name of the registered timeout handler, if any
    pub handler_name: Option<String>,
    /// JSON array of the positional arguments of the timeout handler
    pub user_data: Option<String>,
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
