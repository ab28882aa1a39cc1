//! Component constraints entity - Who may interact with a component.
//!
//! `users` and `roles` are JSON arrays of Discord snowflakes, `permissions` is the raw
//! permission bitmask. Empty arrays and a zero mask mean "no restriction".

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Component constraints database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "component_constraints")]
pub struct Model {
    /// Constrained component
    #[sea_orm(primary_key, auto_increment = false)]
    pub component_id: i32,
    /// JSON array of allowed user ids
    pub users: String,
    /// JSON array of allowed role ids
    pub roles: String,
    /// Raw permission bitmask a member must have
    pub permissions: i64,
}

/// Each constraints row belongs to one component
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
