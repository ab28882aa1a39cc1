//! Component group membership entity.
//!
//! A group also has a row pointing to itself (`group_id == component_id`),
//! so "find my group" is the same lookup for groups and members.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Group membership database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "component_component_group")]
pub struct Model {
    /// Member component, a component belongs to at most one group
    #[sea_orm(primary_key, auto_increment = false)]
    pub component_id: i32,
    /// Group the component belongs to
    #[sea_orm(indexed)]
    pub group_id: i32,
}

/// Membership rows belong to the member component
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Member component
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
