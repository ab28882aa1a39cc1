//! Component entity - The base row shared by every component and group.
//!
//! `component_type` and `lifetime_type` hold the numeric keys of
//! [`ComponentType`](crate::core::data::ComponentType) and
//! [`LifetimeType`](crate::core::data::LifetimeType).
//! `filters` is a JSON array of filter names.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Component database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "component")]
pub struct Model {
    /// Surrogate key assigned at insert time
    #[sea_orm(primary_key)]
    pub component_id: i32,
    /// Group, button or select menu
    pub component_type: i32,
    /// Persistent or ephemeral
    pub lifetime_type: i32,
    /// Whether the component (and its group) is deleted after the first use
    pub one_use: bool,
    /// Name of the rate limit bucket applied to interactions, if any
    pub rate_limit_group: Option<String>,
    /// JSON array of the names of the filters applied to interactions
    pub filters: String,
}

/// Defines relationships between Component and its satellite tables
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One component has one constraints row
    #[sea_orm(has_one = "super::component_constraints::Entity")]
    Constraints,
    /// One component has at most one group membership row
    #[sea_orm(has_one = "super::component_group::Entity")]
    Group,
}

impl Related<super::component_constraints::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Constraints.def()
    }
}

impl Related<super::component_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
