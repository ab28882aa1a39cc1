//! Component repository - Durable storage of component state.
//!
//! Every operation runs inside a single database transaction: either all rows of a
//! component are written/deleted or none are. Array columns are stored as JSON text.
//! Ephemeral handlers and timeout handlers are moved to their in-memory registries at
//! creation time, only their numeric handles are written to the database.

use crate::core::data::{
    ComponentBase, ComponentBuilder, ComponentData, ComponentGroupBuilder, ComponentGroupData,
    ComponentHandler, ComponentTimeout, ComponentType, EphemeralComponentData, EphemeralTimeout,
    InteractionConstraints, LifetimeType, PersistentComponentData, PersistentHandler,
    PersistentTimeout,
};
use crate::core::filters::FilterRegistry;
use crate::core::handlers::{EphemeralComponentHandlers, EphemeralTimeoutHandlers};
use crate::core::timeout::TimeoutManager;
use crate::entities::{
    component, component_constraints, component_group, ephemeral_handler, ephemeral_timeout,
    persistent_handler, persistent_timeout,
};
use crate::errors::{Error, Result};
use sea_orm::{NotSet, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, trace};

/// In-memory handles released by a deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletedComponent {
    /// Internal id of the deleted component or group
    pub component_id: i32,
    /// Handle in the ephemeral handler registry
    pub ephemeral_handler_id: Option<i32>,
    /// Handle in the ephemeral timeout handler registry
    pub ephemeral_timeout_handler_id: Option<i32>,
}

/// Sole owner of the persisted component state.
pub struct ComponentRepository {
    db: DatabaseConnection,
    filters: Arc<FilterRegistry>,
    ephemeral_handlers: Arc<EphemeralComponentHandlers>,
    ephemeral_timeout_handlers: Arc<EphemeralTimeoutHandlers>,
}

impl ComponentRepository {
    /// Creates a repository over an initialized database.
    #[must_use]
    pub const fn new(
        db: DatabaseConnection,
        filters: Arc<FilterRegistry>,
        ephemeral_handlers: Arc<EphemeralComponentHandlers>,
        ephemeral_timeout_handlers: Arc<EphemeralTimeoutHandlers>,
    ) -> Self {
        Self {
            db,
            filters,
            ephemeral_handlers,
            ephemeral_timeout_handlers,
        }
    }

    /// The underlying connection.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Filters used to restore the stored filter names.
    #[must_use]
    pub const fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    /// Ephemeral component handlers.
    #[must_use]
    pub const fn ephemeral_handlers(&self) -> &Arc<EphemeralComponentHandlers> {
        &self.ephemeral_handlers
    }

    /// Ephemeral timeout handlers.
    #[must_use]
    pub const fn ephemeral_timeout_handlers(&self) -> &Arc<EphemeralTimeoutHandlers> {
        &self.ephemeral_timeout_handlers
    }

    /// Persists a button or select menu and returns its internal id.
    pub async fn create_component(&self, builder: &ComponentBuilder) -> Result<i32> {
        builder.validate()?;

        let handler_id = match builder.handler() {
            Some(ComponentHandler::Ephemeral(handler)) => {
                Some(self.ephemeral_handlers.put(handler.clone()))
            }
            _ => None,
        };
        let timeout_handler_id = self.put_timeout_handler(builder.component_timeout());

        let result: Result<i32> = async {
            let txn = self.db.begin().await?;
            let component_id = insert_component(&txn, builder, handler_id, timeout_handler_id).await?;
            txn.commit().await?;
            Ok(component_id)
        }
        .await;

        if result.is_err() {
            self.release_handles(handler_id, timeout_handler_id);
        }
        result
    }

    /// Persists a group of existing components and returns its internal id.
    ///
    /// Fails without writing anything if a member has its own timeout, is already in a
    /// group, is itself a group or does not exist.
    pub async fn insert_group(&self, builder: &ComponentGroupBuilder) -> Result<i32> {
        builder.validate()?;

        let timeout_handler_id = self.put_timeout_handler(builder.component_timeout());

        let result: Result<i32> = async {
            let txn = self.db.begin().await?;
            let group_id = insert_group(&txn, builder, timeout_handler_id).await?;
            txn.commit().await?;
            Ok(group_id)
        }
        .await;

        if result.is_err() {
            self.release_handles(None, timeout_handler_id);
        }
        result
    }

    /// Loads a component or group, `None` if it does not exist (anymore).
    pub async fn get_component(&self, component_id: i32) -> Result<Option<ComponentData>> {
        let txn = self.db.begin().await?;
        let data = self.load_component(&txn, component_id).await?;
        txn.commit().await?;
        Ok(data)
    }

    /// Deletes the components, their groups and their siblings.
    ///
    /// Returns the deleted ids with the ephemeral handles that must be released.
    pub async fn delete_components_by_id(&self, ids: &[i32]) -> Result<Vec<DeletedComponent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await?;

        // Groups of the requested ids, groups themselves have a row pointing to themselves
        let group_ids: Vec<i32> = component_group::Entity::find()
            .filter(component_group::Column::ComponentId.is_in(ids.iter().copied()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.group_id)
            .collect();

        let mut resolved: BTreeSet<i32> = ids.iter().copied().collect();
        resolved.extend(group_ids.iter().copied());
        if !group_ids.is_empty() {
            let members = component_group::Entity::find()
                .filter(component_group::Column::GroupId.is_in(group_ids))
                .all(&txn)
                .await?;
            resolved.extend(members.into_iter().map(|row| row.component_id));
        }

        let existing: Vec<i32> = component::Entity::find()
            .filter(component::Column::ComponentId.is_in(resolved))
            .order_by_asc(component::Column::ComponentId)
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.component_id)
            .collect();
        if existing.is_empty() {
            return Ok(Vec::new());
        }

        let handler_ids: HashMap<i32, i32> = ephemeral_handler::Entity::find()
            .filter(ephemeral_handler::Column::ComponentId.is_in(existing.iter().copied()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| (row.component_id, row.handler_id))
            .collect();
        let timeout_handler_ids: HashMap<i32, Option<i32>> = ephemeral_timeout::Entity::find()
            .filter(ephemeral_timeout::Column::ComponentId.is_in(existing.iter().copied()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| (row.component_id, row.handler_id))
            .collect();

        delete_rows(&txn, &existing).await?;
        txn.commit().await?;

        trace!("Deleted components: {existing:?}");

        Ok(existing
            .into_iter()
            .map(|component_id| DeletedComponent {
                component_id,
                ephemeral_handler_id: handler_ids.get(&component_id).copied(),
                ephemeral_timeout_handler_id: timeout_handler_ids
                    .get(&component_id)
                    .copied()
                    .flatten(),
            })
            .collect())
    }

    /// Re-schedules every persisted timeout, returns how many were scheduled.
    ///
    /// Ephemeral timeouts are not restored, they are purged by [`Self::cleanup_ephemeral`].
    #[instrument(skip_all)]
    pub async fn schedule_existing_timeouts(&self, manager: &dyn TimeoutManager) -> Result<usize> {
        let txn = self.db.begin().await?;
        let timeouts = persistent_timeout::Entity::find().all(&txn).await?;
        txn.commit().await?;

        for timeout in &timeouts {
            manager.schedule_timeout(timeout.component_id, timeout.expiration_timestamp);
        }

        info!("Scheduled {} persistent component timeouts", timeouts.len());
        Ok(timeouts.len())
    }

    /// Deletes every ephemeral component and every ephemeral handle row.
    ///
    /// Must run at startup, before any component is created. Returns the number of
    /// deleted components.
    #[instrument(skip_all)]
    pub async fn cleanup_ephemeral(&self) -> Result<usize> {
        let txn = self.db.begin().await?;

        ephemeral_handler::Entity::delete_many().exec(&txn).await?;
        ephemeral_timeout::Entity::delete_many().exec(&txn).await?;

        let ephemeral_ids: Vec<i32> = component::Entity::find()
            .filter(component::Column::LifetimeType.eq(LifetimeType::Ephemeral.key()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.component_id)
            .collect();
        if !ephemeral_ids.is_empty() {
            delete_rows(&txn, &ephemeral_ids).await?;
        }

        txn.commit().await?;

        trace!("Deleted {} ephemeral components", ephemeral_ids.len());
        Ok(ephemeral_ids.len())
    }

    fn put_timeout_handler(&self, timeout: Option<&ComponentTimeout>) -> Option<i32> {
        match timeout {
            Some(ComponentTimeout::Ephemeral(EphemeralTimeout {
                handler: Some(handler),
                ..
            })) => Some(self.ephemeral_timeout_handlers.put(handler.clone())),
            _ => None,
        }
    }

    fn release_handles(&self, handler_id: Option<i32>, timeout_handler_id: Option<i32>) {
        if let Some(handler_id) = handler_id {
            self.ephemeral_handlers.remove(handler_id);
        }
        if let Some(timeout_handler_id) = timeout_handler_id {
            self.ephemeral_timeout_handlers.remove(timeout_handler_id);
        }
    }

    async fn load_component<C: ConnectionTrait>(
        &self,
        db: &C,
        component_id: i32,
    ) -> Result<Option<ComponentData>> {
        let Some(row) = component::Entity::find_by_id(component_id).one(db).await? else {
            return Ok(None);
        };

        let component_type = ComponentType::from_key(row.component_type)?;
        let lifetime_type = LifetimeType::from_key(row.lifetime_type)?;
        if component_type == ComponentType::Group {
            return self
                .load_group(db, &row, lifetime_type)
                .await
                .map(|group| Some(ComponentData::Group(group)));
        }

        let constraints = component_constraints::Entity::find_by_id(component_id)
            .one(db)
            .await?
            .map(constraints_from_row)
            .transpose()?
            .unwrap_or_default();
        let group_id = component_group::Entity::find_by_id(component_id)
            .one(db)
            .await?
            .map(|membership| membership.group_id);
        let group_one_use = match group_id {
            Some(group_id) => component::Entity::find_by_id(group_id)
                .one(db)
                .await?
                .is_some_and(|group| group.one_use),
            None => false,
        };
        let filter_names: Vec<String> = from_json(&row.filters)?;

        let base = ComponentBase {
            component_id,
            component_type,
            one_use: row.one_use,
            rate_limit_group: row.rate_limit_group,
            filters: self.filters.resolve(&filter_names),
            constraints,
            group_id,
            group_one_use,
        };

        let data = match lifetime_type {
            LifetimeType::Persistent => {
                let handler = persistent_handler::Entity::find_by_id(component_id)
                    .one(db)
                    .await?
                    .map(|handler| {
                        Ok::<_, Error>(PersistentHandler {
                            handler_name: handler.handler_name,
                            user_data: from_json(&handler.user_data)?,
                        })
                    })
                    .transpose()?;
                let timeout = load_persistent_timeout(db, component_id).await?;

                ComponentData::Persistent(PersistentComponentData {
                    base,
                    handler,
                    timeout,
                })
            }
            LifetimeType::Ephemeral => {
                let handler = ephemeral_handler::Entity::find_by_id(component_id)
                    .one(db)
                    .await?
                    .map(|row| {
                        self.ephemeral_handlers.get(row.handler_id).ok_or_else(|| {
                            Error::internal(format!(
                                "Ephemeral handler {} of component {component_id} is not registered",
                                row.handler_id
                            ))
                        })
                    })
                    .transpose()?;
                let timeout = self.load_ephemeral_timeout(db, component_id).await?;

                ComponentData::Ephemeral(EphemeralComponentData {
                    base,
                    handler,
                    timeout,
                })
            }
        };

        Ok(Some(data))
    }

    async fn load_group<C: ConnectionTrait>(
        &self,
        db: &C,
        row: &component::Model,
        lifetime_type: LifetimeType,
    ) -> Result<ComponentGroupData> {
        let component_ids = component_group::Entity::find()
            .filter(component_group::Column::GroupId.eq(row.component_id))
            .filter(component_group::Column::ComponentId.ne(row.component_id))
            .order_by_asc(component_group::Column::ComponentId)
            .all(db)
            .await?
            .into_iter()
            .map(|membership| membership.component_id)
            .collect();

        let timeout = match lifetime_type {
            LifetimeType::Persistent => load_persistent_timeout(db, row.component_id)
                .await?
                .map(ComponentTimeout::Persistent),
            LifetimeType::Ephemeral => self
                .load_ephemeral_timeout(db, row.component_id)
                .await?
                .map(ComponentTimeout::Ephemeral),
        };

        Ok(ComponentGroupData {
            component_id: row.component_id,
            lifetime_type,
            one_use: row.one_use,
            timeout,
            component_ids,
        })
    }

    async fn load_ephemeral_timeout<C: ConnectionTrait>(
        &self,
        db: &C,
        component_id: i32,
    ) -> Result<Option<EphemeralTimeout>> {
        let Some(row) = ephemeral_timeout::Entity::find_by_id(component_id).one(db).await? else {
            return Ok(None);
        };

        let handler = row
            .handler_id
            .map(|handler_id| {
                self.ephemeral_timeout_handlers.get(handler_id).ok_or_else(|| {
                    Error::internal(format!(
                        "Ephemeral timeout handler {handler_id} of component {component_id} is not registered"
                    ))
                })
            })
            .transpose()?;

        Ok(Some(EphemeralTimeout {
            expiration: row.expiration_timestamp,
            handler,
        }))
    }
}

async fn insert_component<C: ConnectionTrait>(
    db: &C,
    builder: &ComponentBuilder,
    handler_id: Option<i32>,
    timeout_handler_id: Option<i32>,
) -> Result<i32> {
    let filter_names: Vec<&str> = builder.filters().iter().map(|filter| filter.name()).collect();

    let row = component::ActiveModel {
        component_id: NotSet,
        component_type: Set(builder.component_type().key()),
        lifetime_type: Set(builder.lifetime_type().key()),
        one_use: Set(builder.is_one_use()),
        rate_limit_group: Set(builder.rate_limit_group().map(str::to_string)),
        filters: Set(to_json(&filter_names)?),
    }
    .insert(db)
    .await?;
    let component_id = row.component_id;

    let constraints = builder.interaction_constraints();
    #[allow(clippy::cast_possible_wrap)]
    let permissions = constraints.allowing_permissions as i64;
    component_constraints::ActiveModel {
        component_id: Set(component_id),
        users: Set(to_json(&constraints.allowed_users)?),
        roles: Set(to_json(&constraints.allowed_roles)?),
        permissions: Set(permissions),
    }
    .insert(db)
    .await?;

    match builder.handler() {
        Some(ComponentHandler::Persistent(handler)) => {
            persistent_handler::ActiveModel {
                component_id: Set(component_id),
                handler_name: Set(handler.handler_name.clone()),
                user_data: Set(to_json(&handler.user_data)?),
            }
            .insert(db)
            .await?;
        }
        Some(ComponentHandler::Ephemeral(_)) => {
            let handler_id = handler_id.ok_or_else(|| {
                Error::internal("Ephemeral handler was not put in the registry")
            })?;
            ephemeral_handler::ActiveModel {
                component_id: Set(component_id),
                handler_id: Set(handler_id),
            }
            .insert(db)
            .await?;
        }
        None => {}
    }

    if let Some(timeout) = builder.component_timeout() {
        insert_timeout(db, component_id, timeout, timeout_handler_id).await?;
    }

    Ok(component_id)
}

async fn insert_group<C: ConnectionTrait>(
    db: &C,
    builder: &ComponentGroupBuilder,
    timeout_handler_id: Option<i32>,
) -> Result<i32> {
    let member_ids = builder.component_ids();

    let members = component::Entity::find()
        .filter(component::Column::ComponentId.is_in(member_ids.iter().copied()))
        .all(db)
        .await?;
    for member_id in member_ids {
        let Some(member) = members.iter().find(|row| row.component_id == *member_id) else {
            return Err(Error::user(format!(
                "Cannot add component {member_id} to a group, it does not exist"
            )));
        };
        if member.component_type == ComponentType::Group.key() {
            return Err(Error::user(format!(
                "Cannot add group {member_id} to another group"
            )));
        }
    }

    let with_persistent_timeout = persistent_timeout::Entity::find()
        .filter(persistent_timeout::Column::ComponentId.is_in(member_ids.iter().copied()))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.component_id);
    let with_ephemeral_timeout = ephemeral_timeout::Entity::find()
        .filter(ephemeral_timeout::Column::ComponentId.is_in(member_ids.iter().copied()))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.component_id);
    let with_timeout: BTreeSet<i32> = with_persistent_timeout.chain(with_ephemeral_timeout).collect();
    if !with_timeout.is_empty() {
        return Err(Error::user(format!(
            "Components {with_timeout:?} cannot be put in a group as they have their own timeout, \
             only the group can have a timeout"
        )));
    }

    let already_grouped: Vec<i32> = component_group::Entity::find()
        .filter(component_group::Column::ComponentId.is_in(member_ids.iter().copied()))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.component_id)
        .collect();
    if !already_grouped.is_empty() {
        return Err(Error::user(format!(
            "Components {already_grouped:?} already belong to a group"
        )));
    }

    let group = component::ActiveModel {
        component_id: NotSet,
        component_type: Set(ComponentType::Group.key()),
        lifetime_type: Set(builder.lifetime_type().key()),
        one_use: Set(builder.is_one_use()),
        rate_limit_group: Set(None),
        filters: Set(to_json(&Vec::<String>::new())?),
    }
    .insert(db)
    .await?;
    let group_id = group.component_id;

    let memberships = std::iter::once(group_id)
        .chain(member_ids.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|component_id| component_group::ActiveModel {
            component_id: Set(component_id),
            group_id: Set(group_id),
        });
    component_group::Entity::insert_many(memberships)
        .exec(db)
        .await?;

    if let Some(timeout) = builder.component_timeout() {
        insert_timeout(db, group_id, timeout, timeout_handler_id).await?;
    }

    Ok(group_id)
}

async fn insert_timeout<C: ConnectionTrait>(
    db: &C,
    component_id: i32,
    timeout: &ComponentTimeout,
    timeout_handler_id: Option<i32>,
) -> Result<()> {
    match timeout {
        ComponentTimeout::Persistent(timeout) => {
            persistent_timeout::ActiveModel {
                component_id: Set(component_id),
                expiration_timestamp: Set(timeout.expiration),
                handler_name: Set(timeout.handler_name.clone()),
                user_data: Set(Some(to_json(&timeout.user_data)?)),
            }
            .insert(db)
            .await?;
        }
        ComponentTimeout::Ephemeral(timeout) => {
            ephemeral_timeout::ActiveModel {
                component_id: Set(component_id),
                expiration_timestamp: Set(timeout.expiration),
                handler_id: Set(timeout_handler_id),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

async fn load_persistent_timeout<C: ConnectionTrait>(
    db: &C,
    component_id: i32,
) -> Result<Option<PersistentTimeout>> {
    let Some(row) = persistent_timeout::Entity::find_by_id(component_id).one(db).await? else {
        return Ok(None);
    };

    let user_data = match row.user_data {
        Some(user_data) => from_json(&user_data)?,
        None => Vec::new(),
    };
    Ok(Some(PersistentTimeout {
        expiration: row.expiration_timestamp,
        handler_name: row.handler_name,
        user_data,
    }))
}

/// Deletes the rows of `ids` in every table, satellites first.
async fn delete_rows<C: ConnectionTrait>(db: &C, ids: &[i32]) -> Result<()> {
    let id_list = || ids.iter().copied();

    component_constraints::Entity::delete_many()
        .filter(component_constraints::Column::ComponentId.is_in(id_list()))
        .exec(db)
        .await?;
    component_group::Entity::delete_many()
        .filter(
            component_group::Column::ComponentId
                .is_in(id_list())
                .or(component_group::Column::GroupId.is_in(id_list())),
        )
        .exec(db)
        .await?;
    persistent_handler::Entity::delete_many()
        .filter(persistent_handler::Column::ComponentId.is_in(id_list()))
        .exec(db)
        .await?;
    ephemeral_handler::Entity::delete_many()
        .filter(ephemeral_handler::Column::ComponentId.is_in(id_list()))
        .exec(db)
        .await?;
    persistent_timeout::Entity::delete_many()
        .filter(persistent_timeout::Column::ComponentId.is_in(id_list()))
        .exec(db)
        .await?;
    ephemeral_timeout::Entity::delete_many()
        .filter(ephemeral_timeout::Column::ComponentId.is_in(id_list()))
        .exec(db)
        .await?;
    component::Entity::delete_many()
        .filter(component::Column::ComponentId.is_in(id_list()))
        .exec(db)
        .await?;

    Ok(())
}

fn constraints_from_row(row: component_constraints::Model) -> Result<InteractionConstraints> {
    #[allow(clippy::cast_sign_loss)]
    let allowing_permissions = row.permissions as u64;
    Ok(InteractionConstraints {
        allowed_users: from_json(&row.users)?,
        allowed_roles: from_json(&row.roles)?,
        allowing_permissions,
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(Into::into)
}
