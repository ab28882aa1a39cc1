//! Database configuration module.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written DDL.

use crate::entities::{
    Component, ComponentConstraints, ComponentGroup, EphemeralHandler, EphemeralTimeout,
    PersistentHandler, PersistentTimeout,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/component_buddy.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable,
/// falling back to a local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database returned by [`get_database_url`].
#[instrument]
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to {database_url}");

    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all component tables (if missing) from their entity definitions.
///
/// The base `component` table comes first, every other table references it.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, Component).await?;
    create_table(db, ComponentConstraints).await?;
    create_table(db, ComponentGroup).await?;
    create_table(db, PersistentHandler).await?;
    create_table(db, EphemeralHandler).await?;
    create_table(db, PersistentTimeout).await?;
    create_table(db, EphemeralTimeout).await?;

    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;

    Ok(())
}
