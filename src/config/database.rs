//! Database configuration module.
//!
//! Handles the `SQLite` connection and table creation using `SeaORM`. Every table
//! is generated from its entity with `Schema::create_table_from_entity`, so the
//! schema always matches the Rust definitions. Creation is idempotent, which lets
//! `init-db` run against an existing database.

use crate::core::criteria;
use crate::entities::{
    Agency, AgencyMonthlyGoal, AgencyRevenue, Agreement, Budget, CalendarDay, Contract, Criterion,
    Distributable, Distribution, Draggable, Edital, JudicialSuspension, Limit, MonthlyGoal,
    NonDistributable, Participation, Period, PeriodGoal, RunState, ShareSnapshot,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::debug;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/cobranca.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns
/// the default local `SQLite` path.
pub fn get_database_url() -> Result<String> {
    Ok(std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()))
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url()?;
    debug!(url = %database_url, "connecting to database");

    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    db.execute(builder.build(statement.if_not_exists())).await?;
    Ok(())
}

/// Creates every table the engine uses and seeds the criterion reference rows.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let schema = Schema::new(db.get_database_backend());

    // Reference tables
    create_table(db, &schema, Edital).await?;
    create_table(db, &schema, Period).await?;
    create_table(db, &schema, Agency).await?;
    create_table(db, &schema, Participation).await?;
    create_table(db, &schema, AgencyRevenue).await?;
    create_table(db, &schema, Contract).await?;
    create_table(db, &schema, Agreement).await?;
    create_table(db, &schema, JudicialSuspension).await?;
    create_table(db, &schema, CalendarDay).await?;
    create_table(db, &schema, Budget).await?;
    create_table(db, &schema, Criterion).await?;

    // Working sets and results
    create_table(db, &schema, Distributable).await?;
    create_table(db, &schema, Draggable).await?;
    create_table(db, &schema, NonDistributable).await?;
    create_table(db, &schema, Distribution).await?;
    create_table(db, &schema, Limit).await?;
    create_table(db, &schema, ShareSnapshot).await?;
    create_table(db, &schema, PeriodGoal).await?;
    create_table(db, &schema, MonthlyGoal).await?;
    create_table(db, &schema, AgencyMonthlyGoal).await?;
    create_table(db, &schema, RunState).await?;

    criteria::ensure_standard_criteria(db).await?;

    Ok(())
}
