use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{PlantStore, StoreError};
use crate::model::{NewPlant, PlantUpdate, PowerPlant};

/// Schema migrations embedded from `migrations/`, applied with
/// [`PgPlantStore::migrate`].
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Postgres-backed [`PlantStore`].
#[derive(Debug, Clone)]
pub struct PgPlantStore {
    pool: PgPool,
}

impl PgPlantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to postgres")?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("Failed to apply schema migrations")?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::RowNotFound,
        other => StoreError::Backend(other.into()),
    }
}

#[async_trait]
impl PlantStore for PgPlantStore {
    async fn create(&self, plant: NewPlant) -> Result<PowerPlant, StoreError> {
        sqlx::query_as::<_, PowerPlant>(
            "INSERT INTO power_plants (name, latitude, longitude)
             VALUES ($1, $2, $3)
             RETURNING id, name, latitude, longitude, revision, created_at, updated_at",
        )
        .bind(&plant.name)
        .bind(plant.latitude)
        .bind(plant.longitude)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn update(&self, update: PlantUpdate) -> Result<PowerPlant, StoreError> {
        // Single conditional statement: the revision check, the increment and
        // the timestamp refresh are atomic, so a stale revision affects zero
        // rows and surfaces as RowNotFound.
        sqlx::query_as::<_, PowerPlant>(
            "UPDATE power_plants
             SET name = $1, latitude = $2, longitude = $3,
                 revision = revision + 1, updated_at = NOW()
             WHERE id = $4 AND revision = $5
             RETURNING id, name, latitude, longitude, revision, created_at, updated_at",
        )
        .bind(&update.name)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(update.id)
        .bind(update.revision)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn get(&self, id: i64) -> Result<PowerPlant, StoreError> {
        sqlx::query_as::<_, PowerPlant>(
            "SELECT id, name, latitude, longitude, revision, created_at, updated_at
             FROM power_plants WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn list(&self, last_id: i64, count: i64) -> Result<Vec<PowerPlant>, StoreError> {
        sqlx::query_as::<_, PowerPlant>(
            "SELECT id, name, latitude, longitude, revision, created_at, updated_at
             FROM power_plants WHERE id > $1
             ORDER BY id
             LIMIT $2",
        )
        .bind(last_id)
        .bind(count)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}
