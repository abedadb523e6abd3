use async_trait::async_trait;
use thiserror::Error;

use crate::model::{NewPlant, PlantUpdate, PowerPlant};

pub mod postgres;

/// Failures at the store boundary.
///
/// Row absence is a sentinel so the usecase can translate it into the public
/// taxonomy; everything else stays opaque and becomes an internal error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched: the id does not exist or, for conditional updates,
    /// the id/revision pair matched nothing.
    #[error("row not found")]
    RowNotFound,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence operations over power plant records.
#[async_trait]
pub trait PlantStore: Send + Sync {
    /// Inserts a record and returns it with the store-assigned id,
    /// revision 1 and `created_at`.
    async fn create(&self, plant: NewPlant) -> Result<PowerPlant, StoreError>;

    /// Applies a full-field update conditional on the supplied revision,
    /// incrementing the revision and refreshing `updated_at` atomically.
    /// Fails with [`StoreError::RowNotFound`] when the id/revision pair
    /// matches nothing.
    async fn update(&self, update: PlantUpdate) -> Result<PowerPlant, StoreError>;

    async fn get(&self, id: i64) -> Result<PowerPlant, StoreError>;

    /// Returns up to `count` records with `id > last_id`, ordered ascending
    /// by id.
    async fn list(&self, last_id: i64, count: i64) -> Result<Vec<PowerPlant>, StoreError>;
}
