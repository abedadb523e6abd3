use async_trait::async_trait;
use std::fmt::Debug;

use crate::model::{Coordinates, ForecastProperties};

pub mod open_meteo;

/// Weather data source consumed by the read pipeline.
///
/// The batched calls are order-preserving: the i-th element of a response
/// corresponds to the i-th requested coordinate pair. The usecase merges
/// positionally and treats a length mismatch as an internal error.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Hourly forecast plus the precipitation-today flag for one location.
    async fn forecast(
        &self,
        coordinates: Coordinates,
        forecast_days: i32,
    ) -> anyhow::Result<ForecastProperties>;

    /// Forecasts for a whole page of locations in one round trip.
    async fn forecast_batch(
        &self,
        coordinates: &[Coordinates],
        forecast_days: i32,
    ) -> anyhow::Result<Vec<ForecastProperties>>;

    /// Elevations in meters for a page of locations in one round trip.
    async fn elevations(&self, coordinates: &[Coordinates]) -> anyhow::Result<Vec<f64>>;
}
