use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Forecast lengths accepted by the read paths, in days.
pub const VALID_FORECAST_DAYS: [i32; 5] = [1, 3, 7, 14, 16];

/// Returns true if `days` is one of the supported forecast lengths.
pub fn is_valid_forecast_days(days: i32) -> bool {
    VALID_FORECAST_DAYS.contains(&days)
}

/// A persisted power plant record.
///
/// `revision` starts at 1 and increments by exactly 1 on every accepted
/// update; it is the concurrency token for [`PlantUpdate`]. `updated_at`
/// stays unset until the first update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PowerPlant {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PowerPlant {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A latitude/longitude pair in degrees.
///
/// The read pipeline carries one ordered sequence of these end-to-end; only
/// the provider implementation splits them into separate wire parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Input for creating a record. The store assigns id, revision and
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewPlant {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Full-field replacement guarded by the caller's last-known revision.
#[derive(Debug, Clone)]
pub struct PlantUpdate {
    pub id: i64,
    pub revision: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One hourly forecast sample. `time` is the provider's local-time stamp,
/// kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySample {
    pub time: String,
    pub temperature: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
}

/// Transient weather enrichment for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastProperties {
    pub has_precipitation_today: bool,
    pub hourly: Vec<HourlySample>,
}

/// A stored record merged with freshly fetched enrichment. The enrichment is
/// recomputed on every read and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPlant {
    #[serde(flatten)]
    pub plant: PowerPlant,
    pub elevation: f64,
    #[serde(flatten)]
    pub forecast: ForecastProperties,
}
