use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, instrument};

use crate::error::{Error, Result};
use crate::model::{
    Coordinates, EnrichedPlant, NewPlant, PlantUpdate, PowerPlant, is_valid_forecast_days,
};
use crate::provider::WeatherProvider;
use crate::store::{PlantStore, StoreError};

/// Page size used by [`Usecase::list_plants`] when the caller passes 0.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// The service core: validates inputs, orchestrates the store and the
/// weather provider, and produces enriched records.
///
/// Mutations use optimistic concurrency: updates carry the caller's
/// last-known revision and fail as not-found when it is stale. Reads
/// recompute enrichment on every call; nothing fetched from the provider is
/// ever persisted.
pub struct Usecase {
    store: Arc<dyn PlantStore>,
    weather: Arc<dyn WeatherProvider>,
}

impl Usecase {
    pub fn new(store: Arc<dyn PlantStore>, weather: Arc<dyn WeatherProvider>) -> Self {
        Self { store, weather }
    }

    /// Validates and creates a new power plant. The returned record carries
    /// the store-assigned id and revision 1.
    #[instrument(skip(self))]
    pub async fn create_plant(&self, plant: NewPlant) -> Result<PowerPlant> {
        validate_fields(&plant.name, plant.latitude, plant.longitude)?;

        self.store
            .create(plant)
            .await
            .map_err(|err| store_error(err, "id not found", "creating power plant"))
    }

    /// Replaces a power plant's fields, guarded by the caller's last-known
    /// revision. A missing id and a stale revision are indistinguishable at
    /// the store and both fail as not-found; callers re-read the record to
    /// pick up the current revision and resubmit.
    #[instrument(skip(self))]
    pub async fn update_plant(&self, update: PlantUpdate) -> Result<PowerPlant> {
        if update.id == 0 {
            return Err(Error::invalid_argument("id is required"));
        }
        if update.revision == 0 {
            return Err(Error::invalid_argument("revision is required"));
        }
        validate_fields(&update.name, update.latitude, update.longitude)?;

        self.store
            .update(update)
            .await
            .map_err(|err| store_error(err, "id/revision pair not found", "updating power plant"))
    }

    /// Returns one power plant enriched with a fresh forecast and elevation.
    #[instrument(skip(self))]
    pub async fn get_plant(&self, id: i64, forecast_days: i32) -> Result<EnrichedPlant> {
        if id == 0 {
            return Err(Error::invalid_argument("id is required"));
        }
        validate_forecast_days(forecast_days)?;

        let plant = self
            .store
            .get(id)
            .await
            .map_err(|err| store_error(err, "id not found", "getting power plant"))?;

        let coordinates = plant.coordinates();

        let forecast = self
            .weather
            .forecast(coordinates, forecast_days)
            .await
            .map_err(|err| provider_error(err, "getting weather forecast"))?;

        let elevations = self
            .weather
            .elevations(&[coordinates])
            .await
            .map_err(|err| provider_error(err, "getting elevation"))?;
        if elevations.len() != 1 {
            return Err(contract_violation(anyhow!(
                "unexpected number of elevations: {}",
                elevations.len()
            )));
        }

        Ok(EnrichedPlant {
            plant,
            elevation: elevations[0],
            forecast,
        })
    }

    /// Returns a page of power plants enriched with forecasts and
    /// elevations.
    ///
    /// Pagination is a forward-only keyset cursor: `last_id` marks the last
    /// record already seen (0 for the beginning) and the page holds up to
    /// `count` records with larger ids, ascending. An empty page returns
    /// without contacting the provider; otherwise the whole page is covered
    /// by one batched forecast call and one batched elevation call, merged
    /// back by position.
    #[instrument(skip(self))]
    pub async fn list_plants(
        &self,
        last_id: i64,
        count: i64,
        forecast_days: i32,
    ) -> Result<Vec<EnrichedPlant>> {
        validate_forecast_days(forecast_days)?;

        let count = if count <= 0 { DEFAULT_PAGE_SIZE } else { count };

        let plants = self
            .store
            .list(last_id, count)
            .await
            .map_err(|err| store_error(err, "id not found", "listing power plants"))?;

        if plants.is_empty() {
            return Ok(Vec::new());
        }

        let coordinates: Vec<Coordinates> = plants.iter().map(PowerPlant::coordinates).collect();

        let forecasts = self
            .weather
            .forecast_batch(&coordinates, forecast_days)
            .await
            .map_err(|err| provider_error(err, "getting weather forecasts"))?;

        let elevations = self
            .weather
            .elevations(&coordinates)
            .await
            .map_err(|err| provider_error(err, "getting elevations"))?;

        if forecasts.len() != plants.len() || elevations.len() != plants.len() {
            return Err(contract_violation(anyhow!(
                "batched response length mismatch: {} plants, {} forecasts, {} elevations",
                plants.len(),
                forecasts.len(),
                elevations.len()
            )));
        }

        // The provider preserves request order in batched responses, so the
        // merge is positional.
        let enriched = plants
            .into_iter()
            .zip(forecasts)
            .zip(elevations)
            .map(|((plant, forecast), elevation)| EnrichedPlant {
                plant,
                elevation,
                forecast,
            })
            .collect();

        Ok(enriched)
    }
}

fn validate_fields(name: &str, latitude: f64, longitude: f64) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("name is required"));
    }
    if latitude == 0.0 {
        return Err(Error::invalid_argument("latitude is required"));
    }
    if longitude == 0.0 {
        return Err(Error::invalid_argument("longitude is required"));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::invalid_argument("latitude must be between -90 and 90"));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::invalid_argument(
            "longitude must be between -180 and 180",
        ));
    }
    Ok(())
}

fn validate_forecast_days(forecast_days: i32) -> Result<()> {
    if !is_valid_forecast_days(forecast_days) {
        return Err(Error::invalid_argument(
            "forecast days must be one of 1, 3, 7, 14 or 16",
        ));
    }
    Ok(())
}

fn store_error(err: StoreError, not_found_reason: &str, op: &str) -> Error {
    match err {
        StoreError::RowNotFound => Error::not_found(not_found_reason),
        StoreError::Backend(source) => {
            error!(error = ?source, "store failure while {op}");
            Error::internal(source)
        }
    }
}

fn provider_error(source: anyhow::Error, op: &str) -> Error {
    error!(error = ?source, "weather provider failure while {op}");
    Error::internal(source)
}

fn contract_violation(source: anyhow::Error) -> Error {
    error!(error = ?source, "weather provider contract violation");
    Error::internal(source)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::model::{ForecastProperties, HourlySample};

    fn sample(time: &str, base: f64) -> HourlySample {
        HourlySample {
            time: time.to_string(),
            temperature: base + 0.1,
            precipitation: base + 0.2,
            wind_speed: base + 0.3,
            wind_direction: base + 0.4,
        }
    }

    /// Deterministic provider: elevation is latitude/longitude, batch
    /// entries vary by position so positional merges are observable.
    #[derive(Debug, Default)]
    struct FakeWeather {
        forecast_calls: AtomicUsize,
        batch_calls: AtomicUsize,
        elevation_calls: AtomicUsize,
        truncate_batches: bool,
    }

    impl FakeWeather {
        fn provider_calls(&self) -> usize {
            self.forecast_calls.load(Ordering::SeqCst)
                + self.batch_calls.load(Ordering::SeqCst)
                + self.elevation_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeWeather {
        async fn forecast(
            &self,
            _coordinates: Coordinates,
            _forecast_days: i32,
        ) -> anyhow::Result<ForecastProperties> {
            self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ForecastProperties {
                has_precipitation_today: true,
                hourly: vec![sample("2024-09-06T00:00", 1.0), sample("2024-09-06T01:00", 11.0)],
            })
        }

        async fn forecast_batch(
            &self,
            coordinates: &[Coordinates],
            _forecast_days: i32,
        ) -> anyhow::Result<Vec<ForecastProperties>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);

            let mut len = coordinates.len();
            if self.truncate_batches {
                len -= 1;
            }

            Ok((0..len)
                .map(|i| ForecastProperties {
                    has_precipitation_today: i % 2 == 0,
                    hourly: vec![sample("2024-09-06T00:00", i as f64)],
                })
                .collect())
        }

        async fn elevations(&self, coordinates: &[Coordinates]) -> anyhow::Result<Vec<f64>> {
            self.elevation_calls.fetch_add(1, Ordering::SeqCst);
            Ok(coordinates
                .iter()
                .map(|c| c.latitude / c.longitude)
                .collect())
        }
    }

    /// In-memory stand-in for the store holding ids 1..=max_id.
    #[derive(Debug)]
    struct FakeStore {
        max_id: i64,
        calls: AtomicUsize,
        last_count: AtomicI64,
    }

    impl FakeStore {
        fn new(max_id: i64) -> Self {
            Self {
                max_id,
                calls: AtomicUsize::new(0),
                last_count: AtomicI64::new(-1),
            }
        }

        fn stored(id: i64) -> PowerPlant {
            PowerPlant {
                id,
                name: format!("My Cool Power Plant {id}"),
                latitude: 0.22 + (id * 10) as f64,
                longitude: 0.44 + (id * 10) as f64,
                revision: 2,
                created_at: Utc::now(),
                updated_at: Some(Utc::now()),
            }
        }
    }

    #[async_trait]
    impl PlantStore for FakeStore {
        async fn create(&self, plant: NewPlant) -> std::result::Result<PowerPlant, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PowerPlant {
                id: 1,
                name: plant.name,
                latitude: plant.latitude,
                longitude: plant.longitude,
                revision: 1,
                created_at: Utc::now(),
                updated_at: None,
            })
        }

        async fn update(&self, update: PlantUpdate) -> std::result::Result<PowerPlant, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if update.id > self.max_id || update.revision == 999 {
                return Err(StoreError::RowNotFound);
            }
            Ok(PowerPlant {
                id: update.id,
                name: update.name,
                latitude: update.latitude,
                longitude: update.longitude,
                revision: update.revision + 1,
                created_at: Utc::now(),
                updated_at: Some(Utc::now()),
            })
        }

        async fn get(&self, id: i64) -> std::result::Result<PowerPlant, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id > self.max_id {
                return Err(StoreError::RowNotFound);
            }
            Ok(PowerPlant {
                id,
                name: "My Cool Power Plant".to_string(),
                latitude: 22.11,
                longitude: 33.11,
                revision: 2,
                created_at: Utc::now(),
                updated_at: Some(Utc::now()),
            })
        }

        async fn list(
            &self,
            last_id: i64,
            count: i64,
        ) -> std::result::Result<Vec<PowerPlant>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_count.store(count, Ordering::SeqCst);

            let first = last_id + 1;
            let last = (last_id + count).min(self.max_id);
            Ok((first..=last).map(Self::stored).collect())
        }
    }

    fn usecase(max_id: i64) -> (Usecase, Arc<FakeStore>, Arc<FakeWeather>) {
        let store = Arc::new(FakeStore::new(max_id));
        let weather = Arc::new(FakeWeather::default());
        let usecase = Usecase::new(store.clone(), weather.clone());
        (usecase, store, weather)
    }

    fn new_plant(name: &str, latitude: f64, longitude: f64) -> NewPlant {
        NewPlant {
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    fn plant_update(id: i64, revision: i64) -> PlantUpdate {
        PlantUpdate {
            id,
            revision,
            name: "My Cool Power Plant".to_string(),
            latitude: 1.1,
            longitude: 2.2,
        }
    }

    #[tokio::test]
    async fn create_returns_revision_one() {
        let (usecase, _, _) = usecase(5);

        let plant = usecase
            .create_plant(new_plant("Solar", 40.7128, -74.0060))
            .await
            .expect("create should succeed");

        assert_eq!(plant.revision, 1);
        assert_eq!(plant.name, "Solar");
        assert_eq!(plant.latitude, 40.7128);
        assert_eq!(plant.longitude, -74.0060);
        assert!(plant.updated_at.is_none());
    }

    #[tokio::test]
    async fn create_validates_fields_in_order() {
        let (usecase, store, _) = usecase(5);

        let cases = [
            (new_plant("", 1.1, 2.2), "name is required"),
            (new_plant("Solar", 0.0, 2.2), "latitude is required"),
            (new_plant("Solar", 1.1, 0.0), "longitude is required"),
            (new_plant("Solar", 91.1, 2.2), "latitude must be between -90 and 90"),
            (new_plant("Solar", 11.1, 181.2), "longitude must be between -180 and 180"),
        ];

        for (plant, expected) in cases {
            let err = usecase.create_plant(plant).await.unwrap_err();
            assert!(err.is_invalid_argument());
            assert_eq!(err.to_string(), expected);
        }

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_coordinate_is_required_not_out_of_range() {
        let (usecase, _, _) = usecase(5);

        // Presence is checked before range, so a zero latitude wins over an
        // out-of-range longitude.
        let err = usecase
            .create_plant(new_plant("Solar", 0.0, 200.0))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "latitude is required");
    }

    #[tokio::test]
    async fn update_increments_revision_and_sets_updated_at() {
        let (usecase, _, _) = usecase(5);

        let plant = usecase
            .update_plant(PlantUpdate {
                id: 1,
                revision: 2,
                name: "Renamed".to_string(),
                latitude: 3.3,
                longitude: 4.4,
            })
            .await
            .expect("update should succeed");

        assert_eq!(plant.revision, 3);
        assert_eq!(plant.name, "Renamed");
        assert_eq!(plant.latitude, 3.3);
        assert_eq!(plant.longitude, 4.4);
        assert!(plant.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_requires_id_then_revision() {
        let (usecase, store, _) = usecase(5);

        let err = usecase.update_plant(plant_update(0, 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "id is required");

        let err = usecase.update_plant(plant_update(1, 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "revision is required");

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_validates_fields_like_create() {
        let (usecase, store, _) = usecase(5);

        let mut update = plant_update(1, 2);
        update.latitude = 91.1;
        let err = usecase.update_plant(update).await.unwrap_err();
        assert_eq!(err.to_string(), "latitude must be between -90 and 90");

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_revision_fails_as_not_found() {
        let (usecase, _, _) = usecase(5);

        let err = usecase.update_plant(plant_update(1, 999)).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "id/revision pair not found");
    }

    #[tokio::test]
    async fn update_of_missing_id_fails_as_not_found() {
        let (usecase, _, _) = usecase(5);

        let err = usecase.update_plant(plant_update(999, 2)).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "id/revision pair not found");
    }

    #[tokio::test]
    async fn get_merges_forecast_and_elevation() {
        let (usecase, _, _) = usecase(5);

        let enriched = usecase.get_plant(1, 7).await.expect("get should succeed");

        assert_eq!(enriched.plant.id, 1);
        assert_eq!(enriched.plant.name, "My Cool Power Plant");
        assert_eq!(enriched.elevation, 22.11 / 33.11);
        assert!(enriched.forecast.has_precipitation_today);
        assert_eq!(enriched.forecast.hourly.len(), 2);
        assert_eq!(enriched.forecast.hourly[0].time, "2024-09-06T00:00");
    }

    #[tokio::test]
    async fn get_requires_id() {
        let (usecase, store, _) = usecase(5);

        let err = usecase.get_plant(0, 7).await.unwrap_err();

        assert_eq!(err.to_string(), "id is required");
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_of_missing_id_fails_as_not_found() {
        let (usecase, _, weather) = usecase(5);

        let err = usecase.get_plant(999, 7).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "id not found");
        assert_eq!(weather.provider_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_forecast_days_rejected_before_store() {
        let (usecase, store, weather) = usecase(5);

        for days in [0, 2, 8, 15] {
            let err = usecase.get_plant(1, days).await.unwrap_err();
            assert!(err.is_invalid_argument());

            let err = usecase.list_plants(0, 3, days).await.unwrap_err();
            assert!(err.is_invalid_argument());
        }

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(weather.provider_calls(), 0);
    }

    #[tokio::test]
    async fn list_pages_are_contiguous_and_disjoint() {
        let (usecase, _, _) = usecase(5);

        let first = usecase.list_plants(0, 3, 7).await.expect("list should succeed");
        let first_ids: Vec<i64> = first.iter().map(|p| p.plant.id).collect();
        assert_eq!(first_ids, [1, 2, 3]);

        let second = usecase
            .list_plants(first_ids[2], 2, 7)
            .await
            .expect("list should succeed");
        let second_ids: Vec<i64> = second.iter().map(|p| p.plant.id).collect();
        assert_eq!(second_ids, [4, 5]);
    }

    #[tokio::test]
    async fn list_count_zero_defaults_to_ten() {
        let (usecase, store, _) = usecase(5);

        usecase.list_plants(0, 0, 7).await.expect("list should succeed");

        assert_eq!(store.last_count.load(Ordering::SeqCst), DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn exhausted_range_skips_the_provider() {
        let (usecase, _, weather) = usecase(5);

        let page = usecase.list_plants(10, 3, 7).await.expect("list should succeed");

        assert!(page.is_empty());
        assert_eq!(weather.provider_calls(), 0);
    }

    #[tokio::test]
    async fn list_merges_enrichment_positionally() {
        let (usecase, _, _) = usecase(5);

        let page = usecase.list_plants(0, 3, 7).await.expect("list should succeed");
        assert_eq!(page.len(), 3);

        for (i, enriched) in page.iter().enumerate() {
            // Elevation comes from the fake's latitude/longitude formula for
            // the i-th submitted pair; the flag alternates by position.
            let expected = enriched.plant.latitude / enriched.plant.longitude;
            assert_eq!(enriched.elevation, expected);
            assert_eq!(enriched.forecast.has_precipitation_today, i % 2 == 0);
            assert_eq!(enriched.forecast.hourly[0].temperature, i as f64 + 0.1);
        }
    }

    #[tokio::test]
    async fn batch_length_mismatch_is_internal() {
        let store = Arc::new(FakeStore::new(5));
        let weather = Arc::new(FakeWeather {
            truncate_batches: true,
            ..FakeWeather::default()
        });
        let usecase = Usecase::new(store, weather);

        let err = usecase.list_plants(0, 3, 7).await.unwrap_err();

        assert_eq!(err.to_string(), "internal error");
    }
}
