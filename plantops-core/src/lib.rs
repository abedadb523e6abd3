//! Core library for the `plantops` service.
//!
//! This crate defines:
//! - Configuration handling
//! - The power-plant domain model and error taxonomy
//! - Abstractions over the record store and the weather provider, with
//!   Postgres and Open-Meteo implementations
//! - The usecase layer that stitches stored records to live forecast and
//!   elevation data under optimistic concurrency
//!
//! It is used by `plantops-cli`, but can also be reused by other binaries or
//! services.

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod store;
pub mod usecase;

pub use config::{Config, DatabaseConfig, OpenMeteoConfig};
pub use error::{Error, Result};
pub use model::{
    Coordinates, EnrichedPlant, ForecastProperties, HourlySample, NewPlant, PlantUpdate,
    PowerPlant,
};
pub use provider::WeatherProvider;
pub use store::{PlantStore, StoreError};
pub use usecase::Usecase;
