use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use plantops_core::provider::open_meteo::OpenMeteoClient;
use plantops_core::store::postgres::PgPlantStore;
use plantops_core::{Config, NewPlant, PlantUpdate, Usecase};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "plantops",
    version,
    about = "Power plant records enriched with live weather data"
)]
pub struct Cli {
    /// Path to the TOML config file; defaults to the platform config
    /// directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending database schema migrations.
    Migrate {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Register a new power plant.
    Create {
        /// Name of the power plant.
        name: String,

        /// Latitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        /// Longitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
    },

    /// Replace a power plant's fields, guarded by its last-known revision.
    Update {
        /// ID of the power plant.
        id: i64,

        /// Latest revision of the power plant, as returned by `get`.
        #[arg(long)]
        revision: i64,

        #[arg(long)]
        name: String,

        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
    },

    /// Show one power plant with forecast and elevation data.
    Get {
        id: i64,

        /// Forecast length in days: 1, 3, 7, 14 or 16.
        #[arg(long, default_value_t = 7)]
        days: i32,
    },

    /// List power plants after the given cursor, enriched with forecasts.
    List {
        /// Cursor: the highest id already seen; 0 starts from the beginning.
        #[arg(long, default_value_t = 0)]
        last_id: i64,

        /// Page size; 0 uses the default of 10.
        #[arg(long, default_value_t = 0)]
        count: i64,

        /// Forecast length in days: 1, 3, 7, 14 or 16.
        #[arg(long, default_value_t = 7)]
        days: i32,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let store = PgPlantStore::connect(&config.database.url).await?;

        match self.command {
            Command::Migrate { yes } => {
                if !yes {
                    let confirmed =
                        inquire::Confirm::new("Apply pending migrations to the configured database?")
                            .with_default(false)
                            .prompt()?;
                    if !confirmed {
                        println!("Aborted.");
                        return Ok(());
                    }
                }

                store.migrate().await?;
                println!("Migrations applied.");
                Ok(())
            }

            Command::Create {
                name,
                latitude,
                longitude,
            } => {
                let usecase = build_usecase(store, &config)?;
                let plant = usecase
                    .create_plant(NewPlant {
                        name,
                        latitude,
                        longitude,
                    })
                    .await?;
                print_json(&plant)
            }

            Command::Update {
                id,
                revision,
                name,
                latitude,
                longitude,
            } => {
                let usecase = build_usecase(store, &config)?;
                let plant = usecase
                    .update_plant(PlantUpdate {
                        id,
                        revision,
                        name,
                        latitude,
                        longitude,
                    })
                    .await?;
                print_json(&plant)
            }

            Command::Get { id, days } => {
                let usecase = build_usecase(store, &config)?;
                let plant = usecase.get_plant(id, days).await?;
                print_json(&plant)
            }

            Command::List {
                last_id,
                count,
                days,
            } => {
                let usecase = build_usecase(store, &config)?;
                let plants = usecase.list_plants(last_id, count, days).await?;
                print_json(&plants)
            }
        }
    }
}

fn build_usecase(store: PgPlantStore, config: &Config) -> anyhow::Result<Usecase> {
    let weather = OpenMeteoClient::new(&config.open_meteo)?;
    Ok(Usecase::new(Arc::new(store), Arc::new(weather)))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
