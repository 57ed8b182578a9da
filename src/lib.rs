pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

pub use error::EngineError;

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

/// Open the durable store configured by environment/config file and bring
/// its schema up to date. Transport layers build on top of this.
pub async fn open_postgres_store() -> anyhow::Result<PostgresStore> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();

    let config = crate::config::AppConfig::load()?;
    let store = PostgresStore::new(&config.database_url()?).await?;
    store.migrate().await?;

    Ok(store)
}
