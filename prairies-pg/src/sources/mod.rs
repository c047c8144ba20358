//! Sources de données: PostgreSQL, géographie HTTP ou locale

pub mod geo_api;
pub mod pool;
pub mod postgres;

pub use geo_api::GeoApiSource;
pub use pool::{create_pool, test_connection, DatabaseConfig, DatabaseOverrides, SslMode};
pub use postgres::PgAggregationProvider;
