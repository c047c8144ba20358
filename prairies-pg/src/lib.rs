//! # prairies-pg
//!
//! Visualiseur en console de l'altitude et de la pente des parcelles
//! agricoles, de la région à la parcelle, adossé à PostgreSQL/PostGIS.
//!
//! ## Features
//!
//! - Agrégation SQL avec pool de connexions (ou en mémoire depuis un fichier JSON)
//! - Géographie depuis geo.api.gouv.fr ou des fichiers GeoJSON locaux
//! - Rendu console et export GeoJSON des couches dessinées
//! - Rapport de session
//!
//! ## Usage CLI
//!
//! ```bash
//! # Shell interactif sur la base PostgreSQL (PGHOST, PGDATABASE, ...)
//! prairies-pg --config geo-api
//!
//! # Données locales, parcelles en mémoire, export des couches
//! prairies-pg --config local --parcels ./parcelles.json --export-dir ./layers/
//!
//! # Saut direct vers un département
//! prairies-pg jump department 38
//! ```

pub mod config;
pub mod render;
pub mod report;
pub mod sources;

pub use config::ViewerConfig;
pub use render::ConsoleRenderer;
pub use report::SessionReport;
pub use sources::{create_pool, DatabaseConfig, GeoApiSource, PgAggregationProvider};
