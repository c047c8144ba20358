//! # geodrill
//!
//! Navigation hiérarchique (région -> département -> commune -> parcelle)
//! sur des statistiques de parcelles agricoles, filtrées par type
//! d'occupation du sol.
//!
//! ## Features
//!
//! - Carte choroplèthe pilotée par effets de rendu (aucun dessin dans le cœur)
//! - Résultats périmés ignorés: seule la dernière sélection est appliquée
//! - Réagrégation au changement de filtre, au retour et au démarrage
//! - Vue dispersion altitude / pente avec pile de retour
//! - Recherche de lieux et saut direct vers une région, un département ou une commune
//! - Moteurs d'agrégation et sources géographiques interchangeables (traits)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geodrill::{GeographyRegistry, RegistryOptions, SearchOptions, Viewer};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(GeographyRegistry::load(source, RegistryOptions::default()).await?);
//! let (viewer, effects) = Viewer::open(registry, provider, SearchOptions::default()).await?;
//! renderer.apply_all(&effects);
//!
//! let outcome = viewer.navigator.select_region("84").await?;
//! renderer.apply_all(&outcome.into_effects());
//! ```

pub mod codes;
pub mod effects;
pub mod error;
pub mod filter;
pub mod geography;
pub mod join;
pub mod jump;
pub mod memory;
pub mod navigation;
pub mod provider;
pub mod scale;
pub mod scatter;
pub mod search;
pub mod types;
pub mod viewer;

pub use effects::{PanelSummary, RenderEffect, Renderer};
pub use error::DrillError;
pub use filter::FilterState;
pub use geography::{areas_from_geojson, GeographyRegistry, RegistryOptions};
pub use jump::{JumpReport, JumpTarget};
pub use memory::{InMemoryProvider, ParcelRecord};
pub use navigation::{Commit, NavigationSnapshot, Navigator, Outcome};
pub use provider::{
    AggregationLevel, AggregationProvider, BoxFuture, CommuneMatch, GeographySource, StatsRow,
};
pub use scale::{ColorRamp, Indicator, ScaleDomain};
pub use scatter::ScatterNavigator;
pub use search::{Candidate, SearchOptions, SearchResolver};
pub use types::{Area, AreaStats, LandCoverStats, Level, ParcelStats, StatsByCode};
pub use viewer::Viewer;
