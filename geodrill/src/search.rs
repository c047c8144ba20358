//! Recherche de lieux
//!
//! Fusionne trois sources, dans cet ordre: régions et départements (locaux,
//! correspondance de sous-chaîne sans casse) puis communes (recherche
//! distante). Une recherche distante en échec n'empêche pas les résultats
//! locaux.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::geography::GeographyRegistry;
use crate::types::{Area, Level};

/// Réglages de la recherche
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// En dessous de cette longueur, aucun résultat
    pub min_query_len: usize,
    pub max_results: usize,
    /// Nombre de communes demandées à la recherche distante
    pub commune_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_query_len: 2,
            max_results: 8,
            commune_limit: 5,
        }
    }
}

/// Lieu proposé à l'utilisateur
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub level: Level,
    pub name: String,
    pub code: String,
    /// Département connu (communes)
    pub department: Option<String>,
    /// Région connue (départements, communes)
    pub region: Option<String>,
}

impl Candidate {
    fn from_area(area: &Area) -> Self {
        Self {
            level: area.level,
            name: area.name.clone(),
            code: area.code.clone(),
            department: None,
            region: area.parent_code.clone(),
        }
    }
}

pub struct SearchResolver {
    registry: Arc<GeographyRegistry>,
    options: SearchOptions,
}

impl SearchResolver {
    pub fn new(registry: Arc<GeographyRegistry>, options: SearchOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    fn is_too_short(&self, query: &str) -> bool {
        query.trim().chars().count() < self.options.min_query_len
    }

    /// Régions puis départements correspondant à la requête
    pub fn search_local(&self, query: &str) -> Vec<Candidate> {
        if self.is_too_short(query) {
            return Vec::new();
        }
        let needle = query.trim().to_lowercase();
        let mut candidates = rank(self.registry.regions(), &needle);
        candidates.extend(rank(self.registry.departments(), &needle));
        candidates.truncate(self.options.max_results);
        candidates
    }

    /// Recherche complète (locale puis communes distantes)
    pub async fn search(&self, query: &str) -> Vec<Candidate> {
        if self.is_too_short(query) {
            debug!(query = query, "Query too short");
            return Vec::new();
        }

        let mut candidates = self.search_local(query);
        if candidates.len() < self.options.max_results {
            match self
                .registry
                .search_communes(query.trim(), self.options.commune_limit)
                .await
            {
                Ok(matches) => candidates.extend(matches.into_iter().map(|m| Candidate {
                    level: Level::Commune,
                    name: m.name,
                    code: m.code,
                    department: m.department,
                    region: m.region,
                })),
                Err(e) => warn!(query = query, error = %e, "Commune search failed, local results only"),
            }
        }

        candidates.truncate(self.options.max_results);
        candidates
    }
}

/// Sous-chaînes correspondantes, préfixes d'abord (ordre stable)
fn rank(areas: &[Area], needle: &str) -> Vec<Candidate> {
    let (mut prefixed, contained): (Vec<_>, Vec<_>) = areas
        .iter()
        .filter_map(|area| {
            let name = area.name.to_lowercase();
            name.contains(needle)
                .then(|| (name.starts_with(needle), Candidate::from_area(area)))
        })
        .partition(|(prefix, _)| *prefix);
    prefixed.extend(contained);
    prefixed.into_iter().map(|(_, c)| c).collect()
}
