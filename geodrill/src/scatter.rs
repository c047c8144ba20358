//! Vue dispersion altitude / pente
//!
//! Exploration indépendante de la carte: chaque point est une zone, un clic
//! descend d'un niveau (région -> département -> commune -> parcelle) et le
//! retour restaure exactement la liste de points précédente. La liste
//! affichée n'est empilée qu'une fois la descente appliquée.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::codes;
use crate::effects::RenderEffect;
use crate::error::DrillError;
use crate::filter::FilterState;
use crate::geography::GeographyRegistry;
use crate::join::join_stats;
use crate::navigation::{Commit, Outcome};
use crate::provider::{
    aggregate_communes, aggregate_level, parcels, with_timeout, AggregationLevel,
    AggregationProvider,
};
use crate::types::{Area, Level};

/// Liste de points empilée avant une descente
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterFrame {
    pub level: Level,
    pub points: Vec<Area>,
}

#[derive(Debug)]
struct ScatterState {
    level: Level,
    points: Vec<Area>,
    stack: Vec<ScatterFrame>,
    /// Incrémenté à chaque intention; une descente dont le numéro ne
    /// correspond plus est abandonnée
    sequence: u64,
}

/// Navigation de la vue dispersion
pub struct ScatterNavigator {
    registry: Arc<GeographyRegistry>,
    provider: Arc<dyn AggregationProvider>,
    filter: Arc<RwLock<FilterState>>,
    state: Mutex<ScatterState>,
}

impl ScatterNavigator {
    pub fn new(
        registry: Arc<GeographyRegistry>,
        provider: Arc<dyn AggregationProvider>,
        filter: Arc<RwLock<FilterState>>,
    ) -> Self {
        Self {
            registry,
            provider,
            filter,
            state: Mutex::new(ScatterState {
                level: Level::Region,
                points: Vec::new(),
                stack: Vec::new(),
                sequence: 0,
            }),
        }
    }

    pub async fn level(&self) -> Level {
        self.state.lock().await.level
    }

    /// Nombre de listes empilées
    pub async fn depth(&self) -> usize {
        self.state.lock().await.stack.len()
    }

    pub async fn points(&self) -> Vec<Area> {
        self.state.lock().await.points.clone()
    }

    /// Affiche les régions et vide la pile
    pub async fn start(&self) -> Result<Outcome, DrillError> {
        let selected = self.filter.read().await.selected();
        let sequence = self.next_sequence().await;

        let stats = with_timeout(
            "region aggregation",
            self.registry.fetch_timeout(),
            aggregate_level(&*self.provider, AggregationLevel::Region, &selected),
        )
        .await?;
        let points = join_stats(self.registry.regions(), &stats);

        let mut state = self.state.lock().await;
        if state.sequence != sequence {
            return Ok(Outcome::Stale);
        }
        state.level = Level::Region;
        state.points = points.clone();
        state.stack.clear();
        Ok(plotted(Level::Region, points))
    }

    /// Descend dans le point cliqué
    ///
    /// Au niveau parcelle, le clic se limite à la mise en évidence.
    pub async fn drill(&self, code: &str) -> Result<Outcome, DrillError> {
        let selected = self.filter.read().await.selected();
        let (from, snapshot, code, sequence) = {
            let mut state = self.state.lock().await;
            if state.level == Level::Parcel {
                drop(state);
                return self.highlight(code).await;
            }
            let code = codes::normalize(state.level, code);
            if !state.points.iter().any(|p| p.code == code) {
                return Err(DrillError::not_displayed(state.level, code));
            }
            state.sequence += 1;
            (state.level, state.points.clone(), code, state.sequence)
        };

        let timeout = self.registry.fetch_timeout();
        let provider = &*self.provider;
        let fetched: Result<(Level, Vec<Area>), DrillError> = match from {
            Level::Region => futures::try_join!(
                self.registry.region_departments(&code),
                with_timeout(
                    "department aggregation",
                    timeout,
                    aggregate_level(provider, AggregationLevel::Department, &selected),
                ),
            )
            .map(|(departments, stats)| (Level::Department, join_stats(&departments, &stats))),
            Level::Department => futures::try_join!(
                self.registry.communes_of_department(&code),
                with_timeout(
                    "commune aggregation",
                    timeout,
                    aggregate_communes(provider, &code, &selected),
                ),
            )
            .map(|(communes, stats)| (Level::Commune, join_stats(&communes, &stats))),
            Level::Commune | Level::Parcel => {
                with_timeout("commune parcels", timeout, parcels(provider, &code, &selected))
                    .await
                    .map(|list| {
                        (
                            Level::Parcel,
                            list.into_iter().map(|p| p.into_area()).collect(),
                        )
                    })
            }
        };
        let (level, points) = fetched.map_err(|e| {
            warn!(code = %code, error = %e, "Scatter drill failed");
            e
        })?;

        let mut state = self.state.lock().await;
        if state.sequence != sequence {
            debug!(code = %code, "Discarding stale scatter result");
            return Ok(Outcome::Stale);
        }
        state.stack.push(ScatterFrame {
            level: from,
            points: snapshot,
        });
        state.level = level;
        state.points = points.clone();
        info!(code = %code, level = %level, points = points.len(), "Scatter drilled");
        Ok(plotted(level, points))
    }

    /// Restaure la liste précédente; rien à la racine
    pub async fn back(&self) -> Outcome {
        let mut state = self.state.lock().await;
        let Some(frame) = state.stack.pop() else {
            return Outcome::Unchanged(Vec::new());
        };
        state.sequence += 1;
        state.level = frame.level;
        state.points = frame.points.clone();
        plotted(frame.level, frame.points)
    }

    /// Met en évidence un point affiché, sans changer de niveau
    pub async fn highlight(&self, code: &str) -> Result<Outcome, DrillError> {
        let state = self.state.lock().await;
        let code = codes::normalize(state.level, code);
        if !state.points.iter().any(|p| p.code == code) {
            return Err(DrillError::not_displayed(state.level, code));
        }
        Ok(Outcome::Unchanged(vec![RenderEffect::ScatterHighlight {
            code,
        }]))
    }

    async fn next_sequence(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.sequence += 1;
        state.sequence
    }
}

fn plotted(level: Level, points: Vec<Area>) -> Outcome {
    Outcome::Committed(Commit {
        level,
        features: points.clone(),
        effects: vec![RenderEffect::ScatterPlot { level, points }],
    })
}
