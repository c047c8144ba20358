//! Navigation asynchrone de la carte
//!
//! Relie le `NavigationContext` aux sources externes. Les deux lectures d'une
//! sélection (appartenance ou contours, et agrégation) partent en parallèle;
//! le résultat n'est appliqué que s'il correspond encore à la dernière
//! intention de l'utilisateur.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::context::{NavigationContext, Stale};
use crate::effects::{PanelSummary, RenderEffect};
use crate::error::DrillError;
use crate::filter::FilterState;
use crate::geography::GeographyRegistry;
use crate::join::join_stats;
use crate::provider::{
    aggregate_communes, aggregate_level, with_timeout, AggregationLevel, AggregationProvider,
};
use crate::scale::Indicator;
use crate::types::{Area, Level, StatsByCode};

/// Transition appliquée
#[derive(Debug, Clone)]
pub struct Commit {
    /// Niveau de la couche devenue interactive
    pub level: Level,
    /// Zones de cette couche, statistiques jointes
    pub features: Vec<Area>,
    pub effects: Vec<RenderEffect>,
}

/// Issue d'une action de navigation
#[derive(Debug, Clone)]
pub enum Outcome {
    Committed(Commit),
    /// Aucune nouvelle couche (sélection d'une commune, rien à réagréger)
    Unchanged(Vec<RenderEffect>),
    /// Résultat abandonné au profit d'une action plus récente
    Stale,
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Outcome::Stale)
    }

    pub fn commit(&self) -> Option<&Commit> {
        match self {
            Outcome::Committed(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn into_effects(self) -> Vec<RenderEffect> {
        match self {
            Outcome::Committed(commit) => commit.effects,
            Outcome::Unchanged(effects) => effects,
            Outcome::Stale => Vec::new(),
        }
    }
}

/// Photographie de l'état de navigation
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSnapshot {
    pub level: Level,
    pub active_region: Option<String>,
    pub active_department: Option<String>,
    pub selected_commune: Option<String>,
    pub indicator: Indicator,
    pub features: Vec<Area>,
}

/// Navigation région -> département -> commune
pub struct Navigator {
    registry: Arc<GeographyRegistry>,
    provider: Arc<dyn AggregationProvider>,
    filter: Arc<RwLock<FilterState>>,
    context: Mutex<NavigationContext>,
}

impl Navigator {
    pub fn new(
        registry: Arc<GeographyRegistry>,
        provider: Arc<dyn AggregationProvider>,
        filter: FilterState,
    ) -> Self {
        Self {
            registry,
            provider,
            filter: Arc::new(RwLock::new(filter)),
            context: Mutex::new(NavigationContext::default()),
        }
    }

    /// Filtre partagé (avec la vue dispersion)
    pub fn filter_handle(&self) -> Arc<RwLock<FilterState>> {
        Arc::clone(&self.filter)
    }

    pub fn registry(&self) -> &Arc<GeographyRegistry> {
        &self.registry
    }

    async fn selected(&self) -> Vec<String> {
        self.filter.read().await.selected()
    }

    /// Dessine les régions puis les colore avec le filtre courant
    pub async fn start(&self) -> Result<Outcome, DrillError> {
        let mut effects = self
            .context
            .lock()
            .await
            .install_regions(self.registry.regions().to_vec());

        let refresh = self.refresh().await?;
        effects.extend(refresh.into_effects());

        let features = self.context.lock().await.displayed().to_vec();
        info!(regions = features.len(), "Map ready");
        Ok(Outcome::Committed(Commit {
            level: Level::Region,
            features,
            effects,
        }))
    }

    /// Sélectionne une région et affiche ses départements
    pub async fn select_region(&self, code: &str) -> Result<Outcome, DrillError> {
        let selected = self.selected().await;
        let request = {
            let mut ctx = self.context.lock().await;
            let region = ctx
                .layer(Level::Region)
                .iter()
                .find(|r| r.code == code.trim())
                .cloned()
                .or_else(|| self.registry.region(code).cloned())
                .ok_or_else(|| DrillError::unknown(Level::Region, code.trim()))?;
            ctx.begin_region(region)
        };
        let region = request.region.code.as_str();

        let timeout = self.registry.fetch_timeout();
        let fetched = futures::try_join!(
            self.registry.region_departments(region),
            with_timeout(
                "department aggregation",
                timeout,
                aggregate_level(&*self.provider, AggregationLevel::Department, &selected),
            ),
            with_timeout(
                "region aggregation",
                timeout,
                aggregate_level(&*self.provider, AggregationLevel::Region, &selected),
            ),
        );
        let (departments, stats, region_stats) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(region = region, error = %e, "Region selection failed");
                return Err(e);
            }
        };

        let features = join_stats(&departments, &stats);
        let committed = self
            .context
            .lock()
            .await
            .commit_region(&request, &region_stats, features.clone());
        Ok(match committed {
            Ok(effects) => {
                info!(region = region, departments = features.len(), "Region selected");
                let commit = Commit {
                    level: Level::Department,
                    features,
                    effects,
                };
                Outcome::Committed(self.settle(&selected, commit).await)
            }
            Err(Stale) => {
                debug!(region = region, "Discarding stale region result");
                Outcome::Stale
            }
        })
    }

    /// Sélectionne un département affiché et affiche ses communes
    pub async fn select_department(&self, code: &str) -> Result<Outcome, DrillError> {
        let selected = self.selected().await;
        let request = self.context.lock().await.begin_department(code)?;
        let department = request.department.code.as_str();

        let fetched = futures::try_join!(
            self.registry.communes_of_department(department),
            with_timeout(
                "commune aggregation",
                self.registry.fetch_timeout(),
                aggregate_communes(&*self.provider, department, &selected),
            ),
        );
        let (communes, stats) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(department = department, error = %e, "Department selection failed");
                return Err(e);
            }
        };

        let features = join_stats(&communes, &stats);
        let committed = self
            .context
            .lock()
            .await
            .commit_department(&request, features.clone());
        Ok(match committed {
            Ok(effects) => {
                info!(department = department, communes = features.len(), "Department selected");
                let commit = Commit {
                    level: Level::Commune,
                    features,
                    effects,
                };
                Outcome::Committed(self.settle(&selected, commit).await)
            }
            Err(Stale) => {
                debug!(department = department, "Discarding stale department result");
                Outcome::Stale
            }
        })
    }

    /// Réagrège la couche tout juste appliquée si le filtre a changé pendant
    /// la lecture
    async fn settle(&self, fetched_with: &[String], mut commit: Commit) -> Commit {
        if self.selected().await == fetched_with {
            return commit;
        }
        debug!(level = %commit.level, "Filter changed during fetch, re-aggregating");
        match self.refresh().await {
            Ok(Outcome::Committed(refreshed)) => {
                commit.features = refreshed.features;
                commit.effects.extend(refreshed.effects);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Re-aggregation after selection failed"),
        }
        commit
    }

    /// Sélectionne une commune affichée (aucune lecture externe)
    pub async fn select_commune(&self, code: &str) -> Result<Outcome, DrillError> {
        let effects = self.context.lock().await.select_commune(code)?;
        Ok(Outcome::Unchanged(effects))
    }

    /// Remonte d'un niveau puis réagrège la couche redevenue interactive
    ///
    /// Le panneau de la zone quittée est construit à partir de la couche
    /// réagrégée. Un échec de réagrégation est journalisé: la navigation reste
    /// valide et le panneau s'affiche sans données.
    pub async fn back(&self) -> Vec<RenderEffect> {
        let (mut effects, left) = {
            let mut ctx = self.context.lock().await;
            let left = match ctx.level() {
                Level::Commune => ctx.active_department(),
                _ => ctx.active_region(),
            }
            .map(|area| area.code.clone());
            (ctx.back(), left)
        };
        if effects.is_empty() {
            return effects;
        }

        let refreshed = match self.refresh().await {
            Ok(Outcome::Committed(commit)) => {
                effects.extend(commit.effects);
                Some(commit.features)
            }
            Ok(Outcome::Unchanged(_)) => None,
            Ok(Outcome::Stale) => return effects,
            Err(e) => {
                warn!(error = %e, "Re-aggregation after back failed");
                None
            }
        };

        let ctx = self.context.lock().await;
        let area = left.and_then(|code| match &refreshed {
            Some(features) => features.iter().find(|a| a.code == code).cloned(),
            None => ctx
                .displayed()
                .iter()
                .find(|a| a.code == code)
                .map(|a| a.clone().with_stats(None)),
        });
        if let Some(area) = area {
            effects.push(RenderEffect::UpdatePanel(PanelSummary::new(&area, ctx.indicator())));
        }
        effects
    }

    /// Réagrège la couche interactive avec le filtre courant
    pub async fn refresh(&self) -> Result<Outcome, DrillError> {
        let selected = self.selected().await;
        let request = self.context.lock().await.begin_refresh();
        let Some(request) = request else {
            return Ok(Outcome::Unchanged(Vec::new()));
        };

        let timeout = self.registry.fetch_timeout();
        let provider = &*self.provider;
        let stats: Result<StatsByCode, DrillError> = match (request.level, &request.department) {
            (Level::Commune, Some(department)) => {
                with_timeout(
                    "commune aggregation",
                    timeout,
                    aggregate_communes(provider, department, &selected),
                )
                .await
            }
            (Level::Department, _) => {
                with_timeout(
                    "department aggregation",
                    timeout,
                    aggregate_level(provider, AggregationLevel::Department, &selected),
                )
                .await
            }
            _ => {
                with_timeout(
                    "region aggregation",
                    timeout,
                    aggregate_level(provider, AggregationLevel::Region, &selected),
                )
                .await
            }
        };
        let stats = stats.map_err(|e| {
            warn!(level = %request.level, error = %e, "Re-aggregation failed");
            e
        })?;

        let mut ctx = self.context.lock().await;
        Ok(match ctx.commit_refresh(&request, &stats) {
            Ok(effects) => {
                debug!(level = %request.level, areas = stats.len(), "Layer re-aggregated");
                Outcome::Committed(Commit {
                    level: request.level,
                    features: ctx.displayed().to_vec(),
                    effects,
                })
            }
            Err(Stale) => Outcome::Stale,
        })
    }

    /// Modifie le filtre puis réagrège le niveau courant
    pub async fn update_filter<F>(&self, update: F) -> Vec<RenderEffect>
    where
        F: FnOnce(&mut FilterState),
    {
        let summary = {
            let mut filter = self.filter.write().await;
            update(&mut filter);
            filter.summary()
        };
        info!(filter = %summary, "Filter changed");

        let mut effects = vec![RenderEffect::FilterSummary(summary)];
        match self.refresh().await {
            Ok(outcome) => effects.extend(outcome.into_effects()),
            Err(e) => warn!(error = %e, "Re-aggregation after filter change failed"),
        }
        effects
    }

    /// Remplace la sélection de types d'occupation
    pub async fn set_filter<I, S>(&self, labels: I) -> Vec<RenderEffect>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_filter(|f| f.set_selected(labels)).await
    }

    pub async fn toggle_category(&self, label: &str) -> Vec<RenderEffect> {
        self.update_filter(|f| {
            f.toggle(label);
        })
        .await
    }

    /// Change l'indicateur (altitude ou pente) sans nouvelle lecture
    pub async fn set_indicator(&self, indicator: Indicator) -> Vec<RenderEffect> {
        self.context.lock().await.set_indicator(indicator)
    }

    pub async fn snapshot(&self) -> NavigationSnapshot {
        let ctx = self.context.lock().await;
        NavigationSnapshot {
            level: ctx.level(),
            active_region: ctx.active_region().map(|r| r.code.clone()),
            active_department: ctx.active_department().map(|d| d.code.clone()),
            selected_commune: ctx.selected_commune().map(str::to_string),
            indicator: ctx.indicator(),
            features: ctx.displayed().to_vec(),
        }
    }
}
