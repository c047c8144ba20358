//! Assemblage d'une session de visualisation

use std::sync::Arc;

use tracing::{info, warn};

use crate::effects::RenderEffect;
use crate::error::DrillError;
use crate::filter::FilterState;
use crate::geography::GeographyRegistry;
use crate::jump::{jump, JumpReport, JumpTarget};
use crate::navigation::Navigator;
use crate::provider::{with_timeout, AggregationProvider};
use crate::scatter::ScatterNavigator;
use crate::search::{SearchOptions, SearchResolver};

/// Carte, vue dispersion et recherche partageant le même filtre
pub struct Viewer {
    pub navigator: Navigator,
    pub scatter: ScatterNavigator,
    pub search: SearchResolver,
}

impl Viewer {
    /// Découvre les types d'occupation, tous sélectionnés, puis dessine les régions
    ///
    /// Retourne les effets du premier affichage de la carte.
    pub async fn open(
        registry: Arc<GeographyRegistry>,
        provider: Arc<dyn AggregationProvider>,
        search: SearchOptions,
    ) -> Result<(Self, Vec<RenderEffect>), DrillError> {
        let categories = with_timeout(
            "land-cover categories",
            registry.fetch_timeout(),
            provider.land_cover_categories(),
        )
        .await?;
        if categories.is_empty() {
            warn!("No land-cover type found, every area will show no data");
        }
        info!(categories = categories.len(), "Land-cover types discovered");

        let filter = FilterState::new(categories);
        let summary = filter.summary();
        let navigator = Navigator::new(Arc::clone(&registry), Arc::clone(&provider), filter);
        let scatter = ScatterNavigator::new(
            Arc::clone(&registry),
            provider,
            navigator.filter_handle(),
        );
        let search = SearchResolver::new(registry, search);

        let mut effects = vec![RenderEffect::FilterSummary(summary)];
        effects.extend(navigator.start().await?.into_effects());

        Ok((
            Self {
                navigator,
                scatter,
                search,
            },
            effects,
        ))
    }

    pub async fn jump(&self, target: &JumpTarget) -> JumpReport {
        jump(&self.navigator, target).await
    }
}
