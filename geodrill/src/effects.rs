//! Effets de rendu produits par les transitions
//!
//! Le cœur ne peint jamais lui-même: il décrit ce qu'il faut afficher
//! (couches avec statistiques jointes, légende, panneau, zoom) et un
//! `Renderer` applique ces effets.

use serde::Serialize;

use crate::scale::{Indicator, ScaleDomain};
use crate::types::{Area, LandCoverStats, Level};

/// Opacité de la couche interactive
pub const ACTIVE_OPACITY: f32 = 1.0;

/// Opacité d'une couche parente pendant l'exploration d'un enfant
pub const DIMMED_OPACITY: f32 = 0.2;

/// Zoom maximal sur une région ou un département
pub const AREA_MAX_ZOOM: f64 = 20.0;

/// Zoom maximal sur une commune
pub const COMMUNE_MAX_ZOOM: f64 = 25.0;

/// Zoom maximal au retour vers les départements
pub const BACK_MAX_ZOOM: f64 = 10.0;

/// Nombre de types affichés dans le graphique du panneau
pub const PANEL_TOP_TYPES: usize = 5;

/// Contenu du panneau latéral
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSummary {
    pub code: String,
    pub name: String,
    pub level_label: &'static str,
    pub indicator: Indicator,
    /// `None` = "pas de données" pour le filtre courant
    pub value: Option<f64>,
    pub unit: &'static str,
    pub parcel_count: u64,
    pub total_surface: f64,
    pub top_types: Vec<LandCoverStats>,
}

impl PanelSummary {
    pub fn new(area: &Area, indicator: Indicator) -> Self {
        let stats = area.stats.as_ref();
        Self {
            code: area.code.clone(),
            name: area.name.clone(),
            level_label: area.level.label(),
            indicator,
            value: area.value(indicator),
            unit: indicator.unit(),
            parcel_count: stats.map(|s| s.parcel_count()).unwrap_or(0),
            total_surface: stats.map(|s| s.total_surface()).unwrap_or(0.0),
            top_types: stats
                .map(|s| s.top_types(PANEL_TOP_TYPES).to_vec())
                .unwrap_or_default(),
        }
    }
}

/// Effet de rendu
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEffect {
    /// Dessine une couche avec ses statistiques jointes
    RenderLayer {
        level: Level,
        features: Vec<Area>,
        indicator: Indicator,
        domain: Option<ScaleDomain>,
    },

    /// Repeint une couche déjà dessinée (filtre, indicateur, retour)
    Recolor {
        level: Level,
        features: Vec<Area>,
        indicator: Indicator,
        domain: Option<ScaleDomain>,
    },

    /// Supprime les formes d'une couche
    ClearLayer(Level),

    SetOpacity { level: Level, opacity: f32 },

    /// Met à jour le dégradé et les graduations de la légende
    UpdateLegend {
        indicator: Indicator,
        domain: ScaleDomain,
        ticks: Vec<f64>,
    },

    UpdatePanel(PanelSummary),

    ZoomTo { feature: Area, max_zoom: f64 },

    ResetZoom,

    /// Met en évidence une zone de la couche
    Highlight { level: Level, code: String },

    /// Libellé du bouton retour, `None` pour le masquer
    BackButton(Option<&'static str>),

    /// Libellé du bouton de filtre ("All types", "None", "N types")
    FilterSummary(String),

    /// Nuage altitude / pente de la vue dispersion
    ScatterPlot { level: Level, points: Vec<Area> },

    ScatterHighlight { code: String },
}

impl RenderEffect {
    /// Nom court de l'effet (journalisation, rapports)
    pub fn kind(&self) -> &'static str {
        match self {
            RenderEffect::RenderLayer { .. } => "render_layer",
            RenderEffect::Recolor { .. } => "recolor",
            RenderEffect::ClearLayer(_) => "clear_layer",
            RenderEffect::SetOpacity { .. } => "set_opacity",
            RenderEffect::UpdateLegend { .. } => "update_legend",
            RenderEffect::UpdatePanel(_) => "update_panel",
            RenderEffect::ZoomTo { .. } => "zoom_to",
            RenderEffect::ResetZoom => "reset_zoom",
            RenderEffect::Highlight { .. } => "highlight",
            RenderEffect::BackButton(_) => "back_button",
            RenderEffect::FilterSummary(_) => "filter_summary",
            RenderEffect::ScatterPlot { .. } => "scatter_plot",
            RenderEffect::ScatterHighlight { .. } => "scatter_highlight",
        }
    }
}

/// Surface de rendu (carte, légende, panneau, nuage de points)
pub trait Renderer {
    fn apply(&mut self, effect: &RenderEffect);

    fn apply_all(&mut self, effects: &[RenderEffect]) {
        for effect in effects {
            self.apply(effect);
        }
    }
}

/// Couche repeinte + légende (sautée si aucune valeur)
pub(crate) fn paint(
    level: Level,
    features: Vec<Area>,
    indicator: Indicator,
    first_draw: bool,
) -> Vec<RenderEffect> {
    let domain = ScaleDomain::of_areas(&features, indicator);
    let mut effects = Vec::with_capacity(2);

    effects.push(if first_draw {
        RenderEffect::RenderLayer {
            level,
            features,
            indicator,
            domain,
        }
    } else {
        RenderEffect::Recolor {
            level,
            features,
            indicator,
            domain,
        }
    });

    if let Some(domain) = domain {
        effects.push(RenderEffect::UpdateLegend {
            indicator,
            domain,
            ticks: domain.ticks(crate::scale::LEGEND_TICKS),
        });
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AreaStats;

    #[test]
    fn test_paint_without_values_skips_legend() {
        let features = vec![Area::new(Level::Region, "84", "Auvergne-Rhône-Alpes")];
        let effects = paint(Level::Region, features, Indicator::Altitude, false);
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            RenderEffect::Recolor { domain: None, .. }
        ));
    }

    #[test]
    fn test_panel_summary() {
        let stats = AreaStats::from_breakdown(vec![LandCoverStats {
            label: "Prairie permanente".to_string(),
            parcel_count: 12,
            surface: 40.0,
            altitude: 820.0,
            slope: 7.5,
        }]);
        let area = Area::new(Level::Department, "73", "Savoie").with_stats(stats);
        let panel = PanelSummary::new(&area, Indicator::Slope);

        assert_eq!(panel.level_label, "Department");
        assert_eq!(panel.value, Some(7.5));
        assert_eq!(panel.unit, "%");
        assert_eq!(panel.parcel_count, 12);
        assert_eq!(panel.top_types.len(), 1);
    }
}
