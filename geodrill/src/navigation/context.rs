//! État de navigation de la carte
//!
//! Machine à états pure (sans I/O): chaque transition asynchrone est découpée
//! en `begin_*`, qui émet un ticket, et `commit_*`, qui n'applique le résultat
//! que si le ticket est toujours celui de la dernière intention utilisateur.
//! Un résultat périmé est rejeté sans aucun effet.

use tracing::debug;

use crate::effects::{
    paint, PanelSummary, RenderEffect, ACTIVE_OPACITY, AREA_MAX_ZOOM, BACK_MAX_ZOOM,
    COMMUNE_MAX_ZOOM, DIMMED_OPACITY,
};
use crate::error::DrillError;
use crate::join::join_stats;
use crate::scale::Indicator;
use crate::types::{Area, Level, StatsByCode};

const BACK_TO_REGIONS: &str = "Back to regions";
const BACK_TO_DEPARTMENTS: &str = "Back to departments";

/// Jeton d'une requête en cours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Résultat arrivé après une intention plus récente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stale;

/// Sélection d'une région en attente de ses départements
#[derive(Debug, Clone)]
pub struct RegionRequest {
    pub ticket: Ticket,
    pub region: Area,
}

/// Sélection d'un département en attente de ses communes
#[derive(Debug, Clone)]
pub struct DepartmentRequest {
    pub ticket: Ticket,
    pub department: Area,
}

/// Réagrégation de la couche courante
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub ticket: Ticket,
    pub level: Level,
    /// Département actif quand la couche courante est celle des communes
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Layers {
    regions: Vec<Area>,
    departments: Vec<Area>,
    communes: Vec<Area>,
}

impl Layers {
    fn get(&self, level: Level) -> &[Area] {
        match level {
            Level::Region => &self.regions,
            Level::Department => &self.departments,
            Level::Commune => &self.communes,
            Level::Parcel => &[],
        }
    }

    fn set(&mut self, level: Level, features: Vec<Area>) {
        match level {
            Level::Region => self.regions = features,
            Level::Department => self.departments = features,
            Level::Commune => self.communes = features,
            Level::Parcel => {}
        }
    }
}

/// Contexte de navigation de la carte (région -> département -> commune)
#[derive(Debug, Clone)]
pub struct NavigationContext {
    level: Level,
    active_region: Option<Area>,
    active_department: Option<Area>,
    selected_commune: Option<String>,
    indicator: Indicator,
    layers: Layers,
    pending_region: Option<Ticket>,
    pending_department: Option<Ticket>,
    pending_refresh: Option<Ticket>,
    next_ticket: u64,
}

impl Default for NavigationContext {
    fn default() -> Self {
        Self::new(Indicator::default())
    }
}

impl NavigationContext {
    pub fn new(indicator: Indicator) -> Self {
        Self {
            level: Level::Region,
            active_region: None,
            active_department: None,
            selected_commune: None,
            indicator,
            layers: Layers::default(),
            pending_region: None,
            pending_department: None,
            pending_refresh: None,
            next_ticket: 0,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn active_region(&self) -> Option<&Area> {
        self.active_region.as_ref()
    }

    pub fn active_department(&self) -> Option<&Area> {
        self.active_department.as_ref()
    }

    pub fn selected_commune(&self) -> Option<&str> {
        self.selected_commune.as_deref()
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    /// Zones de la couche d'un niveau
    pub fn layer(&self, level: Level) -> &[Area] {
        self.layers.get(level)
    }

    /// Zones de la couche interactive
    pub fn displayed(&self) -> &[Area] {
        self.layers.get(self.level)
    }

    fn issue(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    /// Installe la couche des régions et revient au niveau national
    pub fn install_regions(&mut self, regions: Vec<Area>) -> Vec<RenderEffect> {
        *self = Self {
            next_ticket: self.next_ticket,
            ..Self::new(self.indicator)
        };
        self.layers.regions = regions.clone();

        let mut effects = vec![
            RenderEffect::ClearLayer(Level::Commune),
            RenderEffect::ClearLayer(Level::Department),
            RenderEffect::SetOpacity {
                level: Level::Region,
                opacity: ACTIVE_OPACITY,
            },
            RenderEffect::BackButton(None),
        ];
        effects.extend(paint(Level::Region, regions, self.indicator, true));
        effects
    }

    /// Enregistre la région choisie comme dernière intention
    ///
    /// Une sélection de département encore en attente devient périmée.
    pub fn begin_region(&mut self, region: Area) -> RegionRequest {
        let ticket = self.issue();
        self.pending_region = Some(ticket);
        self.pending_department = None;
        debug!(region = %region.code, ticket = ticket.0, "Region selection started");
        RegionRequest { ticket, region }
    }

    /// Affiche les départements de la région si la requête est toujours actuelle
    ///
    /// `region_stats` a été agrégé avec le même filtre que `departments`: la
    /// couche des régions, assombrie, et le panneau de la région en reprennent
    /// les valeurs.
    pub fn commit_region(
        &mut self,
        request: &RegionRequest,
        region_stats: &StatsByCode,
        departments: Vec<Area>,
    ) -> Result<Vec<RenderEffect>, Stale> {
        if self.pending_region != Some(request.ticket) {
            return Err(Stale);
        }

        let region = request
            .region
            .clone()
            .with_stats(region_stats.get(&request.region.code).cloned());
        let regions = join_stats(&self.layers.regions, region_stats);

        self.pending_region = None;
        self.pending_refresh = None;
        self.level = Level::Department;
        self.active_region = Some(region.clone());
        self.active_department = None;
        self.selected_commune = None;
        self.layers.regions = regions.clone();
        self.layers.departments = departments.clone();
        self.layers.communes.clear();

        let mut effects: Vec<RenderEffect> = paint(Level::Region, regions, self.indicator, false)
            .into_iter()
            .take(1)
            .collect();
        effects.extend([
            RenderEffect::ClearLayer(Level::Commune),
            RenderEffect::SetOpacity {
                level: Level::Region,
                opacity: DIMMED_OPACITY,
            },
            RenderEffect::SetOpacity {
                level: Level::Department,
                opacity: ACTIVE_OPACITY,
            },
            RenderEffect::BackButton(Some(BACK_TO_REGIONS)),
        ]);
        effects.extend(paint(Level::Department, departments, self.indicator, true));
        effects.push(RenderEffect::UpdatePanel(PanelSummary::new(
            &region,
            self.indicator,
        )));
        effects.push(RenderEffect::ZoomTo {
            feature: region,
            max_zoom: AREA_MAX_ZOOM,
        });
        Ok(effects)
    }

    /// Enregistre le département choisi parmi ceux affichés
    pub fn begin_department(&mut self, code: &str) -> Result<DepartmentRequest, DrillError> {
        let department = match self.level {
            Level::Department | Level::Commune => self
                .layers
                .departments
                .iter()
                .find(|d| d.code == code.trim())
                .cloned(),
            _ => None,
        }
        .ok_or_else(|| DrillError::not_displayed(Level::Department, code.trim()))?;

        let ticket = self.issue();
        self.pending_department = Some(ticket);
        debug!(department = %department.code, ticket = ticket.0, "Department selection started");
        Ok(DepartmentRequest { ticket, department })
    }

    /// Affiche les communes du département si la requête est toujours actuelle
    pub fn commit_department(
        &mut self,
        request: &DepartmentRequest,
        communes: Vec<Area>,
    ) -> Result<Vec<RenderEffect>, Stale> {
        if self.pending_department != Some(request.ticket) {
            return Err(Stale);
        }

        self.pending_department = None;
        self.pending_refresh = None;
        self.level = Level::Commune;
        self.active_department = Some(request.department.clone());
        self.selected_commune = None;
        self.layers.communes = communes.clone();

        let mut effects = vec![
            RenderEffect::SetOpacity {
                level: Level::Department,
                opacity: DIMMED_OPACITY,
            },
            RenderEffect::SetOpacity {
                level: Level::Commune,
                opacity: ACTIVE_OPACITY,
            },
            RenderEffect::BackButton(Some(BACK_TO_DEPARTMENTS)),
        ];
        effects.extend(paint(Level::Commune, communes, self.indicator, true));
        effects.push(RenderEffect::UpdatePanel(PanelSummary::new(
            &request.department,
            self.indicator,
        )));
        effects.push(RenderEffect::ZoomTo {
            feature: request.department.clone(),
            max_zoom: AREA_MAX_ZOOM,
        });
        Ok(effects)
    }

    /// Sélectionne une commune affichée (panneau, zoom, mise en évidence)
    pub fn select_commune(&mut self, code: &str) -> Result<Vec<RenderEffect>, DrillError> {
        let code = crate::codes::pad_commune(code);
        let commune = match self.level {
            Level::Commune => self.layers.communes.iter().find(|c| c.code == code).cloned(),
            _ => None,
        }
        .ok_or_else(|| DrillError::not_displayed(Level::Commune, code.clone()))?;

        self.selected_commune = Some(code.clone());
        Ok(vec![
            RenderEffect::UpdatePanel(PanelSummary::new(&commune, self.indicator)),
            RenderEffect::ZoomTo {
                feature: commune,
                max_zoom: COMMUNE_MAX_ZOOM,
            },
            RenderEffect::Highlight {
                level: Level::Commune,
                code,
            },
        ])
    }

    /// Remonte d'un niveau
    ///
    /// Les requêtes en attente deviennent périmées. L'appelant doit ensuite
    /// réagréger la couche redevenue interactive (le filtre a pu changer) et
    /// n'afficher le panneau de la zone quittée qu'avec ces valeurs.
    pub fn back(&mut self) -> Vec<RenderEffect> {
        let mut effects = Vec::new();
        match self.level {
            Level::Commune => {
                self.level = Level::Department;
                self.selected_commune = None;
                self.layers.communes.clear();
                self.active_department = None;

                effects.push(RenderEffect::ClearLayer(Level::Commune));
                effects.push(RenderEffect::SetOpacity {
                    level: Level::Department,
                    opacity: ACTIVE_OPACITY,
                });
                effects.push(RenderEffect::BackButton(Some(BACK_TO_REGIONS)));
                if let Some(region) = &self.active_region {
                    effects.push(RenderEffect::ZoomTo {
                        feature: region.clone(),
                        max_zoom: BACK_MAX_ZOOM,
                    });
                }
            }
            Level::Department => {
                self.level = Level::Region;
                self.active_department = None;
                self.layers.departments.clear();
                self.active_region = None;

                effects.push(RenderEffect::ClearLayer(Level::Department));
                effects.push(RenderEffect::SetOpacity {
                    level: Level::Region,
                    opacity: ACTIVE_OPACITY,
                });
                effects.push(RenderEffect::BackButton(None));
                effects.push(RenderEffect::ResetZoom);
            }
            Level::Region | Level::Parcel => return effects,
        }

        self.pending_region = None;
        self.pending_department = None;
        self.pending_refresh = None;
        debug!(level = %self.level, "Navigated back");
        effects
    }

    /// Prépare la réagrégation de la couche interactive
    ///
    /// `None` si rien n'est affiché.
    pub fn begin_refresh(&mut self) -> Option<RefreshRequest> {
        if self.displayed().is_empty() {
            return None;
        }
        let department = match self.level {
            Level::Commune => Some(self.active_department.as_ref()?.code.clone()),
            _ => None,
        };

        let ticket = self.issue();
        self.pending_refresh = Some(ticket);
        Some(RefreshRequest {
            ticket,
            level: self.level,
            department,
        })
    }

    /// Rejoint les nouvelles statistiques sur la couche affichée
    pub fn commit_refresh(
        &mut self,
        request: &RefreshRequest,
        stats: &StatsByCode,
    ) -> Result<Vec<RenderEffect>, Stale> {
        let same_scope = request.department.as_deref()
            == self.active_department.as_ref().map(|d| d.code.as_str())
            || request.level != Level::Commune;
        if self.pending_refresh != Some(request.ticket) || self.level != request.level || !same_scope
        {
            return Err(Stale);
        }

        self.pending_refresh = None;
        let features = join_stats(self.layers.get(request.level), stats);
        self.layers.set(request.level, features.clone());
        Ok(paint(request.level, features, self.indicator, false))
    }

    /// Change d'indicateur et repeint la couche affichée sans réagréger
    pub fn set_indicator(&mut self, indicator: Indicator) -> Vec<RenderEffect> {
        self.indicator = indicator;
        paint(self.level, self.displayed().to_vec(), indicator, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{build_stats, StatsRow};

    fn row(code: &str, altitude: f64) -> StatsRow {
        StatsRow {
            code: code.to_string(),
            land_cover: "Prairie permanente".to_string(),
            parcel_count: 1,
            surface: 10.0,
            altitude,
            slope: 3.0,
        }
    }

    fn regions() -> Vec<Area> {
        vec![
            Area::new(Level::Region, "84", "Auvergne-Rhône-Alpes"),
            Area::new(Level::Region, "11", "Île-de-France"),
        ]
    }

    fn departments_of_84() -> Vec<Area> {
        vec![
            Area::new(Level::Department, "38", "Isère"),
            Area::new(Level::Department, "73", "Savoie"),
        ]
    }

    fn context_at_department() -> NavigationContext {
        let mut ctx = NavigationContext::default();
        ctx.install_regions(regions());
        let request = ctx.begin_region(regions()[0].clone());
        ctx.commit_region(&request, &StatsByCode::new(), departments_of_84()).unwrap();
        ctx
    }

    #[test]
    fn test_region_commit_moves_to_department_level() {
        let ctx = context_at_department();
        assert_eq!(ctx.level(), Level::Department);
        assert_eq!(ctx.active_region().unwrap().code, "84");
        assert!(ctx.active_department().is_none());
        assert_eq!(ctx.displayed().len(), 2);
    }

    #[test]
    fn test_region_commit_rejoins_region_stats() {
        let mut ctx = NavigationContext::default();
        ctx.install_regions(regions());
        let request = ctx.begin_region(regions()[0].clone());
        let region_stats = build_stats(vec![row("84", 700.0)]);

        let effects = ctx
            .commit_region(&request, &region_stats, departments_of_84())
            .unwrap();

        assert!(matches!(
            effects[0],
            RenderEffect::Recolor {
                level: Level::Region,
                ..
            }
        ));
        let panel = effects
            .iter()
            .find_map(|e| match e {
                RenderEffect::UpdatePanel(panel) => Some(panel),
                _ => None,
            })
            .unwrap();
        assert_eq!(panel.value, Some(700.0));
        assert!(ctx.active_region().unwrap().stats.is_some());
        assert!(ctx.layer(Level::Region)[0].stats.is_some());
        assert!(ctx.layer(Level::Region)[1].stats.is_none());
    }

    #[test]
    fn test_older_region_result_is_stale() {
        let mut ctx = NavigationContext::default();
        ctx.install_regions(regions());
        let first = ctx.begin_region(regions()[1].clone());
        let second = ctx.begin_region(regions()[0].clone());

        assert!(ctx.commit_region(&second, &StatsByCode::new(), departments_of_84()).is_ok());
        assert_eq!(ctx.commit_region(&first, &StatsByCode::new(), Vec::new()), Err(Stale));
        assert_eq!(ctx.active_region().unwrap().code, "84");
        assert_eq!(ctx.displayed().len(), 2);
    }

    #[test]
    fn test_region_selection_supersedes_pending_department() {
        let mut ctx = context_at_department();
        let department = ctx.begin_department("38").unwrap();
        let region = ctx.begin_region(regions()[1].clone());

        assert_eq!(ctx.commit_department(&department, Vec::new()), Err(Stale));
        assert_eq!(ctx.level(), Level::Department);
        assert!(ctx.commit_region(&region, &StatsByCode::new(), Vec::new()).is_ok());
    }

    #[test]
    fn test_department_must_be_displayed() {
        let mut ctx = context_at_department();
        let err = ctx.begin_department("75").unwrap_err();
        assert!(matches!(err, DrillError::NotDisplayed { .. }));

        let mut ctx = NavigationContext::default();
        ctx.install_regions(regions());
        assert!(ctx.begin_department("38").is_err());
    }

    #[test]
    fn test_back_invalidates_pending_requests() {
        let mut ctx = context_at_department();
        let department = ctx.begin_department("38").unwrap();
        let effects = ctx.back();

        assert_eq!(ctx.level(), Level::Region);
        assert!(ctx.active_region().is_none());
        assert!(effects.contains(&RenderEffect::ResetZoom));
        assert_eq!(ctx.commit_department(&department, Vec::new()), Err(Stale));
        assert!(ctx.back().is_empty());
    }

    #[test]
    fn test_back_from_commune() {
        let mut ctx = context_at_department();
        let request = ctx.begin_department("38").unwrap();
        ctx.commit_department(&request, vec![Area::new(Level::Commune, "38185", "Grenoble")])
            .unwrap();
        assert_eq!(ctx.level(), Level::Commune);

        let effects = ctx.back();
        assert_eq!(ctx.level(), Level::Department);
        assert!(ctx.active_department().is_none());
        assert!(ctx.layer(Level::Commune).is_empty());
        assert!(effects.contains(&RenderEffect::ClearLayer(Level::Commune)));
        assert!(effects.iter().any(|e| matches!(
            e,
            RenderEffect::ZoomTo { max_zoom, .. } if *max_zoom == BACK_MAX_ZOOM
        )));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, RenderEffect::UpdatePanel(_))));
    }

    #[test]
    fn test_refresh_rejoins_current_layer() {
        let mut ctx = context_at_department();
        let request = ctx.begin_refresh().unwrap();
        assert_eq!(request.level, Level::Department);
        assert!(request.department.is_none());

        let stats = build_stats(vec![row("38", 700.0)]);
        let effects = ctx.commit_refresh(&request, &stats).unwrap();

        assert!(matches!(effects[0], RenderEffect::Recolor { .. }));
        assert!(matches!(effects[1], RenderEffect::UpdateLegend { .. }));
        assert!(ctx.displayed()[0].stats.is_some());
        assert!(ctx.displayed()[1].stats.is_none());
    }

    #[test]
    fn test_refresh_is_stale_after_navigation() {
        let mut ctx = context_at_department();
        let request = ctx.begin_refresh().unwrap();
        ctx.back();
        let stats = build_stats(vec![row("38", 700.0)]);
        assert_eq!(ctx.commit_refresh(&request, &stats), Err(Stale));
    }

    #[test]
    fn test_newer_refresh_wins() {
        let mut ctx = context_at_department();
        let older = ctx.begin_refresh().unwrap();
        let newer = ctx.begin_refresh().unwrap();
        let stats = build_stats(vec![row("38", 700.0)]);
        assert!(ctx.commit_refresh(&newer, &stats).is_ok());
        assert_eq!(ctx.commit_refresh(&older, &StatsByCode::new()), Err(Stale));
        assert!(ctx.displayed()[0].stats.is_some());
    }

    #[test]
    fn test_nothing_to_refresh() {
        let mut ctx = NavigationContext::default();
        assert!(ctx.begin_refresh().is_none());
    }

    #[test]
    fn test_select_commune_requires_commune_level() {
        let mut ctx = context_at_department();
        assert!(ctx.select_commune("38185").is_err());

        let request = ctx.begin_department("38").unwrap();
        ctx.commit_department(&request, vec![Area::new(Level::Commune, "38185", "Grenoble")])
            .unwrap();
        let effects = ctx.select_commune("38185").unwrap();
        assert_eq!(ctx.selected_commune(), Some("38185"));
        assert!(effects.contains(&RenderEffect::Highlight {
            level: Level::Commune,
            code: "38185".to_string()
        }));
    }

    #[test]
    fn test_indicator_switch_recolors() {
        let mut ctx = context_at_department();
        let effects = ctx.set_indicator(Indicator::Slope);
        assert_eq!(ctx.indicator(), Indicator::Slope);
        assert!(matches!(
            effects[0],
            RenderEffect::Recolor {
                indicator: Indicator::Slope,
                level: Level::Department,
                ..
            }
        ));
    }
}
