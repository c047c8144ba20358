//! Types de données pour le crate geodrill

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use geo::Geometry;
use serde::{Deserialize, Serialize};

use crate::codes;
use crate::scale::Indicator;

/// Niveau géographique d'une zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Region,
    Department,
    Commune,
    Parcel,
}

impl Level {
    /// Libellé affiché dans le panneau latéral
    pub fn label(self) -> &'static str {
        match self {
            Level::Region => "Region",
            Level::Department => "Department",
            Level::Commune => "Commune",
            Level::Parcel => "Parcel",
        }
    }

    /// Niveau enfant (None pour la parcelle)
    pub fn child(self) -> Option<Level> {
        match self {
            Level::Region => Some(Level::Department),
            Level::Department => Some(Level::Commune),
            Level::Commune => Some(Level::Parcel),
            Level::Parcel => None,
        }
    }

    /// Niveau parent (None pour la région)
    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Region => None,
            Level::Department => Some(Level::Region),
            Level::Commune => Some(Level::Department),
            Level::Parcel => Some(Level::Commune),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            Level::Region => "region",
            Level::Department => "department",
            Level::Commune => "commune",
            Level::Parcel => "parcel",
        };
        f.write_str(key)
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "region" | "reg" => Ok(Level::Region),
            "department" | "dept" | "dep" => Ok(Level::Department),
            "commune" | "com" => Ok(Level::Commune),
            "parcel" => Ok(Level::Parcel),
            _ => Err(format!(
                "Invalid level: {}. Use: region, department, commune, parcel",
                s
            )),
        }
    }
}

/// Statistiques d'un type d'occupation du sol dans une zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandCoverStats {
    /// Libellé du groupe de culture
    pub label: String,
    /// Nombre de parcelles
    pub parcel_count: u64,
    /// Surface totale (hectares)
    pub surface: f64,
    /// Altitude moyenne pondérée par la surface (mètres)
    pub altitude: f64,
    /// Pente moyenne pondérée par la surface
    pub slope: f64,
}

/// Indicateurs agrégés d'une zone pour un état de filtre donné
///
/// `altitude` et `slope` sont toujours les moyennes pondérées par la surface
/// des valeurs de `breakdown`: la seule façon de construire une valeur est
/// `AreaStats::from_breakdown`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaStats {
    parcel_count: u64,
    total_surface: f64,
    altitude: f64,
    slope: f64,
    breakdown: Vec<LandCoverStats>,
}

impl AreaStats {
    /// Construit les statistiques d'une zone depuis sa ventilation par type
    ///
    /// La ventilation est triée par surface décroissante. Si la surface totale
    /// est nulle, les moyennes retombent sur la moyenne simple des types.
    /// Retourne `None` pour une ventilation vide.
    pub fn from_breakdown(mut breakdown: Vec<LandCoverStats>) -> Option<Self> {
        if breakdown.is_empty() {
            return None;
        }

        breakdown.sort_by(|a, b| {
            b.surface
                .partial_cmp(&a.surface)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.label.cmp(&b.label))
        });

        let parcel_count = breakdown.iter().map(|c| c.parcel_count).sum();
        let total_surface: f64 = breakdown.iter().map(|c| c.surface).sum();

        let (altitude, slope) = if total_surface > 0.0 {
            (
                breakdown.iter().map(|c| c.altitude * c.surface).sum::<f64>() / total_surface,
                breakdown.iter().map(|c| c.slope * c.surface).sum::<f64>() / total_surface,
            )
        } else {
            let n = breakdown.len() as f64;
            (
                breakdown.iter().map(|c| c.altitude).sum::<f64>() / n,
                breakdown.iter().map(|c| c.slope).sum::<f64>() / n,
            )
        };

        Some(Self {
            parcel_count,
            total_surface,
            altitude,
            slope,
            breakdown,
        })
    }

    pub fn parcel_count(&self) -> u64 {
        self.parcel_count
    }

    /// Surface totale (hectares)
    pub fn total_surface(&self) -> f64 {
        self.total_surface
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Ventilation par type, triée par surface décroissante
    pub fn breakdown(&self) -> &[LandCoverStats] {
        &self.breakdown
    }

    /// Les `n` types les plus étendus (graphique en barres du panneau)
    pub fn top_types(&self, n: usize) -> &[LandCoverStats] {
        &self.breakdown[..n.min(self.breakdown.len())]
    }

    /// Valeur de l'indicateur courant
    pub fn value(&self, indicator: Indicator) -> f64 {
        match indicator {
            Indicator::Altitude => self.altitude,
            Indicator::Slope => self.slope,
        }
    }
}

/// Statistiques agrégées indexées par code de zone
pub type StatsByCode = HashMap<String, AreaStats>;

/// Statistiques d'une parcelle individuelle (vue nuage de points)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelStats {
    /// Identifiant de la parcelle
    pub id: String,
    /// Code INSEE de la commune
    pub commune: String,
    /// Type d'occupation du sol
    pub land_cover: String,
    /// Surface (hectares)
    pub surface: f64,
    pub altitude: f64,
    pub slope: f64,
}

impl ParcelStats {
    /// Convertit la parcelle en zone de niveau `Parcel`
    pub fn into_area(self) -> Area {
        let stats = AreaStats::from_breakdown(vec![LandCoverStats {
            label: self.land_cover.clone(),
            parcel_count: 1,
            surface: self.surface,
            altitude: self.altitude,
            slope: self.slope,
        }]);

        Area::new(Level::Parcel, self.id, self.land_cover)
            .with_parent(self.commune)
            .with_stats(stats)
    }
}

/// Une zone géographique (région, département, commune ou parcelle)
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub level: Level,

    /// Code stable (INSEE sur 5 caractères pour les communes)
    pub code: String,

    /// Nom affiché
    pub name: String,

    /// Code du parent (département -> région, commune -> département)
    pub parent_code: Option<String>,

    /// Contour, partagé entre les copies successives de la zone
    pub geometry: Option<Arc<Geometry>>,

    /// `None` quand aucune parcelle ne correspond au filtre courant
    pub stats: Option<AreaStats>,
}

impl Area {
    pub fn new(level: Level, code: impl Into<String>, name: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            level,
            code: codes::normalize(level, &code),
            name: name.into(),
            parent_code: None,
            geometry: None,
            stats: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        self.parent_code = match self.level.parent() {
            Some(level) => Some(codes::normalize(level, &parent)),
            None => Some(parent),
        };
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(Arc::new(geometry));
        self
    }

    pub fn with_stats(mut self, stats: Option<AreaStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Valeur de l'indicateur, `None` si pas de données
    pub fn value(&self, indicator: Indicator) -> Option<f64> {
        self.stats.as_ref().map(|s| s.value(indicator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(label: &str, surface: f64, altitude: f64, slope: f64) -> LandCoverStats {
        LandCoverStats {
            label: label.to_string(),
            parcel_count: 2,
            surface,
            altitude,
            slope,
        }
    }

    #[test]
    fn test_weighted_means_follow_breakdown() {
        let stats = AreaStats::from_breakdown(vec![
            category("Prairie permanente", 30.0, 400.0, 5.0),
            category("Prairie temporaire", 10.0, 200.0, 1.0),
        ])
        .unwrap();

        let weighted_alt: f64 = stats
            .breakdown()
            .iter()
            .map(|c| c.altitude * c.surface)
            .sum::<f64>()
            / stats.breakdown().iter().map(|c| c.surface).sum::<f64>();

        assert!((stats.altitude() - weighted_alt).abs() < 1e-9);
        assert!((stats.altitude() - 350.0).abs() < 1e-9);
        assert!((stats.slope() - 4.0).abs() < 1e-9);
        assert_eq!(stats.parcel_count(), 4);
        assert!((stats.total_surface() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_sorted_by_surface() {
        let stats = AreaStats::from_breakdown(vec![
            category("A", 1.0, 0.0, 0.0),
            category("B", 5.0, 0.0, 0.0),
            category("C", 3.0, 0.0, 0.0),
        ])
        .unwrap();

        let labels: Vec<_> = stats.top_types(2).iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["B", "C"]);
        assert_eq!(stats.top_types(10).len(), 3);
    }

    #[test]
    fn test_zero_surface_falls_back_to_plain_mean() {
        let stats = AreaStats::from_breakdown(vec![
            category("A", 0.0, 100.0, 2.0),
            category("B", 0.0, 300.0, 4.0),
        ])
        .unwrap();

        assert!((stats.altitude() - 200.0).abs() < 1e-9);
        assert!((stats.slope() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_breakdown_has_no_stats() {
        assert!(AreaStats::from_breakdown(Vec::new()).is_none());
    }

    #[test]
    fn test_commune_area_code_is_padded() {
        let area = Area::new(Level::Commune, "1001", "L'Abergement-Clémenciat").with_parent("1");
        assert_eq!(area.code, "01001");
        assert_eq!(area.parent_code.as_deref(), Some("1"));
    }

    #[test]
    fn test_parcel_into_area() {
        let area = ParcelStats {
            id: "010010000A0001".to_string(),
            commune: "1001".to_string(),
            land_cover: "Prairie permanente".to_string(),
            surface: 2.5,
            altitude: 250.0,
            slope: 3.0,
        }
        .into_area();

        assert_eq!(area.level, Level::Parcel);
        assert_eq!(area.parent_code.as_deref(), Some("01001"));
        assert_eq!(area.value(Indicator::Altitude), Some(250.0));
    }

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("dept".parse::<Level>().unwrap(), Level::Department);
        assert_eq!(Level::Commune.to_string(), "commune");
        assert!("canton".parse::<Level>().is_err());
        assert_eq!(Level::Region.child(), Some(Level::Department));
        assert_eq!(Level::Parcel.child(), None);
    }
}
