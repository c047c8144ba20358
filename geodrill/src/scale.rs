//! Échelle de couleur et légende
//!
//! Le domaine est recalculé à chaque commit à partir des seules valeurs non
//! nulles de la couche affichée (jamais global).

use serde::{Deserialize, Serialize};

use crate::types::Area;

/// Couleur des zones sans données pour le filtre courant
pub const NO_DATA_COLOR: &str = "#000000";

/// Nombre de graduations de la légende
pub const LEGEND_TICKS: usize = 5;

/// Borne basse de la rampe (les valeurs minimales restent visibles)
const RAMP_FLOOR: f64 = 0.2;

/// Indicateur représenté sur la carte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    #[default]
    Altitude,
    Slope,
}

impl Indicator {
    pub fn unit(self) -> &'static str {
        match self {
            Indicator::Altitude => "m",
            Indicator::Slope => "%",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Indicator::Altitude => "Mean altitude",
            Indicator::Slope => "Mean slope",
        }
    }

    /// Rampe associée (violets pour l'altitude, bleus pour la pente)
    pub fn ramp(self) -> ColorRamp {
        match self {
            Indicator::Altitude => ColorRamp::new([252, 251, 253], [63, 0, 125]),
            Indicator::Slope => ColorRamp::new([247, 251, 255], [8, 48, 107]),
        }
    }
}

impl std::str::FromStr for Indicator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "altitude" | "alt" => Ok(Indicator::Altitude),
            "slope" | "pente" => Ok(Indicator::Slope),
            _ => Err(format!("Invalid indicator: {}. Use: altitude, slope", s)),
        }
    }
}

/// Domaine [min, max] de l'échelle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleDomain {
    pub min: f64,
    pub max: f64,
}

impl ScaleDomain {
    /// Domaine des valeurs fournies, `None` si aucune valeur
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<ScaleDomain>, v| match acc {
                None => Some(ScaleDomain { min: v, max: v }),
                Some(d) => Some(ScaleDomain {
                    min: d.min.min(v),
                    max: d.max.max(v),
                }),
            })
    }

    /// Domaine des zones ayant des statistiques
    pub fn of_areas(areas: &[Area], indicator: Indicator) -> Option<Self> {
        Self::from_values(areas.iter().filter_map(|a| a.value(indicator)))
    }

    /// Position relative de `value` dans le domaine, bornée à [0, 1]
    pub fn position(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 1.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    /// Graduations régulièrement espacées, bornes incluses
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        match count {
            0 => Vec::new(),
            1 => vec![self.min],
            _ => {
                let step = (self.max - self.min) / (count - 1) as f64;
                (0..count).map(|i| self.min + step * i as f64).collect()
            }
        }
    }
}

/// Rampe de couleur linéaire entre deux teintes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRamp {
    from: [u8; 3],
    to: [u8; 3],
}

impl ColorRamp {
    pub const fn new(from: [u8; 3], to: [u8; 3]) -> Self {
        Self { from, to }
    }

    /// Couleur hexadécimale pour une position dans [0, 1]
    ///
    /// La position est ramenée dans [0.2, 1] de la rampe.
    pub fn color(&self, t: f64) -> String {
        let t = RAMP_FLOOR + (1.0 - RAMP_FLOOR) * t.clamp(0.0, 1.0);
        let channel = |i: usize| {
            let a = self.from[i] as f64;
            let b = self.to[i] as f64;
            (a + (b - a) * t).round() as u8
        };
        format!("#{:02x}{:02x}{:02x}", channel(0), channel(1), channel(2))
    }
}

/// Couleur de remplissage d'une zone
pub fn fill_color(area: &Area, indicator: Indicator, domain: Option<&ScaleDomain>) -> String {
    match (area.value(indicator), domain) {
        (Some(v), Some(d)) => indicator.ramp().color(d.position(v)),
        _ => NO_DATA_COLOR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AreaStats, LandCoverStats, Level};

    fn area_with_altitude(code: &str, altitude: Option<f64>) -> Area {
        let stats = altitude.and_then(|alt| {
            AreaStats::from_breakdown(vec![LandCoverStats {
                label: "Prairie".to_string(),
                parcel_count: 1,
                surface: 1.0,
                altitude: alt,
                slope: 0.0,
            }])
        });
        Area::new(Level::Department, code, code).with_stats(stats)
    }

    #[test]
    fn test_domain_ignores_missing_values() {
        let areas = vec![
            area_with_altitude("01", Some(300.0)),
            area_with_altitude("38", None),
            area_with_altitude("73", Some(1200.0)),
        ];
        let domain = ScaleDomain::of_areas(&areas, Indicator::Altitude).unwrap();
        assert_eq!(domain.min, 300.0);
        assert_eq!(domain.max, 1200.0);
    }

    #[test]
    fn test_empty_domain() {
        let areas = vec![area_with_altitude("38", None)];
        assert!(ScaleDomain::of_areas(&areas, Indicator::Altitude).is_none());
    }

    #[test]
    fn test_ticks_include_bounds() {
        let domain = ScaleDomain { min: 0.0, max: 100.0 };
        assert_eq!(domain.ticks(LEGEND_TICKS), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn test_degenerate_domain_position() {
        let domain = ScaleDomain { min: 5.0, max: 5.0 };
        assert_eq!(domain.position(5.0), 1.0);
    }

    #[test]
    fn test_fill_color_no_data() {
        let area = area_with_altitude("38", None);
        let domain = ScaleDomain { min: 0.0, max: 1.0 };
        assert_eq!(fill_color(&area, Indicator::Altitude, Some(&domain)), NO_DATA_COLOR);
    }

    #[test]
    fn test_ramp_endpoints() {
        let ramp = ColorRamp::new([0, 0, 0], [100, 200, 250]);
        assert_eq!(ramp.color(1.0), "#64c8fa");
        assert_eq!(ramp.color(0.0), "#142832");
    }
}
