//! Moteur d'agrégation en mémoire
//!
//! Agrège un jeu de parcelles chargé en mémoire (fichier JSON, démonstration,
//! tests). Les regroupements sont calculés en parallèle avec rayon.

use std::collections::{BTreeSet, HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codes;
use crate::error::DrillError;
use crate::provider::{build_stats, AggregationLevel, AggregationProvider, BoxFuture, StatsRow};
use crate::types::{ParcelStats, StatsByCode};

/// Parcelle avec ses rattachements administratifs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub id: String,
    pub region: String,
    pub department: String,
    pub commune: String,
    pub land_cover: String,
    /// Surface (hectares)
    pub surface: f64,
    pub altitude: f64,
    pub slope: f64,
}

/// Sommes d'un groupe (zone, type)
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: u64,
    surface: f64,
    weighted_altitude: f64,
    weighted_slope: f64,
    altitude: f64,
    slope: f64,
}

impl Accumulator {
    fn add(&mut self, parcel: &ParcelRecord) {
        self.count += 1;
        self.surface += parcel.surface;
        self.weighted_altitude += parcel.altitude * parcel.surface;
        self.weighted_slope += parcel.slope * parcel.surface;
        self.altitude += parcel.altitude;
        self.slope += parcel.slope;
    }

    fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.surface += other.surface;
        self.weighted_altitude += other.weighted_altitude;
        self.weighted_slope += other.weighted_slope;
        self.altitude += other.altitude;
        self.slope += other.slope;
    }

    /// Moyennes pondérées par la surface, simples si la surface est nulle
    fn into_row(self, code: String, land_cover: String) -> StatsRow {
        let (altitude, slope) = if self.surface > 0.0 {
            (
                self.weighted_altitude / self.surface,
                self.weighted_slope / self.surface,
            )
        } else {
            let n = self.count.max(1) as f64;
            (self.altitude / n, self.slope / n)
        };
        StatsRow {
            code,
            land_cover,
            parcel_count: self.count,
            surface: self.surface,
            altitude,
            slope,
        }
    }
}

type Groups = HashMap<(String, String), Accumulator>;

pub struct InMemoryProvider {
    parcels: Vec<ParcelRecord>,
}

impl InMemoryProvider {
    pub fn new(parcels: Vec<ParcelRecord>) -> Self {
        Self { parcels }
    }

    /// Charge un tableau JSON de `ParcelRecord`
    pub fn from_json(text: &str) -> Result<Self, DrillError> {
        let parcels: Vec<ParcelRecord> =
            serde_json::from_str(text).map_err(|e| DrillError::decode("parcel records", e))?;
        debug!(parcels = parcels.len(), "In-memory parcels loaded");
        Ok(Self::new(parcels))
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    fn aggregate<K, S>(&self, selected: &[String], key: K, scope: S) -> StatsByCode
    where
        K: Fn(&ParcelRecord) -> &str + Sync,
        S: Fn(&ParcelRecord) -> bool + Sync,
    {
        let selected: HashSet<&str> = selected.iter().map(String::as_str).collect();
        let groups = self
            .parcels
            .par_iter()
            .filter(|p| selected.contains(p.land_cover.as_str()) && scope(p))
            .fold(Groups::new, |mut groups, p| {
                groups
                    .entry((key(p).to_string(), p.land_cover.clone()))
                    .or_default()
                    .add(p);
                groups
            })
            .reduce(Groups::new, |mut left, right| {
                for (group, acc) in right {
                    left.entry(group).or_default().merge(&acc);
                }
                left
            });

        build_stats(
            groups
                .into_iter()
                .map(|((code, land_cover), acc)| acc.into_row(code, land_cover)),
        )
    }
}

impl AggregationProvider for InMemoryProvider {
    fn land_cover_categories(&self) -> BoxFuture<'_, Result<Vec<String>, DrillError>> {
        Box::pin(async move {
            let labels: BTreeSet<&str> = self.parcels.iter().map(|p| p.land_cover.as_str()).collect();
            Ok(labels.into_iter().map(str::to_string).collect())
        })
    }

    fn aggregate_by_level<'a>(
        &'a self,
        level: AggregationLevel,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<StatsByCode, DrillError>> {
        Box::pin(async move {
            let stats = match level {
                AggregationLevel::Region => self.aggregate(selected, |p| p.region.as_str(), |_| true),
                AggregationLevel::Department => {
                    self.aggregate(selected, |p| p.department.as_str(), |_| true)
                }
                AggregationLevel::Commune => self.aggregate(selected, |p| p.commune.as_str(), |_| true),
            };
            Ok(stats)
        })
    }

    fn aggregate_communes_in_department<'a>(
        &'a self,
        department: &'a str,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<StatsByCode, DrillError>> {
        Box::pin(async move {
            Ok(self.aggregate(selected, |p| p.commune.as_str(), |p| p.department == department))
        })
    }

    fn parcels_in_commune<'a>(
        &'a self,
        commune: &'a str,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ParcelStats>, DrillError>> {
        Box::pin(async move {
            Ok(self
                .parcels
                .iter()
                .filter(|p| {
                    selected.contains(&p.land_cover) && codes::pad_commune(&p.commune) == commune
                })
                .map(|p| ParcelStats {
                    id: p.id.clone(),
                    commune: codes::pad_commune(&p.commune),
                    land_cover: p.land_cover.clone(),
                    surface: p.surface,
                    altitude: p.altitude,
                    slope: p.slope,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{aggregate_communes, aggregate_level};

    fn parcel(id: &str, commune: &str, land_cover: &str, surface: f64, altitude: f64) -> ParcelRecord {
        ParcelRecord {
            id: id.to_string(),
            region: "84".to_string(),
            department: "01".to_string(),
            commune: commune.to_string(),
            land_cover: land_cover.to_string(),
            surface,
            altitude,
            slope: altitude / 100.0,
        }
    }

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new(vec![
            parcel("a", "1001", "Prairie permanente", 10.0, 200.0),
            parcel("b", "1001", "Prairie permanente", 30.0, 400.0),
            parcel("c", "1001", "Estives landes", 20.0, 1200.0),
            parcel("d", "1004", "Prairie permanente", 5.0, 300.0),
        ])
    }

    fn prairie() -> Vec<String> {
        vec!["Prairie permanente".to_string()]
    }

    #[tokio::test]
    async fn test_categories_are_sorted_and_distinct() {
        let categories = provider().land_cover_categories().await.unwrap();
        assert_eq!(categories, vec!["Estives landes", "Prairie permanente"]);
    }

    #[tokio::test]
    async fn test_region_aggregation_is_surface_weighted() {
        let stats = aggregate_level(&provider(), AggregationLevel::Region, &prairie())
            .await
            .unwrap();
        let aura = &stats["84"];
        assert_eq!(aura.parcel_count(), 3);
        assert!((aura.total_surface() - 45.0).abs() < 1e-9);
        // (10*200 + 30*400 + 5*300) / 45
        assert!((aura.altitude() - 15_500.0 / 45.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_commune_aggregation_pads_codes() {
        let stats = aggregate_communes(&provider(), "01", &prairie()).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.contains_key("01001"));
        assert!(stats.contains_key("01004"));
    }

    #[tokio::test]
    async fn test_zero_surface_falls_back_to_plain_mean() {
        let provider = InMemoryProvider::new(vec![
            parcel("a", "1001", "Prairie permanente", 0.0, 100.0),
            parcel("b", "1001", "Prairie permanente", 0.0, 300.0),
        ]);
        let stats = aggregate_level(&provider, AggregationLevel::Region, &prairie())
            .await
            .unwrap();
        assert!((stats["84"].altitude() - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_parcels_in_commune() {
        let provider = provider();
        let list = provider.parcels_in_commune("01001", &prairie()).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|p| p.commune == "01001"));
    }

    #[test]
    fn test_from_json() {
        let provider = InMemoryProvider::from_json(
            r#"[{"id": "x", "region": "84", "department": "38", "commune": "38185",
                 "land_cover": "Prairie permanente", "surface": 1.5, "altitude": 210.0, "slope": 1.0}]"#,
        )
        .unwrap();
        assert_eq!(provider.len(), 1);
        assert!(InMemoryProvider::from_json("{").is_err());
    }
}
