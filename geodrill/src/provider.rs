//! Contrats des collaborateurs externes
//!
//! - `AggregationProvider`: moteur analytique (statistiques par zone)
//! - `GeographySource`: collections géographiques et recherche de communes
//!
//! Les méthodes retournent des futures boxées pour rester compatibles `dyn`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::codes;
use crate::error::DrillError;
use crate::types::{Area, AreaStats, LandCoverStats, ParcelStats, StatsByCode};

/// Future boxée envoyable entre threads
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Niveau de regroupement d'une agrégation nationale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationLevel {
    Region,
    Department,
    Commune,
}

impl AggregationLevel {
    pub fn key(self) -> &'static str {
        match self {
            AggregationLevel::Region => "region",
            AggregationLevel::Department => "department",
            AggregationLevel::Commune => "commune",
        }
    }
}

/// Ligne (zone, type d'occupation) renvoyée par un moteur d'agrégation
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub code: String,
    pub land_cover: String,
    pub parcel_count: u64,
    pub surface: f64,
    /// Altitude moyenne du type, pondérée par la surface
    pub altitude: f64,
    /// Pente moyenne du type, pondérée par la surface
    pub slope: f64,
}

/// Regroupe les lignes par zone et construit les `AreaStats`
///
/// Deux lignes de même zone et de même type sont fusionnées.
pub fn build_stats(rows: impl IntoIterator<Item = StatsRow>) -> StatsByCode {
    let mut grouped: HashMap<String, Vec<LandCoverStats>> = HashMap::new();
    for row in rows {
        let breakdown = grouped.entry(row.code).or_default();
        let incoming = LandCoverStats {
            label: row.land_cover,
            parcel_count: row.parcel_count,
            surface: row.surface,
            altitude: row.altitude,
            slope: row.slope,
        };
        match breakdown.iter_mut().find(|c| c.label == incoming.label) {
            Some(existing) => merge_land_cover(existing, &incoming),
            None => breakdown.push(incoming),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(code, breakdown)| AreaStats::from_breakdown(breakdown).map(|s| (code, s)))
        .collect()
}

/// Moyennes pondérées par la surface, ou par le nombre de parcelles si les
/// deux surfaces sont nulles
fn merge_land_cover(into: &mut LandCoverStats, other: &LandCoverStats) {
    let (w1, w2) = if into.surface + other.surface > 0.0 {
        (into.surface, other.surface)
    } else if into.parcel_count + other.parcel_count > 0 {
        (into.parcel_count as f64, other.parcel_count as f64)
    } else {
        (1.0, 1.0)
    };
    into.altitude = (into.altitude * w1 + other.altitude * w2) / (w1 + w2);
    into.slope = (into.slope * w1 + other.slope * w2) / (w1 + w2);
    into.parcel_count += other.parcel_count;
    into.surface += other.surface;
}

/// Moteur d'agrégation des parcelles
///
/// Les implémentations n'ont pas à gérer le filtre vide ni le formatage des
/// codes communaux: les fonctions `aggregate_*` de ce module s'en chargent.
pub trait AggregationProvider: Send + Sync {
    /// Types d'occupation du sol présents dans le jeu de données
    fn land_cover_categories(&self) -> BoxFuture<'_, Result<Vec<String>, DrillError>>;

    /// Statistiques nationales regroupées par région, département ou commune
    fn aggregate_by_level<'a>(
        &'a self,
        level: AggregationLevel,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<StatsByCode, DrillError>>;

    /// Statistiques des communes d'un département
    fn aggregate_communes_in_department<'a>(
        &'a self,
        department: &'a str,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<StatsByCode, DrillError>>;

    /// Parcelles individuelles d'une commune
    fn parcels_in_commune<'a>(
        &'a self,
        commune: &'a str,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ParcelStats>, DrillError>>;
}

/// Commune trouvée par la recherche distante
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommuneMatch {
    pub name: String,
    pub code: String,
    pub department: Option<String>,
    pub region: Option<String>,
}

/// Source des collections géographiques
pub trait GeographySource: Send + Sync {
    /// Toutes les régions (chargées une fois au démarrage)
    fn all_regions(&self) -> BoxFuture<'_, Result<Vec<Area>, DrillError>>;

    /// Tous les départements (chargés une fois au démarrage)
    fn all_departments(&self) -> BoxFuture<'_, Result<Vec<Area>, DrillError>>;

    /// Codes des départements d'une région
    fn departments_of_region<'a>(
        &'a self,
        region: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, DrillError>>;

    /// Contours des communes d'un département
    fn communes_of_department<'a>(
        &'a self,
        department: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Area>, DrillError>>;

    /// Recherche de communes par nom (au plus `limit` résultats)
    fn search_communes<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<CommuneMatch>, DrillError>>;
}

/// Agrégation nationale; filtre vide => map vide, sans requête
pub async fn aggregate_level(
    provider: &dyn AggregationProvider,
    level: AggregationLevel,
    selected: &[String],
) -> Result<StatsByCode, DrillError> {
    if selected.is_empty() {
        debug!(level = level.key(), "Empty filter, skipping aggregation");
        return Ok(StatsByCode::new());
    }
    let stats = provider.aggregate_by_level(level, selected).await?;
    Ok(match level {
        AggregationLevel::Commune => pad_keys(stats),
        _ => stats,
    })
}

/// Agrégation des communes d'un département, codes sur 5 caractères
pub async fn aggregate_communes(
    provider: &dyn AggregationProvider,
    department: &str,
    selected: &[String],
) -> Result<StatsByCode, DrillError> {
    if selected.is_empty() {
        debug!(department = department, "Empty filter, skipping aggregation");
        return Ok(StatsByCode::new());
    }
    let stats = provider
        .aggregate_communes_in_department(department, selected)
        .await?;
    Ok(pad_keys(stats))
}

/// Parcelles d'une commune; filtre vide => liste vide
pub async fn parcels(
    provider: &dyn AggregationProvider,
    commune: &str,
    selected: &[String],
) -> Result<Vec<ParcelStats>, DrillError> {
    if selected.is_empty() {
        return Ok(Vec::new());
    }
    let commune = codes::pad_commune(commune);
    provider.parcels_in_commune(&commune, selected).await
}

/// Replie les statistiques sous les codes communaux sur 5 caractères
///
/// "1001" et "01001" désignent la même commune: leurs répartitions sont
/// fusionnées avant le calcul des moyennes.
fn pad_keys(stats: StatsByCode) -> StatsByCode {
    build_stats(stats.into_iter().flat_map(|(code, area)| {
        let code = codes::pad_commune(&code);
        area.breakdown()
            .iter()
            .map(|c| StatsRow {
                code: code.clone(),
                land_cover: c.label.clone(),
                parcel_count: c.parcel_count,
                surface: c.surface,
                altitude: c.altitude,
                slope: c.slope,
            })
            .collect::<Vec<_>>()
    }))
}

/// Borne optionnellement la durée d'un appel externe
pub async fn with_timeout<T, F>(
    what: &str,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, DrillError>
where
    F: Future<Output = Result<T, DrillError>>,
{
    match timeout {
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(DrillError::Timeout {
                what: what.to_string(),
                after,
            }),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl AggregationProvider for CountingProvider {
        fn land_cover_categories(&self) -> BoxFuture<'_, Result<Vec<String>, DrillError>> {
            Box::pin(async { Ok(vec!["Prairie".to_string()]) })
        }

        fn aggregate_by_level<'a>(
            &'a self,
            _level: AggregationLevel,
            _selected: &'a [String],
        ) -> BoxFuture<'a, Result<StatsByCode, DrillError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(commune_rows()) })
        }

        fn aggregate_communes_in_department<'a>(
            &'a self,
            _department: &'a str,
            _selected: &'a [String],
        ) -> BoxFuture<'a, Result<StatsByCode, DrillError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(commune_rows()) })
        }

        fn parcels_in_commune<'a>(
            &'a self,
            commune: &'a str,
            _selected: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<ParcelStats>, DrillError>> {
            Box::pin(async move {
                Ok(vec![ParcelStats {
                    id: "p1".to_string(),
                    commune: commune.to_string(),
                    land_cover: "Prairie".to_string(),
                    surface: 1.0,
                    altitude: 10.0,
                    slope: 1.0,
                }])
            })
        }
    }

    fn commune_rows() -> StatsByCode {
        build_stats(vec![StatsRow {
            code: "1001".to_string(),
            land_cover: "Prairie".to_string(),
            parcel_count: 3,
            surface: 12.0,
            altitude: 250.0,
            slope: 2.0,
        }])
    }

    #[test]
    fn test_build_stats_groups_rows() {
        let stats = build_stats(vec![
            StatsRow {
                code: "84".to_string(),
                land_cover: "A".to_string(),
                parcel_count: 1,
                surface: 10.0,
                altitude: 100.0,
                slope: 1.0,
            },
            StatsRow {
                code: "84".to_string(),
                land_cover: "B".to_string(),
                parcel_count: 2,
                surface: 30.0,
                altitude: 500.0,
                slope: 5.0,
            },
            StatsRow {
                code: "11".to_string(),
                land_cover: "A".to_string(),
                parcel_count: 1,
                surface: 5.0,
                altitude: 50.0,
                slope: 0.5,
            },
        ]);

        assert_eq!(stats.len(), 2);
        let aura = &stats["84"];
        assert_eq!(aura.parcel_count(), 3);
        assert!((aura.altitude() - 400.0).abs() < 1e-9);
        assert_eq!(aura.breakdown().len(), 2);
    }

    fn row(
        code: &str,
        land_cover: &str,
        parcel_count: u64,
        surface: f64,
        altitude: f64,
    ) -> StatsRow {
        StatsRow {
            code: code.to_string(),
            land_cover: land_cover.to_string(),
            parcel_count,
            surface,
            altitude,
            slope: altitude / 100.0,
        }
    }

    #[test]
    fn test_same_type_rows_are_merged() {
        let stats = build_stats(vec![
            row("38", "Prairie", 1, 10.0, 100.0),
            row("38", "Prairie", 3, 30.0, 500.0),
        ]);
        let isere = &stats["38"];
        assert_eq!(isere.breakdown().len(), 1);
        assert_eq!(isere.parcel_count(), 4);
        assert!((isere.altitude() - 400.0).abs() < 1e-9);

        // Surfaces nulles: pondération par le nombre de parcelles
        let stats = build_stats(vec![
            row("75", "Vergers", 1, 0.0, 30.0),
            row("75", "Vergers", 3, 0.0, 70.0),
        ]);
        assert!((stats["75"].altitude() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_commune_keys_merge_on_padding() {
        let stats = build_stats(vec![
            row("1001", "Prairie", 3, 12.0, 250.0),
            row("01001", "Prairie", 1, 4.0, 650.0),
            row("01001", "Vergers", 2, 8.0, 100.0),
            row("1004", "Prairie", 1, 1.0, 300.0),
        ]);
        assert_eq!(stats.len(), 3);

        let padded = pad_keys(stats);
        assert_eq!(padded.len(), 2);
        assert!(!padded.contains_key("1001"));
        let commune = &padded["01001"];
        assert_eq!(commune.parcel_count(), 6);
        assert!((commune.total_surface() - 24.0).abs() < 1e-9);
        assert_eq!(commune.breakdown().len(), 2);

        let prairie = &commune.breakdown()[0];
        assert_eq!(prairie.label, "Prairie");
        assert_eq!(prairie.parcel_count, 4);
        assert!((prairie.altitude - 350.0).abs() < 1e-9);

        let expected = (350.0 * 16.0 + 100.0 * 8.0) / 24.0;
        assert!((commune.altitude() - expected).abs() < 1e-9);
        assert_eq!(padded["01004"].parcel_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_filter_issues_no_query() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let stats = aggregate_level(&provider, AggregationLevel::Region, &[])
            .await
            .unwrap();
        assert!(stats.is_empty());
        let stats = aggregate_communes(&provider, "01", &[]).await.unwrap();
        assert!(stats.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commune_codes_are_padded() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let selected = vec!["Prairie".to_string()];
        let stats = aggregate_communes(&provider, "01", &selected).await.unwrap();
        assert!(stats.contains_key("01001"));
        assert!(!stats.contains_key("1001"));

        let stats = aggregate_level(&provider, AggregationLevel::Commune, &selected)
            .await
            .unwrap();
        assert!(stats.contains_key("01001"));
    }

    #[tokio::test]
    async fn test_parcels_use_padded_commune() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let selected = vec!["Prairie".to_string()];
        let list = parcels(&provider, "1001", &selected).await.unwrap();
        assert_eq!(list[0].commune, "01001");
        assert!(parcels(&provider, "1001", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_expires() {
        let result: Result<(), DrillError> = with_timeout(
            "slow fetch",
            Some(Duration::from_millis(10)),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(DrillError::Timeout { .. })));
    }
}
