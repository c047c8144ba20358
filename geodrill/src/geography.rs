//! Registre géographique
//!
//! Les collections statiques (régions, départements) sont chargées une fois
//! au démarrage puis immuables. L'appartenance département -> région est
//! récupérée à la demande et, si activé, mise en cache (elle ne change pas).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::codes;
use crate::error::DrillError;
use crate::join::keep_members;
use crate::provider::{with_timeout, CommuneMatch, GeographySource};
use crate::types::{Area, Level};

/// Clés de propriétés candidates pour le code d'une zone
const CODE_KEYS: &[&str] = &["code", "insee", "code_insee"];

/// Clés de propriétés candidates pour le nom d'une zone
const NAME_KEYS: &[&str] = &["nom", "name", "libelle"];

/// Options du registre
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Conserver l'appartenance des départements après la première lecture
    pub cache_membership: bool,
    /// Délai maximal d'un appel à la source
    pub fetch_timeout: Option<Duration>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            cache_membership: true,
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Registre des zones géographiques
pub struct GeographyRegistry {
    source: Arc<dyn GeographySource>,
    regions: Vec<Area>,
    departments: Vec<Area>,
    membership: RwLock<HashMap<String, Vec<String>>>,
    options: RegistryOptions,
}

impl GeographyRegistry {
    /// Charge les collections statiques depuis la source
    pub async fn load(
        source: Arc<dyn GeographySource>,
        options: RegistryOptions,
    ) -> Result<Self, DrillError> {
        let timeout = options.fetch_timeout;
        let (regions, departments) = futures::try_join!(
            with_timeout("regions", timeout, source.all_regions()),
            with_timeout("departments", timeout, source.all_departments()),
        )?;

        info!(
            regions = regions.len(),
            departments = departments.len(),
            "Geography registry loaded"
        );

        Ok(Self::from_parts(source, regions, departments, options))
    }

    /// Construit un registre depuis des collections déjà chargées
    pub fn from_parts(
        source: Arc<dyn GeographySource>,
        regions: Vec<Area>,
        departments: Vec<Area>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            source,
            regions,
            departments,
            membership: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn regions(&self) -> &[Area] {
        &self.regions
    }

    pub fn departments(&self) -> &[Area] {
        &self.departments
    }

    pub fn region(&self, code: &str) -> Option<&Area> {
        self.regions.iter().find(|r| r.code == code.trim())
    }

    pub fn department(&self, code: &str) -> Option<&Area> {
        self.departments.iter().find(|d| d.code == code.trim())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.options.fetch_timeout
    }

    /// Codes des départements d'une région
    pub async fn departments_of_region(&self, region: &str) -> Result<Vec<String>, DrillError> {
        if self.options.cache_membership {
            if let Some(codes) = self.membership.read().await.get(region) {
                debug!(region = region, "Membership served from cache");
                return Ok(codes.clone());
            }
        }

        let codes: Vec<String> = with_timeout(
            "region departments",
            self.options.fetch_timeout,
            self.source.departments_of_region(region),
        )
        .await?
        .into_iter()
        .map(|c| codes::normalize(Level::Department, &c))
        .collect();

        if self.options.cache_membership {
            self.membership
                .write()
                .await
                .insert(region.to_string(), codes.clone());
        }
        Ok(codes)
    }

    /// Départements d'une région, dans l'ordre de la collection statique
    pub async fn region_departments(&self, region: &str) -> Result<Vec<Area>, DrillError> {
        let members = self.departments_of_region(region).await?;
        Ok(keep_members(&self.departments, &members)
            .into_iter()
            .map(|mut d| {
                d.parent_code.get_or_insert_with(|| region.to_string());
                d
            })
            .collect())
    }

    /// Communes d'un département avec leurs contours
    pub async fn communes_of_department(&self, department: &str) -> Result<Vec<Area>, DrillError> {
        let communes = with_timeout(
            "department communes",
            self.options.fetch_timeout,
            self.source.communes_of_department(department),
        )
        .await?;

        Ok(communes
            .into_iter()
            .map(|mut c| {
                c.code = codes::pad_commune(&c.code);
                c.parent_code.get_or_insert_with(|| department.to_string());
                c
            })
            .collect())
    }

    /// Retrouve la région d'un département
    ///
    /// Utilise le code parent connu, sinon le cache, sinon interroge chaque
    /// région tour à tour. Une erreur de lecture interrompt la recherche.
    pub async fn find_region_of_department(
        &self,
        department: &str,
    ) -> Result<Option<String>, DrillError> {
        if let Some(parent) = self
            .department(department)
            .and_then(|d| d.parent_code.clone())
        {
            return Ok(Some(parent));
        }

        for region in &self.regions {
            let members = self.departments_of_region(&region.code).await?;
            if members.iter().any(|c| c == department) {
                debug!(department = department, region = %region.code, "Parent region found");
                return Ok(Some(region.code.clone()));
            }
        }

        warn!(department = department, "No region owns this department");
        Ok(None)
    }

    /// Recherche distante de communes par nom
    pub async fn search_communes(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CommuneMatch>, DrillError> {
        let matches = with_timeout(
            "commune search",
            self.options.fetch_timeout,
            self.source.search_communes(query, limit),
        )
        .await?;
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|mut m| {
                m.code = codes::pad_commune(&m.code);
                m
            })
            .collect())
    }
}

/// Décode une FeatureCollection GeoJSON en zones d'un niveau
///
/// Le code parent est lu dans `parent_key` s'il est fourni.
pub fn areas_from_geojson(
    text: &str,
    level: Level,
    parent_key: Option<&str>,
) -> Result<Vec<Area>, DrillError> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| DrillError::decode(format!("{} collection", level), e))?;
    let collection = FeatureCollection::try_from(geojson)
        .map_err(|e| DrillError::decode(format!("{} collection", level), e))?;

    let mut areas = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        match area_from_feature(feature, level, parent_key) {
            Some(area) => areas.push(area),
            None => warn!(level = %level, "Skipping feature without code"),
        }
    }
    Ok(areas)
}

fn area_from_feature(feature: Feature, level: Level, parent_key: Option<&str>) -> Option<Area> {
    let code = CODE_KEYS
        .iter()
        .find_map(|key| property_string(&feature, key))?;
    let name = NAME_KEYS
        .iter()
        .find_map(|key| property_string(&feature, key))
        .unwrap_or_else(|| code.clone());
    let parent = parent_key.and_then(|key| property_string(&feature, key));

    let mut area = Area::new(level, code, name);
    if let Some(parent) = parent {
        area = area.with_parent(parent);
    }

    if let Some(geometry) = feature.geometry {
        match geo::Geometry::<f64>::try_from(geometry) {
            Ok(geometry) => area = area.with_geometry(geometry),
            Err(e) => warn!(code = %area.code, error = %e, "Unsupported geometry"),
        }
    }
    Some(area)
}

/// Lit une propriété texte ou numérique
fn property_string(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGIONS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[4.0, 45.0], [5.0, 45.0], [5.0, 46.0], [4.0, 45.0]]]},
             "properties": {"code": "84", "nom": "Auvergne-Rhône-Alpes"}},
            {"type": "Feature",
             "geometry": null,
             "properties": {"code": 11, "nom": "Île-de-France"}},
            {"type": "Feature",
             "geometry": null,
             "properties": {"nom": "Sans code"}}
        ]
    }"#;

    #[test]
    fn test_areas_from_geojson() {
        let areas = areas_from_geojson(REGIONS, Level::Region, None).unwrap();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].code, "84");
        assert_eq!(areas[0].name, "Auvergne-Rhône-Alpes");
        assert!(areas[0].geometry.is_some());
        assert_eq!(areas[1].code, "11");
        assert!(areas[1].geometry.is_none());
        assert!(areas.iter().all(|a| a.stats.is_none()));
    }

    #[test]
    fn test_commune_collection_pads_codes() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": null,
             "properties": {"code": "1001", "nom": "L'Abergement-Clémenciat", "codeDepartement": "01"}}
        ]}"#;
        let areas = areas_from_geojson(text, Level::Commune, Some("codeDepartement")).unwrap();
        assert_eq!(areas[0].code, "01001");
        assert_eq!(areas[0].parent_code.as_deref(), Some("01"));
    }

    #[test]
    fn test_invalid_geojson() {
        let err = areas_from_geojson("not json", Level::Region, None).unwrap_err();
        assert!(matches!(err, DrillError::Decode { .. }));
    }
}
