//! Source géographique HTTP ou fichiers locaux
//!
//! Chaque emplacement de la configuration est soit une URL `http(s)://`,
//! lue avec reqwest, soit un chemin local. Les collections sont des
//! FeatureCollection GeoJSON; l'appartenance et la recherche suivent le
//! format JSON de geo.api.gouv.fr.

use serde::Deserialize;
use tracing::debug;

use geodrill::{
    areas_from_geojson, Area, BoxFuture, CommuneMatch, DrillError, GeographySource, Level,
};

use crate::config::GeographyEndpoints;

/// Département renvoyé par `/regions/{code}/departements`
#[derive(Debug, Deserialize)]
struct DepartmentMeta {
    code: String,
}

/// Commune renvoyée par `/communes?nom=...`
#[derive(Debug, Deserialize)]
struct CommuneMeta {
    nom: String,
    code: String,
    #[serde(rename = "codeDepartement")]
    department: Option<String>,
    #[serde(rename = "codeRegion")]
    region: Option<String>,
}

pub struct GeoApiSource {
    endpoints: GeographyEndpoints,
    client: reqwest::Client,
}

impl GeoApiSource {
    pub fn new(endpoints: GeographyEndpoints) -> Self {
        Self {
            endpoints,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_text(&self, what: &str, location: &str) -> Result<String, DrillError> {
        debug!(what = what, location = location, "Fetching");
        if !is_remote(location) {
            return tokio::fs::read_to_string(location)
                .await
                .map_err(|e| DrillError::fetch(what, format!("{}: {}", location, e)));
        }

        let resp = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| DrillError::fetch(what, e))?;
        if !resp.status().is_success() {
            return Err(DrillError::fetch(what, format!("HTTP error: {}", resp.status())));
        }
        resp.text().await.map_err(|e| DrillError::fetch(what, e))
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn fill(template: &str, key: &str, value: &str) -> String {
    template.replace(&format!("{{{}}}", key), value)
}

fn parse_membership(text: &str) -> Result<Vec<String>, DrillError> {
    let departments: Vec<DepartmentMeta> =
        serde_json::from_str(text).map_err(|e| DrillError::decode("region departments", e))?;
    Ok(departments.into_iter().map(|d| d.code).collect())
}

fn parse_communes(text: &str) -> Result<Vec<CommuneMatch>, DrillError> {
    let communes: Vec<CommuneMeta> =
        serde_json::from_str(text).map_err(|e| DrillError::decode("commune search", e))?;
    Ok(communes
        .into_iter()
        .map(|c| CommuneMatch {
            name: c.nom,
            code: c.code,
            department: c.department,
            region: c.region,
        })
        .collect())
}

impl GeographySource for GeoApiSource {
    fn all_regions(&self) -> BoxFuture<'_, Result<Vec<Area>, DrillError>> {
        Box::pin(async move {
            let text = self.fetch_text("regions", &self.endpoints.regions).await?;
            areas_from_geojson(&text, Level::Region, None)
        })
    }

    fn all_departments(&self) -> BoxFuture<'_, Result<Vec<Area>, DrillError>> {
        Box::pin(async move {
            let text = self
                .fetch_text("departments", &self.endpoints.departments)
                .await?;
            areas_from_geojson(
                &text,
                Level::Department,
                self.endpoints.department_region_key.as_deref(),
            )
        })
    }

    fn departments_of_region<'a>(
        &'a self,
        region: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, DrillError>> {
        Box::pin(async move {
            let location = fill(&self.endpoints.region_departments, "region", region);
            let text = self.fetch_text("region departments", &location).await?;
            parse_membership(&text)
        })
    }

    fn communes_of_department<'a>(
        &'a self,
        department: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Area>, DrillError>> {
        Box::pin(async move {
            let location = fill(&self.endpoints.department_communes, "department", department);
            let text = self.fetch_text("department communes", &location).await?;
            areas_from_geojson(
                &text,
                Level::Commune,
                Some(&self.endpoints.commune_department_key),
            )
        })
    }

    fn search_communes<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<CommuneMatch>, DrillError>> {
        Box::pin(async move {
            let Some(base) = self.endpoints.commune_search.as_deref() else {
                return Ok(Vec::new());
            };
            let limit = limit.to_string();
            let resp = self
                .client
                .get(base)
                .query(&[
                    ("nom", query),
                    ("fields", "nom,code,codeDepartement,codeRegion"),
                    ("limit", limit.as_str()),
                ])
                .send()
                .await
                .map_err(|e| DrillError::fetch("commune search", e))?;
            if !resp.status().is_success() {
                return Err(DrillError::fetch(
                    "commune search",
                    format!("HTTP error: {}", resp.status()),
                ));
            }
            let text = resp
                .text()
                .await
                .map_err(|e| DrillError::fetch("commune search", e))?;
            parse_communes(&text)
        })
    }
}
