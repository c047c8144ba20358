//! Configuration du visualiseur

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use geodrill::{RegistryOptions, SearchOptions};

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewerConfig {
    /// Emplacements des collections géographiques
    pub geography: GeographyEndpoints,

    /// Mapping de la table des parcelles
    #[serde(default)]
    pub parcels: ParcelTable,

    #[serde(default)]
    pub search: SearchConfig,

    /// Délai maximal d'une lecture externe (0 = sans limite)
    #[serde(default = "default_timeout")]
    pub fetch_timeout_secs: u64,

    /// Garder en mémoire les départements de chaque région
    #[serde(default = "default_true")]
    pub cache_membership: bool,
}

/// Emplacements (URL http(s) ou chemin local) des données géographiques
///
/// Les gabarits acceptent `{region}` et `{department}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeographyEndpoints {
    /// FeatureCollection des régions
    pub regions: String,

    /// FeatureCollection des départements
    pub departments: String,

    /// Propriété portant la région d'un département, si la collection l'a
    #[serde(default)]
    pub department_region_key: Option<String>,

    /// Liste JSON des départements d'une région (`[{"code": ...}]`)
    pub region_departments: String,

    /// FeatureCollection des communes d'un département
    pub department_communes: String,

    /// Propriété portant le département d'une commune
    #[serde(default = "default_commune_parent_key")]
    pub commune_department_key: String,

    /// Recherche de communes par nom (API geo.api.gouv.fr), absente en local
    #[serde(default)]
    pub commune_search: Option<String>,
}

/// Table des parcelles et ses colonnes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ParcelTable {
    pub schema: String,
    pub table: String,
    pub id: String,
    pub region: String,
    pub department: String,
    pub commune: String,
    pub land_cover: String,
    pub surface: String,
    pub altitude: String,
    pub slope: String,
}

impl Default for ParcelTable {
    fn default() -> Self {
        Self {
            schema: "public".into(),
            table: "parcelles".into(),
            id: "id_parcel".into(),
            region: "reg_parc".into(),
            department: "dep_parc".into(),
            commune: "com_parc".into(),
            land_cover: "libelle_group".into(),
            surface: "surf_parc".into(),
            altitude: "alt_mean".into(),
            slope: "pente_mean".into(),
        }
    }
}

impl ParcelTable {
    /// Nom qualifié `schema.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Vérifie que chaque nom est un identifiant SQL simple
    ///
    /// Les noms sont interpolés dans les requêtes: seuls les identifiants
    /// `[A-Za-z_][A-Za-z0-9_]*` sont acceptés.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("schema", &self.schema),
            ("table", &self.table),
            ("id", &self.id),
            ("region", &self.region),
            ("department", &self.department),
            ("commune", &self.commune),
            ("land_cover", &self.land_cover),
            ("surface", &self.surface),
            ("altitude", &self.altitude),
            ("slope", &self.slope),
        ];
        for (field, name) in fields {
            if !identifier_pattern().is_match(name) {
                anyhow::bail!("Invalid SQL identifier for parcels.{}: {:?}", field, name);
            }
        }
        Ok(())
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex")
    })
}

/// Réglages de la recherche
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_commune_limit")]
    pub commune_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_len: default_min_query_len(),
            max_results: default_max_results(),
            commune_limit: default_commune_limit(),
        }
    }
}

impl From<SearchConfig> for SearchOptions {
    fn from(config: SearchConfig) -> Self {
        SearchOptions {
            min_query_len: config.min_query_len,
            max_results: config.max_results,
            commune_limit: config.commune_limit,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_commune_parent_key() -> String {
    "codeDepartement".to_string()
}

fn default_min_query_len() -> usize {
    2
}

fn default_max_results() -> usize {
    8
}

fn default_commune_limit() -> usize {
    5
}

impl ViewerConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.parcels.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "geo-api" => Self::load_embedded(include_str!("presets/geo-api.json")),
            "local" => Self::load_embedded(include_str!("presets/local.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: geo-api, local", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(preset_or_path: &str) -> Result<Self> {
        match preset_or_path {
            "geo-api" | "local" => Self::from_preset(preset_or_path),
            _ => Self::load(Path::new(preset_or_path)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse embedded config")?;
        config.parcels.validate()?;
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            cache_membership: self.cache_membership,
            fetch_timeout: self.fetch_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_load() {
        let remote = ViewerConfig::from_preset("geo-api").unwrap();
        assert!(remote.geography.regions.starts_with("https://"));
        assert!(remote.geography.commune_search.is_some());
        assert_eq!(remote.parcels, ParcelTable::default());
        assert_eq!(remote.fetch_timeout(), Some(Duration::from_secs(30)));

        let local = ViewerConfig::from_preset("local").unwrap();
        assert!(local.geography.commune_search.is_none());
        assert!(local.cache_membership);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(ViewerConfig::from_preset("full").is_err());
    }

    #[test]
    fn test_search_defaults() {
        let options: SearchOptions = SearchConfig::default().into();
        assert_eq!(options, SearchOptions::default());
    }

    #[test]
    fn test_identifier_validation() {
        let mut table = ParcelTable::default();
        assert!(table.validate().is_ok());

        table.land_cover = "libelle_group; DROP TABLE parcelles".into();
        assert!(table.validate().is_err());

        table.land_cover = "1group".into();
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let mut config = ViewerConfig::from_preset("local").unwrap();
        config.fetch_timeout_secs = 0;
        assert_eq!(config.registry_options().fetch_timeout, None);
    }
}
