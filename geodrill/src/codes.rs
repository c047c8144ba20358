//! Normalisation des codes géographiques
//!
//! Les codes communaux (INSEE) sont canoniques sur 5 caractères: les sources
//! numériques perdent le zéro initial des départements 01 à 09 ("1001" pour
//! "01001"). Les autres codes (région, département, parcelle) sont conservés tels quels.

use crate::types::Level;

/// Longueur canonique d'un code commune
pub const COMMUNE_CODE_LEN: usize = 5;

/// Normalise un code selon son niveau
pub fn normalize(level: Level, raw: &str) -> String {
    let code = raw.trim();
    match level {
        Level::Region | Level::Department | Level::Parcel => code.to_string(),
        Level::Commune => pad_commune(code),
    }
}

/// Complète un code à gauche avec des zéros jusqu'à 5 caractères
pub fn pad_commune(code: &str) -> String {
    let code = code.trim();
    if code.len() >= COMMUNE_CODE_LEN {
        return code.to_string();
    }
    format!("{:0>width$}", code, width = COMMUNE_CODE_LEN)
}

/// Extrait le code département d'un code commune
///
/// 3 caractères pour l'outre-mer (codes commençant par "97"), 2 sinon
/// (y compris "2A"/"2B" pour la Corse).
pub fn department_of_commune(commune: &str) -> String {
    let code = pad_commune(commune);
    let len = if code.starts_with("97") { 3 } else { 2 };
    code.chars().take(len).collect()
}
