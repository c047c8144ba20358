//! Types d'erreurs pour le crate geodrill

use std::time::Duration;

use thiserror::Error;

use crate::types::Level;

/// Erreurs pouvant survenir pendant une transition de navigation
///
/// Un résultat périmé n'est pas une erreur (voir `Outcome::Stale`), pas plus
/// qu'un filtre vide.
#[derive(Debug, Error)]
pub enum DrillError {
    /// Échec d'un appel externe (réseau, moteur d'agrégation)
    #[error("Fetch failed for {what}: {reason}")]
    Fetch { what: String, reason: String },

    /// Appel externe resté sans réponse
    #[error("Fetch timed out for {what} after {after:?}")]
    Timeout { what: String, after: Duration },

    /// Réponse illisible (GeoJSON, JSON)
    #[error("Decode error in {what}: {reason}")]
    Decode { what: String, reason: String },

    /// Code inconnu du registre géographique
    #[error("Unknown {level} code: {code}")]
    UnknownArea { level: Level, code: String },

    /// Zone absente de la couche interactive courante
    #[error("{level} {code} is not in the displayed layer")]
    NotDisplayed { level: Level, code: String },

    /// Chaîne de parents introuvable pendant un saut
    #[error("Cannot resolve parent chain of {level} {code}")]
    Unresolved { level: Level, code: String },
}

impl DrillError {
    /// Crée une erreur d'appel externe avec contexte
    pub fn fetch(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Crée une erreur de décodage avec contexte
    pub fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unknown(level: Level, code: impl Into<String>) -> Self {
        Self::UnknownArea {
            level,
            code: code.into(),
        }
    }

    pub fn not_displayed(level: Level, code: impl Into<String>) -> Self {
        Self::NotDisplayed {
            level,
            code: code.into(),
        }
    }
}
