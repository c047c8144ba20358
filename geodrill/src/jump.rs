//! Saut direct vers un lieu trouvé par la recherche
//!
//! Enchaîne les sélections de la carte (région, puis département, puis
//! commune) en attendant que chaque étape soit appliquée avant la suivante.
//! Un échec ou une étape périmée interrompt le saut là où il en est.

use tracing::{info, warn};

use crate::codes;
use crate::effects::RenderEffect;
use crate::error::DrillError;
use crate::navigation::{Navigator, Outcome};
use crate::search::Candidate;
use crate::types::{Area, Level};

/// Destination d'un saut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpTarget {
    pub level: Level,
    pub code: String,
    /// Région déjà connue, évite le parcours des régions
    pub region_hint: Option<String>,
}

impl JumpTarget {
    pub fn new(level: Level, code: impl Into<String>) -> Self {
        Self {
            level,
            code: code.into(),
            region_hint: None,
        }
    }
}

impl From<&Candidate> for JumpTarget {
    fn from(candidate: &Candidate) -> Self {
        Self {
            level: candidate.level,
            code: candidate.code.clone(),
            region_hint: candidate.region.clone(),
        }
    }
}

/// Bilan d'un saut
#[derive(Debug, Clone, Default)]
pub struct JumpReport {
    /// Effets de toutes les étapes appliquées, dans l'ordre
    pub effects: Vec<RenderEffect>,
    /// Dernière étape appliquée
    pub reached: Option<(Level, String)>,
    /// Raison de l'interruption
    pub aborted: Option<String>,
}

impl JumpReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

#[derive(Debug)]
enum Abort {
    Failed(DrillError),
    Superseded,
}

impl From<DrillError> for Abort {
    fn from(e: DrillError) -> Self {
        Abort::Failed(e)
    }
}

impl std::fmt::Display for Abort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Abort::Failed(e) => write!(f, "{}", e),
            Abort::Superseded => write!(f, "superseded by a newer selection"),
        }
    }
}

/// Conduit la carte jusqu'à la destination
pub async fn jump(navigator: &Navigator, target: &JumpTarget) -> JumpReport {
    info!(level = %target.level, code = %target.code, "Jumping to location");
    let mut report = JumpReport::default();

    if let Err(abort) = run(navigator, target, &mut report).await {
        warn!(code = %target.code, reason = %abort, "Jump aborted");
        report.aborted = Some(abort.to_string());
    }
    report
}

async fn run(
    navigator: &Navigator,
    target: &JumpTarget,
    report: &mut JumpReport,
) -> Result<(), Abort> {
    match target.level {
        Level::Region => {
            let region = codes::normalize(Level::Region, &target.code);
            record(report, Level::Region, &region, navigator.select_region(&region).await?)?;
        }
        Level::Department => {
            let department = codes::normalize(Level::Department, &target.code);
            let region = resolve_region(navigator, &department, target).await?;
            record(report, Level::Region, &region, navigator.select_region(&region).await?)?;
            record(
                report,
                Level::Department,
                &department,
                navigator.select_department(&department).await?,
            )?;
        }
        Level::Commune => {
            let commune = codes::pad_commune(&target.code);
            let department = codes::department_of_commune(&commune);
            let region = resolve_region(navigator, &department, target).await?;
            record(report, Level::Region, &region, navigator.select_region(&region).await?)?;
            let communes = record(
                report,
                Level::Department,
                &department,
                navigator.select_department(&department).await?,
            )?;
            if !communes.iter().any(|c| c.code == commune) {
                return Err(DrillError::Unresolved {
                    level: Level::Commune,
                    code: commune,
                }
                .into());
            }
            record(
                report,
                Level::Commune,
                &commune,
                navigator.select_commune(&commune).await?,
            )?;
        }
        Level::Parcel => {
            return Err(DrillError::Unresolved {
                level: Level::Parcel,
                code: target.code.clone(),
            }
            .into())
        }
    }
    Ok(())
}

/// Région d'un département: indication du candidat, sinon registre
async fn resolve_region(
    navigator: &Navigator,
    department: &str,
    target: &JumpTarget,
) -> Result<String, Abort> {
    let registry = navigator.registry();
    if let Some(hint) = target.region_hint.as_deref() {
        if registry.region(hint).is_some() {
            return Ok(hint.trim().to_string());
        }
    }
    registry
        .find_region_of_department(department)
        .await?
        .ok_or_else(|| {
            Abort::Failed(DrillError::Unresolved {
                level: Level::Department,
                code: department.to_string(),
            })
        })
}

fn record(
    report: &mut JumpReport,
    level: Level,
    code: &str,
    outcome: Outcome,
) -> Result<Vec<Area>, Abort> {
    let features = match outcome {
        Outcome::Committed(commit) => {
            report.effects.extend(commit.effects);
            commit.features
        }
        Outcome::Unchanged(effects) => {
            report.effects.extend(effects);
            Vec::new()
        }
        Outcome::Stale => return Err(Abort::Superseded),
    };
    report.reached = Some((level, code.to_string()));
    Ok(features)
}
